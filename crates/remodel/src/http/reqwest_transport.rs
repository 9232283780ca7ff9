//! Default transport on top of `reqwest`
//!
//! Handles the bearer token, `Accept-Language`, default headers and the request
//! timeout. Failed requests are classified but never retried.

use super::{Method, RequestParams, Transport, WireResponse};
use crate::{
    error::{Error, Result},
    observability::{RequestMetadata, RequestTimer, ResponseMetadata},
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use url::Url;

/// Transport backed by a shared `reqwest::Client`.
///
/// # Example
///
/// ```rust,no_run
/// use remodel::http::ReqwestTransport;
///
/// let transport = ReqwestTransport::builder()
///     .base_uri("https://api.example.com/v1/")
///     .api_token("secret")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    pub(crate) inner: Arc<TransportInner>,
}

#[derive(Debug)]
pub(crate) struct TransportInner {
    /// HTTP client for making requests
    pub(crate) http_client: reqwest::Client,
    /// Base URI, always ending in `/`
    pub(crate) base_uri: Url,
    /// Bearer credential
    pub(crate) api_token: Option<SecretString>,
    /// `Accept-Language` value
    pub(crate) language: Option<String>,
    /// Default timeout for requests
    pub(crate) timeout: Duration,
    /// Custom headers to include with every request
    pub(crate) default_headers: http::HeaderMap,
}

impl ReqwestTransport {
    /// Create a new builder for configuring the transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Resolve a path against the base URI.
    pub(crate) fn url_for(&self, path: &str) -> Result<Url> {
        let mut url = self
            .inner
            .base_uri
            .join(path.trim_start_matches('/'))
            .map_err(|e| {
                Error::InvalidUrl(format!(
                    "Failed to construct URL from path '{}': {}",
                    path, e
                ))
            })?;
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        params: &RequestParams,
    ) -> Result<reqwest::RequestBuilder> {
        let mut url = self.url_for(path)?;
        if !params.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(params.query_pairs());
        }

        let mut builder = self
            .inner
            .http_client
            .request(method, url)
            .timeout(self.inner.timeout)
            .header(http::header::ACCEPT, "application/json");

        if let Some(token) = &self.inner.api_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(language) = &self.inner.language {
            builder = builder.header(http::header::ACCEPT_LANGUAGE, language.as_str());
        }
        for (key, value) in &self.inner.default_headers {
            builder = builder.header(key, value);
        }
        for (key, value) in params.headers() {
            builder = builder.header(key, value);
        }
        if let Some(body) = params.body() {
            builder = builder.json(body);
        }

        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
    ) -> Result<WireResponse> {
        let metadata = RequestMetadata::new(method.as_str(), path)
            .with_body_size(params.body().map(|b| b.to_string().len()).unwrap_or(0));
        let request = self.build_request(method, path, &params)?;

        metadata.log_request();
        let timer = RequestTimer::start();

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.inner.timeout)
            } else {
                Error::Connection(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?
            .to_vec();

        let response_meta =
            ResponseMetadata::new(status.as_u16(), timer.elapsed()).with_body_size(body.len());
        if status.is_success() {
            response_meta.log_success(&metadata);
        } else {
            response_meta.log_error(&metadata, &String::from_utf8_lossy(&body));
        }

        Ok(WireResponse::new(status, headers, body))
    }

    fn base_uri(&self) -> &str {
        self.inner.base_uri.as_str()
    }
}

/// Builder for creating a `ReqwestTransport` with custom configuration.
#[derive(Default)]
pub struct ReqwestTransportBuilder {
    base_uri: Option<String>,
    api_token: Option<SecretString>,
    language: Option<String>,
    timeout: Option<Duration>,
    default_headers: http::HeaderMap,
}

impl ReqwestTransportBuilder {
    /// Set the base URI every path is joined onto.
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    /// Set the bearer token.
    pub fn api_token(mut self, api_token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::new(api_token.into().into_boxed_str()));
        self
    }

    /// Set an already-wrapped bearer token.
    pub fn api_token_secret(mut self, api_token: SecretString) -> Self {
        self.api_token = Some(api_token);
        self
    }

    /// Set the `Accept-Language` value.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the default headers.
    pub fn default_headers(mut self, headers: http::HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Build the transport with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No base URI was given, or it is empty
    /// - The base URI is not an `http`/`https` URL
    /// - HTTP client creation fails
    pub fn build(self) -> Result<ReqwestTransport> {
        let Self {
            base_uri,
            api_token,
            language,
            timeout,
            default_headers,
        } = self;

        let timeout = timeout.unwrap_or(crate::config::DEFAULT_TIMEOUT);
        let base_uri = parse_base_uri(
            base_uri
                .as_deref()
                .ok_or_else(|| Error::MissingConfig("base_uri".to_string()))?,
        )?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("remodel-rust/{}", crate::VERSION))
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(ReqwestTransport {
            inner: Arc::new(TransportInner {
                http_client,
                base_uri,
                api_token,
                language,
                timeout,
                default_headers,
            }),
        })
    }
}

fn parse_base_uri(raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidUrl("Base URI cannot be empty".to_string()));
    }

    let mut url: Url = raw
        .trim()
        .parse()
        .map_err(|e| Error::InvalidUrl(format!("{}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::InvalidUrl(format!(
                "Invalid URL scheme '{}'. Only 'http' and 'https' are supported.",
                scheme
            )));
        }
    }

    // Url::join replaces the last segment unless the path ends in '/'
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_builder_requires_base_uri() {
        let result = ReqwestTransport::builder().api_token("t").build();
        assert_matches!(result, Err(Error::MissingConfig(_)));
    }

    #[test]
    fn test_builder_rejects_empty_and_bad_scheme() {
        let result = ReqwestTransport::builder().base_uri("   ").build();
        assert_matches!(result, Err(Error::InvalidUrl(msg)) if msg.contains("empty"));

        let result = ReqwestTransport::builder()
            .base_uri("ftp://files.example.com")
            .build();
        assert_matches!(result, Err(Error::InvalidUrl(msg)) if msg.contains("ftp"));
    }

    #[test]
    fn test_paths_join_under_base_path() {
        let transport = ReqwestTransport::builder()
            .base_uri("https://api.example.com/v2")
            .build()
            .unwrap();

        assert_eq!(transport.base_uri(), "https://api.example.com/v2/");
        assert_eq!(
            transport.url_for("servers/7").unwrap().as_str(),
            "https://api.example.com/v2/servers/7"
        );
        assert_eq!(
            transport.url_for("/servers").unwrap().as_str(),
            "https://api.example.com/v2/servers"
        );
    }

    #[test]
    fn test_request_carries_auth_and_language() {
        let transport = ReqwestTransport::builder()
            .base_uri("https://api.example.com")
            .api_token("secret")
            .language("de")
            .build()
            .unwrap();

        let params = RequestParams::new().query("page", "2");
        let request = transport
            .build_request(Method::GET, "servers", &params)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.url().as_str(), "https://api.example.com/servers?page=2");
        assert_eq!(request.headers()["authorization"], "Bearer secret");
        assert_eq!(request.headers()["accept-language"], "de");
    }
}
