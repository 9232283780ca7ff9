//! Main client implementation

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use secrecy::SecretString;

use crate::{
    config::{ClientConfig, WaitConfig},
    endpoint::Endpoint,
    error::{Error, Result},
    http::{Method, ReqwestTransport, RequestParams, Transport, WireResponse},
    model::EntitySchema,
    resources::{IP, LOCATION, SERVER},
};

/// Entry point to the remote service.
///
/// Holds the transport and configuration shared by every [`Endpoint`].
/// Cloning is cheap.
///
/// # Example
///
/// ```rust,no_run
/// use remodel::Client;
///
/// # async fn example() -> remodel::Result<()> {
/// let client = Client::builder()
///     .base_uri("https://api.example.com/v1")
///     .api_token("secret")
///     .language("en")
///     .build()?;
///
/// let server = client.servers().retrieve(7).await?;
/// println!("{}", server);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Transport every request goes through
    transport: Arc<dyn Transport>,

    config: ClientConfig,

    // Lazy-initialized endpoints. Each holds a client clone, so a client
    // that has touched one lives until the process exits.
    servers: OnceLock<Endpoint>,
    locations: OnceLock<Endpoint>,
    ips: OnceLock<Endpoint>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a client from a configuration object, using the `reqwest`
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URI is missing or invalid, or the HTTP
    /// client cannot be created.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let mut transport = ReqwestTransport::builder()
            .timeout(config.timeout)
            .default_headers(config.default_headers.clone());

        if let Some(base_uri) = &config.base_uri {
            transport = transport.base_uri(base_uri.clone());
        }
        if let Some(api_token) = &config.api_token {
            transport = transport.api_token_secret(api_token.clone());
        }
        if let Some(language) = &config.language {
            transport = transport.language(language.clone());
        }

        Ok(Self::from_transport(Arc::new(transport.build()?), config))
    }

    /// Create a client from `REMODEL_*` environment variables.
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        Self::from_config(ClientConfig::from_env()?)
    }

    /// Create a client on top of a custom transport.
    ///
    /// Only the polling and list settings of `config` are used; connection
    /// settings belong to the transport.
    pub fn from_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                servers: OnceLock::new(),
                locations: OnceLock::new(),
                ips: OnceLock::new(),
            }),
        }
    }

    /// An endpoint for `schema` entities at `uri`.
    ///
    /// Every call returns a fresh endpoint with its own retrieved-payload
    /// cache.
    pub fn endpoint(&self, uri: impl Into<String>, schema: &'static EntitySchema) -> Endpoint {
        Endpoint::new(self.clone(), uri, schema)
    }

    /// Servers endpoint.
    pub fn servers(&self) -> &Endpoint {
        self.inner
            .servers
            .get_or_init(|| self.endpoint("servers", &SERVER))
    }

    /// Locations endpoint.
    pub fn locations(&self) -> &Endpoint {
        self.inner
            .locations
            .get_or_init(|| self.endpoint("locations", &LOCATION))
    }

    /// IP addresses endpoint.
    pub fn ips(&self) -> &Endpoint {
        self.inner.ips.get_or_init(|| self.endpoint("ips", &IP))
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Base URI of the transport.
    pub fn base_uri(&self) -> &str {
        self.inner.transport.base_uri()
    }

    pub(crate) fn wait_config(&self) -> &WaitConfig {
        &self.inner.config.wait
    }

    pub(crate) fn page_size(&self) -> Option<u32> {
        self.inner.config.page_size
    }

    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
    ) -> Result<WireResponse> {
        self.inner.transport.request(method, path, params).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.inner.transport)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for creating a configured Client.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Set the base URI.
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.config.base_uri = Some(base_uri.into());
        self
    }

    /// Set the bearer token.
    pub fn api_token(mut self, api_token: impl Into<String>) -> Self {
        self.config.api_token = Some(SecretString::new(api_token.into().into_boxed_str()));
        self
    }

    /// Set the `Accept-Language` value.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = Some(language.into());
        self
    }

    /// Set the page size injected into list queries.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = Some(page_size);
        self
    }

    /// Set the default timeout for requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Add a custom default header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid according to HTTP specifications.
    pub fn default_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key: http::HeaderName = key_str
            .parse()
            .map_err(|_| Error::InvalidHeaderName(key_str.clone()))?;
        let value: http::HeaderValue = value_str
            .parse()
            .map_err(|_| Error::InvalidHeaderValue(value_str.clone()))?;

        self.config.default_headers.insert(key, value);
        Ok(self)
    }

    /// Set the polling configuration.
    pub fn wait(mut self, wait: WaitConfig) -> Self {
        self.config.wait = wait;
        self
    }

    /// Overlay a configuration, e.g. one loaded from the environment.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = self.config.merge(config);
        self
    }

    /// Use a custom transport instead of `reqwest`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client with the configured options.
    pub fn build(self) -> Result<Client> {
        match self.transport {
            Some(transport) => Ok(Client::from_transport(transport, self.config)),
            None => Client::from_config(self.config),
        }
    }
}
