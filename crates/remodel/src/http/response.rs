//! HTTP response handling

use crate::error::{Error, Result};
use http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use serde_json::Value;

/// Response as returned by a [`Transport`](super::Transport).
#[derive(Debug, Clone)]
pub struct WireResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl WireResponse {
    /// Create a new response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a JSON response (mostly useful for custom transports and tests).
    pub fn json_body(status: StatusCode, body: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        Self::new(status, headers, body.to_string().into_bytes())
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Check if the response is successful (2xx status).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the server declared a JSON body.
    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| {
                let mime = ct.split(';').next().unwrap_or("").trim();
                mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
            })
            .unwrap_or(false)
    }

    /// Decode the body.
    ///
    /// JSON bodies are parsed; anything else is wrapped as
    /// `{"response": "<raw body>"}`. An empty JSON body decodes to `null`.
    pub fn data(&self) -> Result<Value> {
        if self.is_json() {
            if self.body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&self.body).map_err(Error::Serialization);
        }

        Ok(serde_json::json!({
            "response": String::from_utf8_lossy(&self.body),
        }))
    }

    /// Turn a non-success status into the matching [`Error`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::from_response(
                self.status.as_u16(),
                &String::from_utf8_lossy(&self.body),
            ))
        }
    }

    /// Check the status, then decode the body.
    pub fn into_data(self) -> Result<Value> {
        self.error_for_status()?.data()
    }
}
