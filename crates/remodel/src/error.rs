//! Error types for the SDK
//!
//! Every failure the SDK can surface is a variant of [`Error`]. Transport and
//! HTTP-status failures are classified here so callers can branch on them (the
//! delete completion check, for instance, waits specifically for
//! [`Error::NotFound`]), and the entity model and polling layer add their own
//! conditions alongside.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for operations that can fail with an SDK error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the SDK.
#[derive(Debug, Error)]
pub enum Error {
    /// The API rejected the request as malformed (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials valid but not allowed to perform the request (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflicting state on the remote side (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request understood but semantically invalid (422).
    #[error("Unprocessable entity: {message}")]
    UnprocessableEntity {
        /// Error message
        message: String,
        /// Per-field validation errors, if the API returned any
        errors: Vec<ValidationError>,
    },

    /// Server-side failure (500+).
    #[error("Server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Any other non-success status code.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Connection failure at the socket level.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout.
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP client configuration or initialization error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Invalid HTTP header name.
    #[error("Invalid HTTP header name: {0}")]
    InvalidHeaderName(String),

    /// Invalid HTTP header value.
    #[error("Invalid HTTP header value: {0}")]
    InvalidHeaderValue(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    /// `set` was called with a field that does not exist or is read-only.
    #[error("{kind} has no writable field '{field}'")]
    NoSuchWritableField {
        /// Entity kind
        kind: &'static str,
        /// Requested field name
        field: String,
    },

    /// Populating an entity failed; its previous state was restored.
    #[error("Failed to sync {kind} #{id}: {source}")]
    SyncFailed {
        /// Entity kind
        kind: &'static str,
        /// Identity from the incoming data, else the prior state, else 0
        id: u64,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The entity type declares no field with this name.
    #[error("{kind} has no field '{field}'")]
    UnknownField {
        /// Entity kind
        kind: &'static str,
        /// Requested field name
        field: String,
    },

    /// A value does not fit the declared shape of its field.
    #[error("Invalid value for {kind}.{field}: {reason}")]
    InvalidFieldValue {
        /// Entity kind
        kind: &'static str,
        /// Field name
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A field value has no collapse strategy.
    #[error("Field '{field}' of {kind} cannot be collapsed")]
    Uncollapsable {
        /// Entity kind
        kind: &'static str,
        /// Field name
        field: String,
    },

    /// A list response contained something other than an object.
    #[error("Malformed list response: element {index} is not an object")]
    MalformedList {
        /// Position of the offending element
        index: usize,
    },

    /// A single-record response was not a JSON object.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Update or delete on an entity without identity.
    #[error("{0} has no identity")]
    MissingIdentity(&'static str),

    /// An entity of one kind was handed to an endpoint of another.
    #[error("Endpoint for {expected} cannot handle {actual}")]
    WrongModelForEndpoint {
        /// Kind handled by the endpoint
        expected: &'static str,
        /// Kind of the entity passed in
        actual: &'static str,
    },

    /// An entity of the wrong kind was added to a collection.
    #[error("Collection of {expected} cannot hold {actual}")]
    WrongTypeForCollection {
        /// Item kind of the collection
        expected: &'static str,
        /// Kind of the rejected entity
        actual: &'static str,
    },

    /// The requested member is not part of the collection.
    #[error("{kind} #{id} is not in the collection")]
    MemberNotFound {
        /// Item kind of the collection
        kind: &'static str,
        /// Requested identity
        id: u64,
    },

    /// An operation's completion predicate was not satisfied in time.
    #[error("Operation did not complete within {timeout:?}")]
    WaitTimeoutExceeded {
        /// Configured timeout
        timeout: Duration,
    },

    /// A user-supplied predicate or tick callback failed with a foreign error.
    #[error("Callback failed: {0}")]
    CallbackFailure(String),

    /// Other errors not covered by specific variants.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Validation error details for UnprocessableEntity errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,
    /// Validation error message
    pub message: String,
}

impl Error {
    /// Classify a non-success HTTP response.
    ///
    /// The message is taken from the first of `message`, `error.message` or
    /// `error` (string) found in a JSON body, falling back to the raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(ApiErrorBody::message)
            .unwrap_or_else(|| body.to_string());

        match status {
            400 => Error::BadRequest(message),
            401 => Error::Unauthorized(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            422 => Error::UnprocessableEntity {
                message,
                errors: parsed.map(ApiErrorBody::validation_errors).unwrap_or_default(),
            },
            s if s >= 500 => Error::ServerError { status, message },
            _ => Error::Api { status, message },
        }
    }

    /// The HTTP status code behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::BadRequest(_) => Some(400),
            Error::Unauthorized(_) => Some(401),
            Error::Forbidden(_) => Some(403),
            Error::NotFound(_) => Some(404),
            Error::Conflict(_) => Some(409),
            Error::UnprocessableEntity { .. } => Some(422),
            Error::ServerError { status, .. } | Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a 404 from the remote side.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the request never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout(_) | Error::HttpClient(_)
        )
    }

    /// Whether this error originates from the SDK rather than user code.
    ///
    /// Foreign failures are the ones the polling layer wraps into
    /// [`Error::CallbackFailure`].
    pub fn is_foreign(&self) -> bool {
        matches!(self, Error::Other(_))
    }
}

// Helper structures for parsing API error responses

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum ApiErrorDetail {
    Text(String),
    Detailed { message: String },
}

impl ApiErrorBody {
    fn message(&self) -> Option<String> {
        self.message.clone().or_else(|| {
            self.error.as_ref().map(|e| match e {
                ApiErrorDetail::Text(text) => text.clone(),
                ApiErrorDetail::Detailed { message } => message.clone(),
            })
        })
    }

    fn validation_errors(self) -> Vec<ValidationError> {
        let Some(serde_json::Value::Object(errors)) = self.errors else {
            return Vec::new();
        };

        errors
            .into_iter()
            .flat_map(|(field, messages)| {
                let messages = match messages {
                    serde_json::Value::Array(items) => items,
                    other => vec![other],
                };
                messages.into_iter().map(move |m| ValidationError {
                    field: field.clone(),
                    message: m.as_str().map(String::from).unwrap_or_else(|| m.to_string()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(400, "BadRequest")]
    #[case(401, "Unauthorized")]
    #[case(403, "Forbidden")]
    #[case(404, "NotFound")]
    #[case(409, "Conflict")]
    #[case(422, "UnprocessableEntity")]
    #[case(500, "ServerError")]
    #[case(503, "ServerError")]
    #[case(418, "Api")]
    fn test_status_classification(#[case] status: u16, #[case] expected: &str) {
        let error = Error::from_response(status, r#"{"message":"nope"}"#);
        let name = format!("{:?}", error);
        assert!(
            name.starts_with(expected),
            "{} should map to {}, got {}",
            status,
            expected,
            name
        );
        assert_eq!(error.status(), Some(status));
    }

    #[test]
    fn test_message_from_nested_error_object() {
        let error = Error::from_response(404, r#"{"error":{"message":"Server 7 not found"}}"#);
        assert_matches!(error, Error::NotFound(msg) if msg == "Server 7 not found");
    }

    #[test]
    fn test_message_from_error_string() {
        let error = Error::from_response(403, r#"{"error":"token expired"}"#);
        assert_matches!(error, Error::Forbidden(msg) if msg == "token expired");
    }

    #[test]
    fn test_plain_text_fallback() {
        let error = Error::from_response(500, "Internal Server Error");
        assert_matches!(
            error,
            Error::ServerError { status: 500, message } if message == "Internal Server Error"
        );
    }

    #[test]
    fn test_validation_errors_parsed() {
        let body = r#"{"message":"invalid","errors":{"name":["is required","is too short"],"size":"must be positive"}}"#;
        let error = Error::from_response(422, body);
        match error {
            Error::UnprocessableEntity { message, errors } => {
                assert_eq!(message, "invalid");
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.field == "size" && e.message == "must be positive"));
            }
            other => panic!("Expected UnprocessableEntity, got {:?}", other),
        }
    }

    #[test]
    fn test_predicates() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::Forbidden("x".into()).is_not_found());
        assert!(Error::Connection("refused".into()).is_transport());
        assert!(Error::Timeout(Duration::from_secs(5)).is_transport());
        assert!(Error::Other(anyhow::anyhow!("boom")).is_foreign());
        assert!(!Error::MissingIdentity("Server").is_foreign());
    }

    #[test]
    fn test_sync_failed_keeps_source() {
        use std::error::Error as _;

        let error = Error::SyncFailed {
            kind: "Server",
            id: 7,
            source: Box::new(Error::Uncollapsable {
                kind: "Server",
                field: "labels".into(),
            }),
        };
        assert_eq!(
            error.to_string(),
            "Failed to sync Server #7: Field 'labels' of Server cannot be collapsed"
        );
        assert!(error.source().is_some());
    }
}
