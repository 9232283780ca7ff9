//! Centralized observability utilities for structured logging
//!
//! All HTTP requests/responses and all completion polling are logged through
//! this layer so field names stay consistent across the crate.

use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum length of a response body excerpt included in error logs.
const MAX_LOG_BODY_LENGTH: usize = 200;

/// HTTP request metadata for structured logging
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path
    pub path: String,
    /// Request body size in bytes (optional)
    pub body_size: Option<usize>,
}

impl RequestMetadata {
    /// Create new request metadata
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body_size: None,
        }
    }

    /// Set the request body size
    pub fn with_body_size(mut self, size: usize) -> Self {
        self.body_size = Some(size);
        self
    }

    /// Log request being sent
    pub fn log_request(&self) {
        debug!(
            method = %self.method,
            path = %self.path,
            body_size = self.body_size,
            "Sending HTTP request"
        );
    }
}

/// HTTP response metadata for structured logging
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// HTTP status code
    pub status: u16,
    /// Response body size in bytes (optional)
    pub body_size: Option<usize>,
    /// Time elapsed for the request
    pub elapsed: Duration,
}

impl ResponseMetadata {
    /// Create new response metadata
    pub fn new(status: u16, elapsed: Duration) -> Self {
        Self {
            status,
            body_size: None,
            elapsed,
        }
    }

    /// Set the response body size
    pub fn with_body_size(mut self, size: usize) -> Self {
        self.body_size = Some(size);
        self
    }

    /// Log successful response
    pub fn log_success(&self, request: &RequestMetadata) {
        debug!(
            method = %request.method,
            path = %request.path,
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            body_size = self.body_size,
            "HTTP request succeeded"
        );
    }

    /// Log failed response
    ///
    /// Only a sanitized, truncated excerpt of the body is logged.
    pub fn log_error(&self, request: &RequestMetadata, body: &str) {
        warn!(
            method = %request.method,
            path = %request.path,
            status = self.status,
            elapsed_ms = self.elapsed.as_millis(),
            body = %sanitize_for_log(body),
            "HTTP request failed"
        );
    }
}

/// Timer for measuring request duration
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Polling logging context for one operation wait
#[derive(Debug)]
pub struct PollContext {
    /// Entity kind the operation is about
    pub kind: &'static str,
    /// Identity of the subject, if it has one
    pub id: Option<u64>,
    /// Completion checks performed so far
    pub iterations: u32,
}

impl PollContext {
    /// Create new poll context
    pub fn new(kind: &'static str, id: Option<u64>) -> Self {
        Self {
            kind,
            id,
            iterations: 0,
        }
    }

    /// Log wait started
    pub fn log_started(&self, interval: Duration, timeout: Duration) {
        debug!(
            kind = self.kind,
            id = self.id,
            interval_ms = interval.as_millis(),
            timeout_ms = timeout.as_millis(),
            "Waiting for operation to complete"
        );
    }

    /// Record and log one unsuccessful completion check
    pub fn log_pending(&mut self) {
        self.iterations += 1;
        trace!(
            kind = self.kind,
            id = self.id,
            iteration = self.iterations,
            "Operation still pending"
        );
    }

    /// Log operation resolved
    pub fn log_resolved(&self) {
        info!(
            kind = self.kind,
            id = self.id,
            iterations = self.iterations,
            "Operation completed"
        );
    }

    /// Log operation rejected
    pub fn log_rejected(&self, error: &str) {
        warn!(
            kind = self.kind,
            id = self.id,
            iterations = self.iterations,
            error = %error,
            "Operation failed"
        );
    }
}

/// Truncate long bodies and strip control characters before logging.
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Install a `tracing-subscriber` formatter honouring `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "trace")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::{EnvFilter, fmt};

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("remodel=info")),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metadata_with_body_size() {
        let metadata = RequestMetadata::new("PATCH", "servers/7").with_body_size(64);
        assert_eq!(metadata.method, "PATCH");
        assert_eq!(metadata.path, "servers/7");
        assert_eq!(metadata.body_size, Some(64));
    }

    #[test]
    fn test_response_metadata_creation() {
        let elapsed = Duration::from_millis(500);
        let metadata = ResponseMetadata::new(200, elapsed).with_body_size(12);
        assert_eq!(metadata.status, 200);
        assert_eq!(metadata.elapsed, elapsed);
        assert_eq!(metadata.body_size, Some(12));
    }

    #[test]
    fn test_poll_context_counts_iterations() {
        let mut ctx = PollContext::new("Server", Some(7));
        assert_eq!(ctx.iterations, 0);
        ctx.log_pending();
        ctx.log_pending();
        assert_eq!(ctx.iterations, 2);
    }

    #[test]
    fn test_sanitize_truncates_and_strips_control_chars() {
        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");

        let long = "é".repeat(300);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.contains("[truncated, 600 bytes total]"));
    }
}
