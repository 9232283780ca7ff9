//! Transport trait for abstracting the HTTP backend
//!
//! The SDK never issues HTTP calls directly; every endpoint goes through a
//! `Transport`, which keeps the entity model and the polling layer testable
//! without a network and lets callers plug in their own client.

use crate::{
    error::Result,
    http::{Method, RequestParams, WireResponse},
};
use async_trait::async_trait;
use std::fmt;

/// Backend that performs HTTP requests.
///
/// Implementations return the response as-is, whatever its status; turning a
/// non-success status into an [`Error`](crate::Error) is the caller's job
/// (see [`WireResponse::error_for_status`]). Socket-level failures are
/// returned as [`Error::Connection`](crate::Error::Connection) or
/// [`Error::Timeout`](crate::Error::Timeout). Requests are never retried.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Perform one request.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - path relative to the configured base URI (e.g. `"servers/7"`)
    /// * `params` - JSON body, query string and extra headers
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
    ) -> Result<WireResponse>;

    /// Get the base URI for this transport (for debugging).
    fn base_uri(&self) -> &str;
}
