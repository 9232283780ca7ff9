//! HTTP transport abstraction
//!
//! Endpoints talk to the remote service only through the [`Transport`] trait.
//! [`ReqwestTransport`] is the default implementation; tests and alternative
//! backends can supply their own.

pub use reqwest_transport::{ReqwestTransport, ReqwestTransportBuilder};
pub use request::RequestParams;
pub use response::WireResponse;
pub use transport::Transport;

mod request;
mod response;
mod reqwest_transport;
pub mod transport;

// Re-export HTTP types from the http crate for convenience
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
