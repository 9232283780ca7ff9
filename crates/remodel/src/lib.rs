//! # remodel
//!
//! Typed, locally-mutable entities over REST resources:
//! - Static field registries with aliases, read-only fields and nested records
//! - Collapsed (id-only) write form and minimal PATCH diffs
//! - Lazy hydration of partially-loaded entities
//! - Completion polling for operations the remote side queues
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remodel::Client;
//! use serde_json::{Map, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .base_uri("https://api.example.com/v1")
//!         .api_token("your-token")
//!         .build()?;
//!
//!     let mut server = client.servers().retrieve(7).await?;
//!     let city = server.get("location.name").await?;
//!     println!("{} lives in {:?}", server, city.as_str());
//!
//!     let mut changes = Map::new();
//!     changes.insert("name".into(), json!("web-2"));
//!     client.servers().update(&mut server, &changes).await?;
//!
//!     client.servers().delete(&server).await?.wait().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Re-export commonly used types
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, WaitConfig};
pub use endpoint::{DeleteTarget, Endpoint};
pub use error::{Error, Result};
pub use model::{Collection, Entity, EntityLoader, EntitySchema, FieldDef, FieldValue};
pub use operation::{Completion, Operation, OperationStatus, completion_fn};

// Module declarations
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod model;
pub mod observability;
pub mod operation;
pub mod resources;

// Re-export key dependencies for convenience
pub use async_trait::async_trait;
pub use serde_json::Value as JsonValue;

/// Prelude module for common imports
///
/// # Examples
///
/// ```rust
/// use remodel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Client, Collection, Completion, DeleteTarget, Endpoint, Entity, EntitySchema, Error,
        FieldDef, FieldValue, Operation, OperationStatus, Result, WaitConfig, completion_fn,
    };
}

/// Crate version, automatically updated from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
