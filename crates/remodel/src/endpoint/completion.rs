//! Completion checks backed by an endpoint

use super::Endpoint;
use crate::error::Result;
use crate::model::Entity;
use crate::operation::Completion;
use async_trait::async_trait;
use serde_json::Value;

/// Done once the subject can be re-fetched. A 404 means "not yet".
#[derive(Debug)]
pub struct Retrieved {
    endpoint: Endpoint,
}

impl Retrieved {
    /// Check against `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Completion for Retrieved {
    async fn is_done(&mut self, subject: &mut Entity) -> Result<bool> {
        match self.endpoint.sync(subject).await {
            Ok(()) => Ok(true),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }
}

/// Done once the record answers 404; the subject's identity is then cleared.
#[derive(Debug)]
pub struct Deleted {
    endpoint: Endpoint,
    id: u64,
}

impl Deleted {
    /// Watch `id` on `endpoint`.
    pub fn new(endpoint: Endpoint, id: u64) -> Self {
        Self { endpoint, id }
    }
}

#[async_trait]
impl Completion for Deleted {
    async fn is_done(&mut self, subject: &mut Entity) -> Result<bool> {
        match self.endpoint.retrieve(self.id).await {
            Ok(_) => Ok(false),
            Err(error) if error.is_not_found() => {
                subject.clear_identity();
                Ok(true)
            }
            Err(error) => Err(error),
        }
    }
}

/// Done once a re-fetched field equals the expected value.
#[derive(Debug)]
pub struct FieldEquals {
    endpoint: Endpoint,
    field: String,
    expected: Value,
}

impl FieldEquals {
    /// Compare `field` against `expected` after every re-fetch.
    pub fn new(endpoint: Endpoint, field: impl Into<String>, expected: Value) -> Self {
        Self {
            endpoint,
            field: field.into(),
            expected,
        }
    }
}

#[async_trait]
impl Completion for FieldEquals {
    async fn is_done(&mut self, subject: &mut Entity) -> Result<bool> {
        match self.endpoint.sync(subject).await {
            Ok(()) => Ok(subject
                .peek(&self.field)
                .is_some_and(|value| value.matches_json(&self.expected))),
            Err(error) if error.is_not_found() => Ok(false),
            Err(error) => Err(error),
        }
    }
}
