//! Common test utilities and helpers

use remodel::{Client, EntitySchema, FieldDef, WaitConfig};
use serde_json::{Map, Value};
use std::time::Duration;
use wiremock::MockServer;

static WIDGET_FIELDS: &[FieldDef] = &[
    FieldDef::readonly("id"),
    FieldDef::writable("name"),
    FieldDef::writable("color"),
    FieldDef::writable("size"),
    FieldDef::readonly("state"),
];

/// A resource with a server-side lifecycle state.
#[allow(dead_code)]
pub static WIDGET: EntitySchema =
    EntitySchema::new("Widget", WIDGET_FIELDS).with_display_field("name");

/// Route SDK logs to the test harness, honouring `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a test API token
#[allow(dead_code)]
pub fn test_api_token() -> String {
    "tok-test-0123456789abcdef".to_string()
}

/// Fast polling so queued operations settle within a test.
#[allow(dead_code)]
pub fn fast_wait() -> WaitConfig {
    WaitConfig::default()
        .interval(Duration::from_millis(10))
        .timeout(Duration::from_secs(5))
}

/// Client pointed at the mock server.
#[allow(dead_code)]
pub fn client_for(server: &MockServer) -> Client {
    client_with(server, fast_wait())
}

/// Client pointed at the mock server with a custom wait configuration.
#[allow(dead_code)]
pub fn client_with(server: &MockServer, wait: WaitConfig) -> Client {
    Client::builder()
        .base_uri(server.uri())
        .api_token(test_api_token())
        .wait(wait)
        .build()
        .expect("Failed to build client")
}

/// Object literal as a JSON map.
#[allow(dead_code)]
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
