//! Per-request parameters

use crate::error::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

/// Body, query string and extra headers of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    json: Option<Value>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl RequestParams {
    /// Empty parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Append a query pair.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append query pairs from a JSON object.
    ///
    /// Strings are sent verbatim, `null` values are skipped and arrays become
    /// repeated keys; everything else uses its JSON rendering.
    pub fn query_object(mut self, filter: &serde_json::Map<String, Value>) -> Self {
        for (key, value) in filter {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        self.query.push((key.clone(), query_value(item)));
                    }
                }
                other => self.query.push((key.clone(), query_value(other))),
            }
        }
        self
    }

    /// Try to set a header, returning an error if the name or value is invalid.
    ///
    /// # Errors
    /// Returns an error if the header name or value contains invalid characters.
    pub fn try_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key = key_str
            .parse::<HeaderName>()
            .map_err(|_| Error::InvalidHeaderName(key_str.clone()))?;
        let value = value_str
            .parse::<HeaderValue>()
            .map_err(|_| Error::InvalidHeaderValue(value_str.clone()))?;

        self.headers.insert(key, value);
        Ok(self)
    }

    /// Whether a query key is already present.
    pub fn has_query(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }

    /// The JSON body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Query pairs in insertion order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Extra headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_object_encoding() {
        let filter = json!({
            "name": "web",
            "size": 4,
            "active": true,
            "skip": null,
            "tag": ["a", "b"],
        });
        let params = RequestParams::new().query_object(filter.as_object().unwrap());

        let pairs = params.query_pairs();
        assert!(pairs.contains(&("name".into(), "web".into())));
        assert!(pairs.contains(&("size".into(), "4".into())));
        assert!(pairs.contains(&("active".into(), "true".into())));
        assert!(pairs.contains(&("tag".into(), "a".into())));
        assert!(pairs.contains(&("tag".into(), "b".into())));
        assert!(!params.has_query("skip"));
    }

    #[test]
    fn test_try_header_rejects_invalid_name() {
        let result = RequestParams::new().try_header("bad header", "x");
        assert!(matches!(result, Err(Error::InvalidHeaderName(_))));

        let params = RequestParams::new().try_header("x-trace", "abc").unwrap();
        assert_eq!(params.headers()["x-trace"], "abc");
    }
}
