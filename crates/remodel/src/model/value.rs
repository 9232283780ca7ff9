//! Typed field values

use super::{Collection, Entity};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// Value of one entity field.
///
/// Wire data is untyped JSON; the declared [`FieldKind`](super::FieldKind) of
/// a field decides which variant a value becomes when it is synced.
#[derive(Debug, Clone, Default)]
pub enum FieldValue {
    /// Absent
    #[default]
    Null,
    /// Plain JSON (string, number, bool, or a raw list/map)
    Scalar(Value),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Nested record
    Entity(Box<Entity>),
    /// Nested list of records
    Collection(Collection),
}

impl FieldValue {
    /// Whether the value is absent.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Raw JSON, for scalar values.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// String contents, for string scalars.
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    /// Integer contents, for integer scalars.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Value::as_i64)
    }

    /// Boolean contents, for boolean scalars.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(Value::as_bool)
    }

    /// The timestamp, for timestamp values.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// The nested record, for child values.
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// The nested list, for collection values.
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            FieldValue::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Numeric identity carried by this value.
    ///
    /// Child entities report their own identity; scalars are read as an id
    /// when they are a non-negative integer or a numeric string.
    pub fn id(&self) -> Option<u64> {
        match self {
            FieldValue::Scalar(value) => id_of(value),
            FieldValue::Entity(entity) => entity.id(),
            _ => None,
        }
    }

    /// Flatten to JSON with nested records replaced by their identity.
    ///
    /// Timestamps become epoch seconds and collections become id lists.
    pub fn to_plain_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Scalar(value) => value.clone(),
            FieldValue::Timestamp(ts) => Value::from(ts.timestamp()),
            FieldValue::Entity(entity) => entity.id_value(),
            FieldValue::Collection(collection) => Value::Array(collection.id_values()),
        }
    }

    /// Loose comparison against a filter value.
    ///
    /// Numbers and numeric strings compare by value, timestamps match epoch
    /// seconds or a parseable date, and nested records match their identity.
    pub fn matches_json(&self, expected: &Value) -> bool {
        match (self, expected) {
            (FieldValue::Null, Value::Null) => true,
            (FieldValue::Null, _) | (_, Value::Null) => false,
            (FieldValue::Scalar(actual), expected) => loose_eq(actual, expected),
            (FieldValue::Timestamp(ts), expected) => matches!(
                coerce_timestamp(expected),
                Ok(Some(other)) if other == *ts
            ),
            (FieldValue::Entity(entity), Value::Object(map)) => map
                .get(entity.schema().id_field)
                .is_some_and(|id| loose_eq(&entity.id_value(), id)),
            (FieldValue::Entity(entity), expected) => loose_eq(&entity.id_value(), expected),
            (FieldValue::Collection(collection), Value::Array(items)) => {
                let ids = collection.id_values();
                ids.len() == items.len() && ids.iter().zip(items).all(|(a, b)| loose_eq(a, b))
            }
            (FieldValue::Collection(_), _) => false,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::Entity(a), FieldValue::Entity(b)) => a.same_state(b),
            (FieldValue::Collection(a), FieldValue::Collection(b)) => {
                a.kind() == b.kind()
                    && a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.same_state(y))
            }
            _ => false,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            other => FieldValue::Scalar(other),
        }
    }
}

impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        FieldValue::from(value.clone())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Scalar(Value::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::from(Value::from(value))
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Entity> for FieldValue {
    fn from(value: Entity) -> Self {
        FieldValue::Entity(Box::new(value))
    }
}

impl From<Collection> for FieldValue {
    fn from(value: Collection) -> Self {
        FieldValue::Collection(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Read a JSON value as a numeric identity.
pub(crate) fn id_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Convert wire data into a timestamp.
///
/// `Ok(None)` means the value denotes "no timestamp" (null, `0`, empty string).
pub(crate) fn coerce_timestamp(value: &Value) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                if secs == 0 {
                    return Ok(None);
                }
                return DateTime::from_timestamp(secs, 0)
                    .map(Some)
                    .ok_or_else(|| format!("epoch {} out of range", secs));
            }
            let secs = n.as_f64().unwrap_or_default();
            if secs == 0.0 {
                return Ok(None);
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
            DateTime::from_timestamp(whole, nanos)
                .map(Some)
                .ok_or_else(|| format!("epoch {} out of range", secs))
        }
        Value::String(s) => parse_timestamp(s.trim()),
        other => Err(format!("cannot read {} as a timestamp", type_name(other))),
    }
}

fn parse_timestamp(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return coerce_timestamp(&Value::from(secs));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Some(naive.and_utc()));
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(naive.and_utc()));
    }
    Err(format!("unrecognized date '{}'", raw))
}

/// Wire rendering of a timestamp in write payloads.
pub(crate) fn timestamp_to_wire(ts: &DateTime<Utc>) -> Value {
    Value::from(ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s == if *b { "true" } else { "false" }
        }
        _ => false,
    }
}

/// Ordering used by collection sorting.
///
/// Values of different shapes order as null, booleans, numbers, strings,
/// timestamps, records, lists, then anything else.
pub(crate) fn sort_cmp(a: &FieldValue, b: &FieldValue) -> Ordering {
    fn rank(value: &FieldValue) -> u8 {
        match value {
            FieldValue::Null | FieldValue::Scalar(Value::Null) => 0,
            FieldValue::Scalar(Value::Bool(_)) => 1,
            FieldValue::Scalar(Value::Number(_)) => 2,
            FieldValue::Scalar(Value::String(_)) => 3,
            FieldValue::Timestamp(_) => 4,
            FieldValue::Entity(_) => 5,
            FieldValue::Collection(_) => 6,
            FieldValue::Scalar(_) => 7,
        }
    }

    match (a, b) {
        (FieldValue::Scalar(Value::Bool(x)), FieldValue::Scalar(Value::Bool(y))) => x.cmp(y),
        (FieldValue::Scalar(Value::Number(x)), FieldValue::Scalar(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (FieldValue::Scalar(Value::String(x)), FieldValue::Scalar(Value::String(y))) => x.cmp(y),
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => x.cmp(y),
        (FieldValue::Entity(x), FieldValue::Entity(y)) => x.id().cmp(&y.id()),
        (FieldValue::Collection(x), FieldValue::Collection(y)) => x.len().cmp(&y.len()),
        (FieldValue::Scalar(x), FieldValue::Scalar(y)) if rank(a) == rank(b) => {
            x.to_string().cmp(&y.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(0), None)]
    #[case(json!(null), None)]
    #[case(json!(""), None)]
    #[case(json!(1_700_000_000), Some(1_700_000_000))]
    #[case(json!("1700000000"), Some(1_700_000_000))]
    #[case(json!("2023-11-14T22:13:20Z"), Some(1_700_000_000))]
    #[case(json!("2023-11-14T23:13:20+01:00"), Some(1_700_000_000))]
    #[case(json!("2023-11-14 22:13:20"), Some(1_700_000_000))]
    #[case(json!("2023-11-14"), Some(1_699_920_000))]
    fn test_coerce_timestamp(#[case] input: Value, #[case] expected: Option<i64>) {
        let parsed = coerce_timestamp(&input).unwrap();
        assert_eq!(parsed.map(|ts| ts.timestamp()), expected);
    }

    #[rstest]
    #[case(json!("next tuesday"))]
    #[case(json!(true))]
    #[case(json!({"at": 1}))]
    fn test_coerce_timestamp_rejects(#[case] input: Value) {
        assert!(coerce_timestamp(&input).is_err());
    }

    #[test]
    fn test_fractional_epoch() {
        let ts = coerce_timestamp(&json!(1.5)).unwrap().unwrap();
        assert_eq!(ts.timestamp(), 1);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_id_of() {
        assert_eq!(id_of(&json!(7)), Some(7));
        assert_eq!(id_of(&json!("42")), Some(42));
        assert_eq!(id_of(&json!(-1)), None);
        assert_eq!(id_of(&json!("abc")), None);
        assert_eq!(id_of(&json!(null)), None);
    }

    #[test]
    fn test_json_null_becomes_null_variant() {
        assert!(FieldValue::from(json!(null)).is_null());
        assert!(FieldValue::from(None::<&str>).is_null());
        assert_eq!(FieldValue::from(Some("a")), FieldValue::from("a"));
    }

    #[test]
    fn test_matches_json_is_loose() {
        assert!(FieldValue::from(7).matches_json(&json!("7")));
        assert!(FieldValue::from("7").matches_json(&json!(7)));
        assert!(FieldValue::from(true).matches_json(&json!("true")));
        assert!(!FieldValue::from("running").matches_json(&json!("off")));
        assert!(!FieldValue::Null.matches_json(&json!("x")));

        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(FieldValue::from(ts).matches_json(&json!(1_700_000_000)));
        assert!(FieldValue::from(ts).matches_json(&json!("2023-11-14T22:13:20Z")));
    }

    #[test]
    fn test_sort_order_across_shapes() {
        let mut values = vec![
            FieldValue::from("b"),
            FieldValue::from(10),
            FieldValue::Null,
            FieldValue::from(2),
            FieldValue::from("a"),
            FieldValue::from(false),
        ];
        values.sort_by(sort_cmp);
        assert_eq!(
            values,
            vec![
                FieldValue::Null,
                FieldValue::from(false),
                FieldValue::from(2),
                FieldValue::from(10),
                FieldValue::from("a"),
                FieldValue::from("b"),
            ]
        );
    }

    #[test]
    fn test_timestamp_wire_format() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(timestamp_to_wire(&ts), json!("2023-11-14T22:13:20Z"));
        assert_eq!(FieldValue::from(ts).to_plain_json(), json!(1_700_000_000));
    }
}
