//! Typed local representation of one remote record

use super::value::{coerce_timestamp, id_of, timestamp_to_wire, type_name};
use super::{Access, Collection, EntitySchema, FieldDef, FieldKind, FieldValue};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Capability to re-fetch a record by identity.
///
/// Injected into entities so that reading an absent field can hydrate the
/// entity from the remote side. [`Endpoint`](crate::Endpoint) is the usual
/// implementation.
#[async_trait]
pub trait EntityLoader: Send + Sync + fmt::Debug {
    /// Kind of entity this loader fetches.
    fn kind(&self) -> &'static str;

    /// Fetch the full wire record for `id`.
    async fn load(&self, id: u64) -> Result<Value>;
}

/// One remote record with typed, declared fields.
///
/// # Example
///
/// ```rust
/// use remodel::resources::SERVER;
/// use remodel::model::Entity;
/// use serde_json::json;
///
/// let mut server = Entity::from_wire(&SERVER, &json!({
///     "id": 7,
///     "name": "web-1",
///     "location": {"id": 3, "name": "Falkenstein"},
/// })).unwrap();
///
/// server.set("name", "web-2").unwrap();
/// let collapsed = server.to_collapsed_array().unwrap();
/// assert_eq!(collapsed["location_id"], json!(3));
/// assert_eq!(collapsed["name"], json!("web-2"));
/// ```
#[derive(Clone)]
pub struct Entity {
    schema: &'static EntitySchema,
    values: BTreeMap<&'static str, FieldValue>,
    hydrated: bool,
    loader: Option<Arc<dyn EntityLoader>>,
}

impl Entity {
    /// An empty draft with every declared field absent.
    pub fn new(schema: &'static EntitySchema) -> Self {
        Self {
            schema,
            values: blank_values(schema),
            hydrated: false,
            loader: None,
        }
    }

    /// A stub carrying only an identity.
    pub fn with_id(schema: &'static EntitySchema, id: u64) -> Self {
        Self::stub(schema, Value::from(id))
    }

    fn stub(schema: &'static EntitySchema, id: Value) -> Self {
        let mut entity = Self::new(schema);
        entity.values.insert(schema.id_field, FieldValue::from(id));
        entity
    }

    /// Build an entity from a wire record.
    pub fn from_wire(schema: &'static EntitySchema, data: &Value) -> Result<Self> {
        let Value::Object(map) = data else {
            return Err(Error::MalformedRecord(format!(
                "expected a {} record, got {}",
                schema.kind,
                type_name(data)
            )));
        };
        let mut entity = Self::new(schema);
        entity.sync(map, true)?;
        Ok(entity)
    }

    /// Schema of this entity.
    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Entity type name.
    pub fn kind(&self) -> &'static str {
        self.schema.kind
    }

    /// Whether a lazy hydration already happened.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Whether a loader is attached.
    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    /// Attach the capability used for lazy hydration.
    ///
    /// Fails with [`Error::WrongModelForEndpoint`] when the loader fetches a
    /// different kind of entity.
    pub fn attach_loader(&mut self, loader: Arc<dyn EntityLoader>) -> Result<&mut Self> {
        if loader.kind() != self.kind() {
            return Err(Error::WrongModelForEndpoint {
                expected: loader.kind(),
                actual: self.kind(),
            });
        }
        self.loader = Some(loader);
        Ok(self)
    }

    /// Attach a loader already known to fetch this kind.
    pub(crate) fn bind(&mut self, loader: Arc<dyn EntityLoader>) {
        self.loader = Some(loader);
    }

    /// Drop the attached loader.
    pub fn detach_loader(&mut self) -> &mut Self {
        self.loader = None;
        self
    }

    /// Identity as raw JSON (`null` when absent).
    pub fn id_value(&self) -> Value {
        match self.values.get(self.schema.id_field) {
            Some(FieldValue::Scalar(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    /// Numeric identity, if the entity has one.
    pub fn id(&self) -> Option<u64> {
        id_of(&self.id_value())
    }

    /// Whether the entity exists on the remote side.
    pub fn is_real(&self) -> bool {
        self.id().is_some_and(|id| id > 0)
    }

    /// Same kind and same identity. Drafts never equal anything.
    pub fn equals(&self, other: &Entity) -> bool {
        self.schema.same_kind(other.schema) && self.is_real() && self.id() == other.id()
    }

    pub(crate) fn same_state(&self, other: &Entity) -> bool {
        self.schema.same_kind(other.schema) && self.values == other.values
    }

    pub(crate) fn clear_identity(&mut self) {
        self.values.insert(self.schema.id_field, FieldValue::Null);
    }

    /// Whether `name` (or the field it aliases) is declared.
    ///
    /// Read-only fields only count when `include_readonly` is set.
    pub fn field_exists(&self, name: &str, include_readonly: bool) -> bool {
        match self.schema.resolve(name).map(|def| def.access) {
            Some(Access::Writable) => true,
            Some(Access::Readonly) => include_readonly,
            _ => false,
        }
    }

    /// Read a field, hydrating the entity once if the value is absent.
    ///
    /// Aliases resolve to their canonical field and dotted paths such as
    /// `"location.name"` read through nested records. Hydration happens at
    /// most once per instance and only fills fields that are still absent.
    pub async fn get(&mut self, name: &str) -> Result<FieldValue> {
        let mut segments = name.split('.');
        let head = segments.next().unwrap_or(name);
        let mut value = self.get_field(head).await?;

        for segment in segments {
            value = match value {
                FieldValue::Null => return Ok(FieldValue::Null),
                FieldValue::Entity(mut child) => child.get_field(segment).await?,
                _ => {
                    return Err(Error::UnknownField {
                        kind: self.kind(),
                        field: name.to_string(),
                    });
                }
            };
        }

        Ok(value)
    }

    async fn get_field(&mut self, name: &str) -> Result<FieldValue> {
        let def = self.resolve(name)?;
        let value = self.read(def);
        if !value.is_null() || self.hydrated || !self.is_real() {
            return Ok(value);
        }

        match self.loader.clone() {
            Some(loader) => {
                self.hydrate(loader.as_ref()).await?;
                Ok(self.read(def))
            }
            None => Ok(value),
        }
    }

    async fn hydrate(&mut self, loader: &dyn EntityLoader) -> Result<()> {
        let id = self.id().ok_or(Error::MissingIdentity(self.kind()))?;
        debug!(kind = self.kind(), id, "Hydrating entity");

        let fetched = Entity::from_wire(self.schema, &loader.load(id).await?)?;
        for (name, value) in fetched.values {
            let slot = self.values.entry(name).or_default();
            if slot.is_null() {
                *slot = value;
            }
        }
        self.hydrated = true;
        Ok(())
    }

    /// Read a field without hydrating.
    ///
    /// Returns `None` when no such field is declared.
    pub fn peek(&self, name: &str) -> Option<FieldValue> {
        let mut segments = name.split('.');
        let head = segments.next()?;
        let mut value = self.read(self.schema.resolve(head)?);

        for segment in segments {
            value = match value {
                FieldValue::Null => return Some(FieldValue::Null),
                FieldValue::Entity(child) => child.read(child.schema.resolve(segment)?),
                _ => return None,
            };
        }
        Some(value)
    }

    fn resolve(&self, name: &str) -> Result<&'static FieldDef> {
        self.schema.resolve(name).ok_or_else(|| Error::UnknownField {
            kind: self.kind(),
            field: name.to_string(),
        })
    }

    fn read(&self, def: &FieldDef) -> FieldValue {
        match def.getter {
            Some(getter) => getter(self),
            None => self.values.get(def.name).cloned().unwrap_or_default(),
        }
    }

    /// Assign a writable field.
    ///
    /// Fails with [`Error::NoSuchWritableField`] for unknown or read-only
    /// names. The value is coerced to the declared field shape; a value that
    /// does not fit leaves the entity untouched and fails with
    /// [`Error::SyncFailed`].
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        let def = self
            .schema
            .resolve(name)
            .filter(|def| def.access == Access::Writable)
            .ok_or_else(|| Error::NoSuchWritableField {
                kind: self.kind(),
                field: name.to_string(),
            })?;

        let value = value.into();
        let incoming_id = if def.name == self.schema.id_field {
            value.id()
        } else {
            None
        };
        self.merge(vec![(def, value)], false, incoming_id)?;
        Ok(self)
    }

    /// Merge wire data into the entity.
    ///
    /// With `hard`, every field is reset first and the hydration flag is
    /// cleared. Unknown keys and dotted keys are skipped. The call is
    /// all-or-nothing: on failure the previous state is restored and
    /// [`Error::SyncFailed`] is returned.
    pub fn sync(&mut self, data: &Map<String, Value>, hard: bool) -> Result<&mut Self> {
        let incoming_id = data.get(self.schema.id_field).and_then(id_of);

        let mut entries = Vec::with_capacity(data.len());
        for (key, value) in data {
            if key.contains('.') {
                trace!(kind = self.kind(), key = %key, "Skipping nested-path key");
                continue;
            }
            match self.schema.resolve(key) {
                Some(def) => entries.push((def, FieldValue::from(value))),
                None => trace!(kind = self.kind(), key = %key, "Skipping undeclared key"),
            }
        }

        self.merge(entries, hard, incoming_id)?;
        Ok(self)
    }

    fn merge(
        &mut self,
        entries: Vec<(&'static FieldDef, FieldValue)>,
        hard: bool,
        incoming_id: Option<u64>,
    ) -> Result<()> {
        let snapshot = self.values.clone();
        let was_hydrated = self.hydrated;

        if hard {
            self.values = blank_values(self.schema);
            self.hydrated = false;
        }

        for (def, value) in entries {
            match coerce(self.schema, def, value) {
                Ok(value) => {
                    self.values.insert(def.name, value);
                }
                Err(source) => {
                    self.values = snapshot;
                    self.hydrated = was_hydrated;
                    let id = incoming_id.or_else(|| self.id()).unwrap_or(0);
                    warn!(kind = self.kind(), id, error = %source, "Sync failed, state restored");
                    return Err(Error::SyncFailed {
                        kind: self.kind(),
                        id,
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(())
    }

    /// Render every declared field, identity first then by name.
    ///
    /// With `recurse`, nested records expand to their collapsed form plus an
    /// `identity` display string and timestamps render as epoch seconds.
    /// Without it, nested records reduce to ids and timestamps to RFC 3339.
    pub fn to_array(&self, recurse: bool) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        out.insert(self.schema.id_field.to_string(), self.id_value());

        let mut defs: Vec<_> = self
            .schema
            .canonical_fields()
            .filter(|def| def.name != self.schema.id_field)
            .collect();
        defs.sort_by_key(|def| def.name);

        for def in defs {
            let rendered = match self.read(def) {
                FieldValue::Null => Value::Null,
                FieldValue::Scalar(value) => value,
                FieldValue::Timestamp(ts) if recurse => Value::from(ts.timestamp()),
                FieldValue::Timestamp(ts) => timestamp_to_wire(&ts),
                FieldValue::Entity(child) if recurse => Value::Object(child.expanded()?),
                FieldValue::Entity(child) => child.id_value(),
                FieldValue::Collection(items) if recurse => {
                    let mut members: Vec<&Entity> = items.iter().collect();
                    members.sort_by_key(|child| child.id());
                    Value::Array(
                        members
                            .into_iter()
                            .map(|child| child.expanded().map(Value::Object))
                            .collect::<Result<_>>()?,
                    )
                }
                FieldValue::Collection(items) => Value::Array(items.id_values()),
            };
            out.insert(def.name.to_string(), rendered);
        }

        Ok(out)
    }

    fn expanded(&self) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        out.insert(self.schema.id_field.to_string(), self.id_value());
        out.extend(self.to_collapsed_array()?);
        out.insert("identity".to_string(), Value::from(self.to_string()));
        Ok(out)
    }

    /// The write form: every writable field, nested records reduced to ids.
    ///
    /// Keys are the collapse target names where declared, else the field
    /// names, sorted. Fails with [`Error::Uncollapsable`] when a raw value
    /// cannot be reduced to scalars or ids.
    pub fn to_collapsed_array(&self) -> Result<Map<String, Value>> {
        let mut sorted = BTreeMap::new();
        for def in self.schema.writable_fields() {
            let collapsed = self.collapse(def, self.read(def))?;
            sorted.insert(def.output_key(), collapsed);
        }
        Ok(sorted
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect())
    }

    /// Collapse a wire record of this entity's type without keeping it.
    pub fn to_collapsed_array_of(&self, data: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut scratch = Entity::new(self.schema);
        scratch.sync(data, true)?;
        scratch.to_collapsed_array()
    }

    fn collapse(&self, def: &FieldDef, value: FieldValue) -> Result<Value> {
        let uncollapsable = || Error::Uncollapsable {
            kind: self.kind(),
            field: def.name.to_string(),
        };

        match value {
            FieldValue::Null => Ok(Value::Null),
            FieldValue::Timestamp(ts) => Ok(timestamp_to_wire(&ts)),
            FieldValue::Entity(child) => Ok(child.id_value()),
            FieldValue::Collection(items) => Ok(Value::Array(items.id_values())),
            FieldValue::Scalar(Value::Object(map)) => {
                map.get("id").cloned().ok_or_else(uncollapsable)
            }
            FieldValue::Scalar(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => map.get("id").cloned().ok_or_else(uncollapsable),
                    Value::Array(_) => Err(uncollapsable()),
                    scalar => Ok(scalar),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            FieldValue::Scalar(scalar) => Ok(scalar),
        }
    }
}

fn blank_values(schema: &'static EntitySchema) -> BTreeMap<&'static str, FieldValue> {
    schema
        .canonical_fields()
        .map(|def| (def.name, FieldValue::Null))
        .collect()
}

/// Fit a value to the declared shape of `def`.
fn coerce(schema: &'static EntitySchema, def: &FieldDef, value: FieldValue) -> Result<FieldValue> {
    let invalid = |reason: String| Error::InvalidFieldValue {
        kind: schema.kind,
        field: def.name,
        reason,
    };

    match (def.kind, value) {
        (_, FieldValue::Null) => Ok(FieldValue::Null),

        (FieldKind::Scalar, FieldValue::Scalar(v)) => Ok(FieldValue::Scalar(v)),
        (FieldKind::Scalar, FieldValue::Timestamp(ts)) => Ok(FieldValue::Timestamp(ts)),
        (FieldKind::Scalar, _) => Err(invalid("expected a plain value".to_string())),

        (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => Ok(FieldValue::Timestamp(ts)),
        (FieldKind::Timestamp, FieldValue::Scalar(v)) => coerce_timestamp(&v)
            .map(FieldValue::from)
            .map_err(invalid),
        (FieldKind::Timestamp, _) => Err(invalid("expected a timestamp".to_string())),

        (FieldKind::Child(child), value) => child_entity(child, value)
            .map(FieldValue::from)
            .map_err(|e| e.unwrap_or_else(|reason| invalid(reason))),

        (FieldKind::Collection(child), FieldValue::Collection(items)) => {
            if items.schema().same_kind(child) {
                Ok(FieldValue::Collection(items))
            } else {
                Err(invalid(format!(
                    "expected a collection of {}, got {}",
                    child.kind,
                    items.kind()
                )))
            }
        }
        (FieldKind::Collection(child), FieldValue::Scalar(Value::Array(items))) => {
            let mut collection = Collection::new(child);
            for item in items {
                let member = child_entity(child, FieldValue::from(item))
                    .map_err(|e| e.unwrap_or_else(|reason| invalid(reason)))?;
                collection.add(member)?;
            }
            Ok(FieldValue::Collection(collection))
        }
        (FieldKind::Collection(child), _) => {
            Err(invalid(format!("expected a list of {}", child.kind)))
        }
    }
}

/// Build a nested record from an entity, a map or a bare identity.
///
/// The error is either a nested failure to propagate as-is, or a reason the
/// value does not fit.
fn child_entity(
    schema: &'static EntitySchema,
    value: FieldValue,
) -> std::result::Result<Entity, std::result::Result<Error, String>> {
    match value {
        FieldValue::Entity(entity) if entity.schema.same_kind(schema) => Ok(*entity),
        FieldValue::Entity(entity) => Err(Err(format!(
            "expected {}, got {}",
            schema.kind,
            entity.kind()
        ))),
        FieldValue::Scalar(Value::Object(map)) => {
            let mut entity = Entity::new(schema);
            entity.sync(&map, true).map_err(Ok)?;
            Ok(entity)
        }
        FieldValue::Scalar(id @ (Value::Number(_) | Value::String(_))) => {
            Ok(Entity::stub(schema, id))
        }
        FieldValue::Scalar(other) => Err(Err(format!(
            "expected {} or its id, got {}",
            schema.kind,
            type_name(&other)
        ))),
        _ => Err(Err(format!("expected {} or its id", schema.kind))),
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display = self
            .schema
            .display_field
            .and_then(|field| self.peek(field))
            .and_then(|value| match value {
                FieldValue::Scalar(Value::String(s)) => Some(s),
                FieldValue::Scalar(Value::Null) | FieldValue::Null => None,
                FieldValue::Scalar(other) => Some(other.to_string()),
                _ => None,
            });

        match (display, self.id_value()) {
            (Some(name), _) => write!(f, "{}", name),
            (None, Value::Null) => write!(f, "{} (new)", self.kind()),
            (None, Value::String(id)) => write!(f, "{} #{}", self.kind(), id),
            (None, id) => write!(f, "{} #{}", self.kind(), id),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind())
            .field("values", &self.values)
            .field("hydrated", &self.hydrated)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}
