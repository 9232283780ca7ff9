//! Static field registry of an entity type
//!
//! Every entity type is described once, at compile time, by an
//! [`EntitySchema`]: which fields exist, which of them can be written, which
//! names are aliases, which hold nested records and what a nested record
//! collapses to when the entity is written back.
//!
//! ```rust
//! use remodel::model::{EntitySchema, FieldDef};
//!
//! static TAG_FIELDS: &[FieldDef] = &[FieldDef::readonly("id"), FieldDef::writable("label")];
//! static TAG: EntitySchema = EntitySchema::new("Tag", TAG_FIELDS);
//!
//! static NOTE_FIELDS: &[FieldDef] = &[
//!     FieldDef::readonly("id"),
//!     FieldDef::writable("body"),
//!     FieldDef::alias("text", "body"),
//!     FieldDef::writable("tags").collection(&TAG).collapse_to("tag_ids"),
//!     FieldDef::readonly("created_at").timestamp(),
//! ];
//! static NOTE: EntitySchema = EntitySchema::new("Note", NOTE_FIELDS);
//!
//! assert_eq!(NOTE.resolve("text").unwrap().name, "body");
//! ```

use super::{Entity, FieldValue};
use std::fmt;

/// Computes a field's value from the rest of the entity.
pub type Getter = fn(&Entity) -> FieldValue;

/// Shape of the values a field holds.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// Any JSON value, stored as-is
    Scalar,
    /// A point in time; integers are epoch seconds, strings are parsed
    Timestamp,
    /// A single nested record of the given type
    Child(&'static EntitySchema),
    /// A list of nested records of the given type
    Collection(&'static EntitySchema),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar => write!(f, "Scalar"),
            FieldKind::Timestamp => write!(f, "Timestamp"),
            FieldKind::Child(schema) => write!(f, "Child({})", schema.kind),
            FieldKind::Collection(schema) => write!(f, "Collection({})", schema.kind),
        }
    }
}

/// How a field may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Sent on writes, settable locally
    Writable,
    /// Received from the server only
    Readonly,
    /// Another public name for the given canonical field
    AliasOf(&'static str),
}

/// Declaration of a single field.
#[derive(Clone, Copy)]
pub struct FieldDef {
    /// Field name as it appears on the wire
    pub name: &'static str,
    /// Value shape
    pub kind: FieldKind,
    /// Writable, read-only or alias
    pub access: Access,
    /// Output key used when the field is collapsed for a write
    pub collapse_to: Option<&'static str>,
    /// Computed read, replacing the stored value
    pub getter: Option<Getter>,
}

impl FieldDef {
    /// A writable scalar field.
    pub const fn writable(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar,
            access: Access::Writable,
            collapse_to: None,
            getter: None,
        }
    }

    /// A read-only scalar field.
    pub const fn readonly(name: &'static str) -> Self {
        Self {
            access: Access::Readonly,
            ..Self::writable(name)
        }
    }

    /// A second public name for `target`.
    pub const fn alias(name: &'static str, target: &'static str) -> Self {
        Self {
            access: Access::AliasOf(target),
            ..Self::writable(name)
        }
    }

    /// Mark the field as holding timestamps.
    pub const fn timestamp(self) -> Self {
        Self {
            kind: FieldKind::Timestamp,
            ..self
        }
    }

    /// Mark the field as holding one nested record.
    pub const fn child(self, schema: &'static EntitySchema) -> Self {
        Self {
            kind: FieldKind::Child(schema),
            ..self
        }
    }

    /// Mark the field as holding a list of nested records.
    pub const fn collection(self, schema: &'static EntitySchema) -> Self {
        Self {
            kind: FieldKind::Collection(schema),
            ..self
        }
    }

    /// Write the collapsed value under `key` instead of the field name.
    pub const fn collapse_to(self, key: &'static str) -> Self {
        Self {
            collapse_to: Some(key),
            ..self
        }
    }

    /// Compute reads with `getter`.
    pub const fn getter(self, getter: Getter) -> Self {
        Self {
            getter: Some(getter),
            ..self
        }
    }

    /// Whether the field is an alias.
    pub fn is_alias(&self) -> bool {
        matches!(self.access, Access::AliasOf(_))
    }

    /// Key this field is written under in the collapsed form.
    pub fn output_key(&self) -> &'static str {
        self.collapse_to.unwrap_or(self.name)
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field("collapse_to", &self.collapse_to)
            .field("getter", &self.getter.is_some())
            .finish()
    }
}

/// Field registry of one entity type.
pub struct EntitySchema {
    /// Type name, unique per schema
    pub kind: &'static str,
    /// Identity field
    pub id_field: &'static str,
    /// Field shown as the entity's display name
    pub display_field: Option<&'static str>,
    /// Declared fields
    pub fields: &'static [FieldDef],
}

impl EntitySchema {
    /// A schema identified by `id`.
    pub const fn new(kind: &'static str, fields: &'static [FieldDef]) -> Self {
        Self {
            kind,
            id_field: "id",
            display_field: None,
            fields,
        }
    }

    /// Use another identity field.
    pub const fn with_id_field(self, id_field: &'static str) -> Self {
        Self { id_field, ..self }
    }

    /// Show `field` as the display name.
    pub const fn with_display_field(self, field: &'static str) -> Self {
        Self {
            display_field: Some(field),
            ..self
        }
    }

    /// Look up a declaration by its exact name.
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a declaration, following aliases to the canonical field.
    pub fn resolve(&self, name: &str) -> Option<&'static FieldDef> {
        let mut def = self.field(name)?;
        // Alias chains are bounded by the number of declared fields
        for _ in 0..self.fields.len() {
            match def.access {
                Access::AliasOf(target) => def = self.field(target)?,
                _ => return Some(def),
            }
        }
        None
    }

    /// Every non-alias field.
    pub fn canonical_fields(&self) -> impl Iterator<Item = &'static FieldDef> + '_ {
        self.fields.iter().filter(|f| !f.is_alias())
    }

    /// Writable fields.
    pub fn writable_fields(&self) -> impl Iterator<Item = &'static FieldDef> + '_ {
        self.fields.iter().filter(|f| f.access == Access::Writable)
    }

    /// Whether both schemas describe the same entity type.
    pub fn same_kind(&self, other: &EntitySchema) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("kind", &self.kind)
            .field("id_field", &self.id_field)
            .field("fields", &self.fields.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ITEM_FIELDS: &[FieldDef] = &[
        FieldDef::readonly("id"),
    ];

    static ITEM: EntitySchema = EntitySchema::new("Item", ITEM_FIELDS);

    static BOX_FIELDS: &[FieldDef] = &[
        FieldDef::readonly("id"),
        FieldDef::writable("label"),
        FieldDef::alias("title", "label"),
        FieldDef::alias("caption", "title"),
        FieldDef::alias("dangling", "missing"),
        FieldDef::writable("items").collection(&ITEM).collapse_to("item_ids"),
        FieldDef::readonly("sealed_at").timestamp(),
    ];

    static BOX: EntitySchema = EntitySchema::new("Box", BOX_FIELDS)
        .with_display_field("label");

    #[test]
    fn test_resolve_follows_alias_chains() {
        assert_eq!(BOX.resolve("label").unwrap().name, "label");
        assert_eq!(BOX.resolve("title").unwrap().name, "label");
        assert_eq!(BOX.resolve("caption").unwrap().name, "label");
        assert!(BOX.resolve("dangling").is_none());
        assert!(BOX.resolve("nope").is_none());
    }

    #[test]
    fn test_field_sets() {
        let writable: Vec<_> = BOX.writable_fields().map(|f| f.name).collect();
        assert_eq!(writable, vec!["label", "items"]);

        let canonical: Vec<_> = BOX.canonical_fields().map(|f| f.name).collect();
        assert_eq!(canonical, vec!["id", "label", "items", "sealed_at"]);
    }

    #[test]
    fn test_output_key() {
        assert_eq!(BOX.field("items").unwrap().output_key(), "item_ids");
        assert_eq!(BOX.field("label").unwrap().output_key(), "label");
        assert_eq!(BOX.display_field, Some("label"));
        assert_eq!(BOX.id_field, "id");
    }

    #[test]
    fn test_alias_cycle_terminates() {
        static LOOP_FIELDS: &[FieldDef] = &[
            FieldDef::alias("a", "b"),
            FieldDef::alias("b", "a"),
        ];

        static LOOP: EntitySchema = EntitySchema::new("Loop", LOOP_FIELDS);

        assert!(LOOP.resolve("a").is_none());
    }
}
