//! Entity model
//!
//! Wire records are mapped onto [`Entity`] values described by a static
//! [`EntitySchema`]. Nested records become child entities or
//! [`Collection`]s, writes use the collapsed (id-only) form, and entities
//! with an attached [`EntityLoader`] hydrate themselves on first read of an
//! absent field.

mod collection;
mod entity;
mod schema;
mod value;

pub use collection::{Collection, Member};
pub use entity::{Entity, EntityLoader};
pub use schema::{Access, EntitySchema, FieldDef, FieldKind, Getter};
pub use value::FieldValue;
