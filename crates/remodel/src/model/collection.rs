//! Ordered homogeneous lists of entities

use super::value::sort_cmp;
use super::{Entity, EntitySchema};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Ordered list of entities of a single kind.
#[derive(Debug, Clone)]
pub struct Collection {
    schema: &'static EntitySchema,
    items: Vec<Entity>,
}

/// Member lookup by entity or by identity.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    /// Match members equal to this entity
    Entity(&'a Entity),
    /// Match members with this identity
    Id(u64),
}

impl<'a> From<&'a Entity> for Member<'a> {
    fn from(entity: &'a Entity) -> Self {
        Member::Entity(entity)
    }
}

impl From<u64> for Member<'_> {
    fn from(id: u64) -> Self {
        Member::Id(id)
    }
}

impl Collection {
    /// An empty collection of `schema` entities.
    pub fn new(schema: &'static EntitySchema) -> Self {
        Self {
            schema,
            items: Vec::new(),
        }
    }

    /// Build a collection, checking every member's kind.
    pub fn from_entities(
        schema: &'static EntitySchema,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Result<Self> {
        let mut collection = Self::new(schema);
        for entity in entities {
            collection.add(entity)?;
        }
        Ok(collection)
    }

    /// Item schema.
    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Item kind.
    pub fn kind(&self) -> &'static str {
        self.schema.kind
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Member at `index`.
    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    /// Iterate members in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    /// Iterate members mutably in order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.items.iter_mut()
    }

    /// Append a member.
    pub fn add(&mut self, entity: Entity) -> Result<&mut Self> {
        if !entity.schema().same_kind(self.schema) {
            return Err(Error::WrongTypeForCollection {
                expected: self.kind(),
                actual: entity.kind(),
            });
        }
        self.items.push(entity);
        Ok(self)
    }

    /// Remove and return the first matching member.
    pub fn remove<'a>(&mut self, member: impl Into<Member<'a>>) -> Result<Entity> {
        let member = member.into();
        let position = self.items.iter().position(|item| match member {
            Member::Entity(entity) => item.equals(entity),
            Member::Id(id) => item.id() == Some(id),
        });

        match position {
            Some(index) => Ok(self.items.remove(index)),
            None => Err(Error::MemberNotFound {
                kind: self.kind(),
                id: match member {
                    Member::Entity(entity) => entity.id().unwrap_or(0),
                    Member::Id(id) => id,
                },
            }),
        }
    }

    /// Members accepted by `predicate`, as a new collection.
    pub fn filter(&self, mut predicate: impl FnMut(&Entity) -> bool) -> Collection {
        Collection {
            schema: self.schema,
            items: self
                .items
                .iter()
                .filter(|item| predicate(item))
                .cloned()
                .collect(),
        }
    }

    /// Members whose fields equal every entry of `fields`.
    ///
    /// Keys that name no declared field never match.
    pub fn filter_fields(&self, fields: &Map<String, Value>) -> Collection {
        self.filter(|item| matches_fields(item, fields))
    }

    /// First member accepted by `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&Entity) -> bool) -> Option<&Entity> {
        self.items.iter().find(|item| predicate(item))
    }

    /// First member whose fields equal every entry of `fields`.
    pub fn find_fields(&self, fields: &Map<String, Value>) -> Option<&Entity> {
        self.find(|item| matches_fields(item, fields))
    }

    /// Stable in-place sort by `field`, identity when `None`.
    pub fn sort(&mut self, field: Option<&str>, desc: bool) -> &mut Self {
        let field = field.unwrap_or(self.schema.id_field);
        self.items.sort_by(|a, b| {
            let ordering = match (a.peek(field), b.peek(field)) {
                (Some(x), Some(y)) => sort_cmp(&x, &y),
                _ => Ordering::Equal,
            };
            if desc { ordering.reverse() } else { ordering }
        });
        self
    }

    /// Apply `f` to every member, as a new collection.
    ///
    /// Fails with [`Error::WrongTypeForCollection`] if `f` returns an entity
    /// of another kind.
    pub fn map(&self, f: impl FnMut(&Entity) -> Entity) -> Result<Collection> {
        Collection::from_entities(self.schema, self.items.iter().map(f))
    }

    /// Numeric identities of members that have one, in order.
    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().filter_map(Entity::id).collect()
    }

    pub(crate) fn id_values(&self) -> Vec<Value> {
        self.items.iter().map(Entity::id_value).collect()
    }

    /// Same kind and same multiset of identities, in any order.
    pub fn equals(&self, other: &Collection) -> bool {
        if !self.schema.same_kind(other.schema) || self.len() != other.len() {
            return false;
        }
        let mut ours: Vec<_> = self.items.iter().map(Entity::id).collect();
        let mut theirs: Vec<_> = other.items.iter().map(Entity::id).collect();
        ours.sort_unstable();
        theirs.sort_unstable();
        ours == theirs
    }

    /// Render members ordered by identity.
    pub fn to_array(&self, recurse: bool) -> Result<Vec<Value>> {
        let mut members: Vec<&Entity> = self.items.iter().collect();
        members.sort_by_key(|entity| entity.id());
        members
            .into_iter()
            .map(|entity| entity.to_array(recurse).map(Value::Object))
            .collect()
    }
}

fn matches_fields(entity: &Entity, fields: &Map<String, Value>) -> bool {
    fields.iter().all(|(key, expected)| {
        entity
            .peek(key)
            .is_some_and(|actual| actual.matches_json(expected))
    })
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDef;
    use assert_matches::assert_matches;
    use serde_json::json;

    static DISK_FIELDS: &[FieldDef] = &[
        FieldDef::readonly("id"),
        FieldDef::writable("name"),
        FieldDef::writable("size"),
        FieldDef::alias("label", "name"),
    ];

    static DISK: EntitySchema = EntitySchema::new("Disk", DISK_FIELDS);

    static TAPE_FIELDS: &[FieldDef] = &[
        FieldDef::readonly("id"),
    ];

    static TAPE: EntitySchema = EntitySchema::new("Tape", TAPE_FIELDS);

    fn disk(id: u64, name: &str, size: u64) -> Entity {
        Entity::from_wire(&DISK, &json!({"id": id, "name": name, "size": size})).unwrap()
    }

    fn disks() -> Collection {
        Collection::from_entities(
            &DISK,
            vec![
                disk(3, "c", 20),
                disk(1, "a", 10),
                disk(2, "b", 20),
                disk(4, "d", 5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_add_rejects_other_kinds() {
        let mut collection = Collection::new(&DISK);
        assert_matches!(
            collection.add(Entity::with_id(&TAPE, 1)),
            Err(Error::WrongTypeForCollection { expected: "Disk", actual: "Tape" })
        );
        assert!(collection.is_empty());
    }

    #[test]
    fn test_remove_by_entity_and_id() {
        let mut collection = disks();
        let removed = collection.remove(&Entity::with_id(&DISK, 2)).unwrap();
        assert_eq!(removed.id(), Some(2));
        collection.remove(4u64).unwrap();
        assert_eq!(collection.ids(), vec![3, 1]);

        assert_matches!(
            collection.remove(9u64),
            Err(Error::MemberNotFound { kind: "Disk", id: 9 })
        );
        assert_matches!(
            collection.remove(&Entity::new(&DISK)),
            Err(Error::MemberNotFound { id: 0, .. })
        );
    }

    #[test]
    fn test_filter_returns_new_collection() {
        let collection = disks();
        let big = collection.filter(|d| d.peek("size").and_then(|v| v.as_i64()) >= Some(20));
        assert_eq!(big.ids(), vec![3, 2]);
        assert_eq!(collection.len(), 4);
    }

    #[test]
    fn test_filter_fields_matches_all_keys() {
        let collection = disks();
        let filter = json!({"size": "20", "label": "b"});
        let matched = collection.filter_fields(filter.as_object().unwrap());
        assert_eq!(matched.ids(), vec![2]);

        let filter = json!({"color": "red"});
        assert!(collection.filter_fields(filter.as_object().unwrap()).is_empty());
        assert_eq!(
            collection
                .find_fields(json!({"size": 20}).as_object().unwrap())
                .and_then(Entity::id),
            Some(3)
        );
        assert!(collection.find(|d| d.id() == Some(42)).is_none());
    }

    #[test]
    fn test_sort_is_stable() {
        let mut collection = disks();
        collection.sort(Some("size"), false);
        assert_eq!(collection.ids(), vec![4, 1, 3, 2]);

        collection.sort(Some("size"), true);
        assert_eq!(collection.ids(), vec![3, 2, 1, 4]);

        collection.sort(None, false);
        assert_eq!(collection.ids(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_equals_ignores_order() {
        let mut reordered = disks();
        reordered.sort(Some("name"), true);
        assert!(disks().equals(&reordered));

        reordered.remove(1u64).unwrap();
        reordered.add(disk(5, "e", 1)).unwrap();
        assert!(!disks().equals(&reordered));
        assert!(!Collection::new(&DISK).equals(&Collection::new(&TAPE)));
    }

    #[test]
    fn test_to_array_orders_by_identity() {
        let rendered = disks().to_array(false).unwrap();
        let ids: Vec<_> = rendered.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4)]);
        assert_eq!(rendered[0], json!({"id": 1, "name": "a", "size": 10}));
    }

    #[test]
    fn test_map_checks_kind() {
        let renamed = disks()
            .map(|d| {
                let mut d = d.clone();
                d.set("name", "x").unwrap();
                d
            })
            .unwrap();
        assert!(renamed.iter().all(|d| d.peek("name").unwrap().as_str() == Some("x")));

        assert_matches!(
            disks().map(|_| Entity::new(&TAPE)),
            Err(Error::WrongTypeForCollection { .. })
        );
    }
}
