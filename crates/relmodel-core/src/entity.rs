//! Entity instances.
//!
//! [`EntityRecord`] is what a store holds: scalar values plus the stored
//! relation references. [`Entity`] is the scalar view handed to callers;
//! relations are reached through the resolver, never read off the entity.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::Value;

/// A stored entity: id, scalar values and stored relation references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRecord {
    /// Identifier, unique within the type.
    pub id: i64,
    /// Scalar values by attribute name.
    pub values: BTreeMap<String, Value>,
    /// Stored reference ids by relation attribute name.
    ///
    /// Only relations with reference storage appear here (many-way, one-way,
    /// one-to-one and many-to-one foreign keys).
    pub references: BTreeMap<String, Vec<i64>>,
}

impl EntityRecord {
    /// Create an empty record.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Stored references for a relation attribute (empty when unset).
    pub fn references(&self, attribute: &str) -> &[i64] {
        self.references.get(attribute).map_or(&[][..], Vec::as_slice)
    }

    /// Whether the record references `id` through `attribute`.
    pub fn references_id(&self, attribute: &str, id: i64) -> bool {
        self.references(attribute).contains(&id)
    }

    /// Scalar view of this record.
    pub fn to_entity(&self, entity_type: &str) -> Entity {
        Entity {
            entity_type: entity_type.to_string(),
            id: self.id,
            values: self.values.clone(),
        }
    }
}

/// An entity as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Name of the entity type.
    #[serde(skip)]
    pub entity_type: String,
    /// Identifier, unique within the type.
    pub id: i64,
    /// Scalar values by attribute name.
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl Entity {
    /// Get a scalar value; `id` is readable as an integer.
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    /// Scalar value used by paths: `id` maps to the identifier, unset maps to `Null`.
    pub fn path_value(&self, attribute: &str) -> Value {
        if attribute == "id" {
            return Value::Int(self.id);
        }
        self.values.get(attribute).cloned().unwrap_or(Value::Null)
    }

    /// Text value shortcut.
    pub fn get_str(&self, attribute: &str) -> Option<&str> {
        self.get(attribute).and_then(Value::as_str)
    }
}

/// Input for creating or updating an entity.
///
/// # Example
///
/// ```
/// use relmodel_core::entity::EntityData;
///
/// let data = EntityData::new()
///     .set("name", "Bernard")
///     .set("age", 25)
///     .link("stamps", [1, 2])
///     .link("stamps_one_way", [1]);
/// assert_eq!(data.relations["stamps"], vec![1, 2]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityData {
    /// Scalar values to write.
    pub values: BTreeMap<String, Value>,
    /// Relation targets to write; each entry replaces the relation's links.
    pub relations: BTreeMap<String, Vec<i64>>,
}

impl EntityData {
    /// Create empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar value.
    #[must_use]
    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    /// Set the targets of a relation.
    #[must_use]
    pub fn link(mut self, attribute: impl Into<String>, ids: impl IntoIterator<Item = i64>) -> Self {
        self.relations
            .insert(attribute.into(), ids.into_iter().collect());
        self
    }

    /// Clear a relation.
    #[must_use]
    pub fn unlink(mut self, attribute: impl Into<String>) -> Self {
        self.relations.insert(attribute.into(), Vec::new());
        self
    }
}
