//! In-memory entity store for relmodel.
//!
//! The store owns entity records, relation references and many-to-many join
//! records. It is the write side of the workspace; reads go through the
//! [`RelationSource`] seam implemented by [`StoreState`].
//!
//! # Design Philosophy
//!
//! - **Snapshot reads**: [`MemoryStore::snapshot`] hands out a read guard; every
//!   lookup made through one guard observes the same state.
//! - **Atomic writes**: a write validates everything first, then applies scalars,
//!   links and inverse maintenance under a single write lock. Readers never
//!   observe a foreign key updated without its join record.
//! - **Explicit inverse maintenance**: [`StoreState::link`] is the one function
//!   that writes relation links and keeps the other side consistent.
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new();
//! let stamp = store.create(&schema, "stamp", EntityData::new().set("name", "1946"))?;
//! let collector = store.create(
//!     &schema,
//!     "collector",
//!     EntityData::new().set("name", "Bernard").link("stamps_m2m", [stamp.id]),
//! )?;
//! store.delete(&schema, "stamp", stamp.id)?;
//! ```

mod links;

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use relmodel_core::{
    AttributeKind, Entity, EntityData, EntityRecord, Error, ID_ATTRIBUTE, RelationSource, Result,
    Schema,
};

/// Raw store contents: records, id counters and join records.
#[derive(Debug, Default, Clone)]
pub struct StoreState {
    /// Records by type, ordered by id.
    tables: HashMap<String, BTreeMap<i64, EntityRecord>>,
    /// Next id to assign per type.
    next_ids: HashMap<String, i64>,
    /// Join records by dominant `(type, attribute)`.
    joins: HashMap<String, HashMap<String, Vec<(i64, i64)>>>,
}

impl StoreState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of a type.
    pub fn len(&self, entity_type: &str) -> usize {
        self.tables.get(entity_type).map_or(0, BTreeMap::len)
    }

    /// True when no records of the type are stored.
    pub fn is_empty(&self, entity_type: &str) -> bool {
        self.len(entity_type) == 0
    }

    /// Scalar view of a stored record.
    pub fn entity(&self, entity_type: &str, id: i64) -> Option<Entity> {
        self.record(entity_type, id)
            .map(|r| r.to_entity(entity_type))
    }

    fn contains(&self, entity_type: &str, id: i64) -> bool {
        self.record(entity_type, id).is_some()
    }

    fn record_mut(&mut self, entity_type: &str, id: i64) -> Option<&mut EntityRecord> {
        self.tables.get_mut(entity_type)?.get_mut(&id)
    }

    fn records_mut(&mut self, entity_type: &str) -> impl Iterator<Item = &mut EntityRecord> {
        self.tables
            .get_mut(entity_type)
            .into_iter()
            .flat_map(BTreeMap::values_mut)
    }

    fn join_records_mut(&mut self, owner_type: &str, attribute: &str) -> &mut Vec<(i64, i64)> {
        self.joins
            .entry(owner_type.to_string())
            .or_default()
            .entry(attribute.to_string())
            .or_default()
    }

    fn allocate_id(&mut self, entity_type: &str) -> i64 {
        let next = self.next_ids.entry(entity_type.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn insert_record(&mut self, entity_type: &str, record: EntityRecord) {
        self.tables
            .entry(entity_type.to_string())
            .or_default()
            .insert(record.id, record);
    }

    /// Validate every scalar and relation in `data` without touching state.
    fn validate_data(&self, schema: &Schema, entity_type: &str, data: &EntityData) -> Result<()> {
        let ty = schema.get_type(entity_type)?;
        for (name, value) in &data.values {
            if name == ID_ATTRIBUTE {
                return Err(Error::invalid_value(
                    entity_type,
                    name,
                    "ids are assigned by the store",
                ));
            }
            match &ty.require_attribute(name)?.kind {
                AttributeKind::Scalar(scalar) if scalar.accepts(value) => {}
                AttributeKind::Scalar(scalar) => {
                    return Err(Error::invalid_value(
                        entity_type,
                        name,
                        format!("{} does not fit {:?}", value.type_name(), scalar),
                    ));
                }
                AttributeKind::Relation(_) => {
                    return Err(Error::invalid_value(
                        entity_type,
                        name,
                        "relations are written as links",
                    ));
                }
            }
        }
        for (name, targets) in &data.relations {
            self.validate_link(schema, entity_type, name, targets)?;
        }
        Ok(())
    }
}

impl RelationSource for StoreState {
    fn record(&self, entity_type: &str, id: i64) -> Option<&EntityRecord> {
        self.tables.get(entity_type)?.get(&id)
    }

    fn ids(&self, entity_type: &str) -> Vec<i64> {
        self.tables
            .get(entity_type)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default()
    }

    fn join_records(&self, owner_type: &str, attribute: &str) -> &[(i64, i64)] {
        self.joins
            .get(owner_type)
            .and_then(|m| m.get(attribute))
            .map_or(&[][..], Vec::as_slice)
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a consistent read snapshot.
    pub fn snapshot(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an entity; returns it with its assigned id.
    #[tracing::instrument(level = "debug", target = "relmodel::store", skip(self, schema, data))]
    pub fn create(&self, schema: &Schema, entity_type: &str, data: EntityData) -> Result<Entity> {
        let mut state = self.write();
        state.validate_data(schema, entity_type, &data)?;

        let id = state.allocate_id(entity_type);
        let mut record = EntityRecord::new(id);
        record.values = data.values;
        state.insert_record(entity_type, record);
        for (attribute, targets) in &data.relations {
            state.link(schema, entity_type, id, attribute, targets)?;
        }

        tracing::debug!(
            target: "relmodel::store",
            entity_type = entity_type,
            id = id,
            relations = data.relations.len(),
            "created entity"
        );
        state
            .entity(entity_type, id)
            .ok_or_else(|| Error::UnknownEntity {
                entity_type: entity_type.to_string(),
                id,
            })
    }

    /// Update an entity. Given scalars overwrite, given relations replace their links.
    #[tracing::instrument(level = "debug", target = "relmodel::store", skip(self, schema, data))]
    pub fn update(
        &self,
        schema: &Schema,
        entity_type: &str,
        id: i64,
        data: EntityData,
    ) -> Result<Entity> {
        let mut state = self.write();
        if !state.contains(entity_type, id) {
            schema.get_type(entity_type)?;
            return Err(Error::UnknownEntity {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        state.validate_data(schema, entity_type, &data)?;

        if let Some(record) = state.record_mut(entity_type, id) {
            record.values.extend(data.values);
        }
        for (attribute, targets) in &data.relations {
            state.link(schema, entity_type, id, attribute, targets)?;
        }

        tracing::debug!(
            target: "relmodel::store",
            entity_type = entity_type,
            id = id,
            "updated entity"
        );
        state
            .entity(entity_type, id)
            .ok_or_else(|| Error::UnknownEntity {
                entity_type: entity_type.to_string(),
                id,
            })
    }

    /// Delete an entity and purge every reference to it. Returns the removed entity.
    #[tracing::instrument(level = "debug", target = "relmodel::store", skip(self, schema))]
    pub fn delete(&self, schema: &Schema, entity_type: &str, id: i64) -> Result<Option<Entity>> {
        schema.get_type(entity_type)?;
        let mut state = self.write();
        let Some(record) = state
            .tables
            .get_mut(entity_type)
            .and_then(|t| t.remove(&id))
        else {
            return Ok(None);
        };
        state.purge(schema, entity_type, id);

        tracing::debug!(
            target: "relmodel::store",
            entity_type = entity_type,
            id = id,
            "deleted entity"
        );
        Ok(Some(record.to_entity(entity_type)))
    }

    /// Fetch an entity by id.
    pub fn find(&self, entity_type: &str, id: i64) -> Option<Entity> {
        self.snapshot().entity(entity_type, id)
    }

    /// Number of stored entities of a type.
    pub fn len(&self, entity_type: &str) -> usize {
        self.snapshot().len(entity_type)
    }

    /// True when no entities of the type are stored.
    pub fn is_empty(&self, entity_type: &str) -> bool {
        self.len(entity_type) == 0
    }
}
