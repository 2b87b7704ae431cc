//! The relmodel engine.
//!
//! [`Engine`] owns a schema registry, an in-memory store and an
//! [`EngineConfig`]. The registry is sealed lazily by the first operation that
//! needs a schema; after that, registration is rejected until
//! [`Engine::reload_schema`].
//!
//! Every read (`resolve`, `count`, `query`, `count_matching`) takes one store
//! snapshot for the whole call. Every write applies under one store write lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use relmodel::prelude::*;
//!
//! let engine = Engine::builder()
//!     .register(EntityType::new("stamp").scalar("name", ScalarType::String))
//!     .config(EngineConfig::default().default_limit(Some(50)))
//!     .build()?;
//! let stamp = engine.create("stamp", EntityData::new().set("name", "1946"))?;
//! ```

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use relmodel_core::{Entity, EntityData, EntityType, Result, Schema, SchemaRegistry};
use relmodel_query::{EngineConfig, Query, QueryEngine, Resolver, Row};
use relmodel_store::MemoryStore;

/// Schema registry, store and query engine behind one handle.
#[derive(Debug, Default)]
pub struct Engine {
    registry: RwLock<SchemaRegistry>,
    store: MemoryStore,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Create an engine builder.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn registry(&self) -> RwLockReadGuard<'_, SchemaRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, SchemaRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Schema ====================

    /// Register an entity type. Fails with `SchemaSealed` once the schema is in use.
    pub fn register_type(&self, ty: EntityType) -> Result<()> {
        self.registry_mut().register(ty)
    }

    /// Register an entity type from its JSON definition.
    pub fn register_json(&self, json: &str) -> Result<()> {
        self.register_type(EntityType::from_json(json)?)
    }

    /// A copy of a registered type; includes synthesized inverses once sealed.
    pub fn get_type(&self, name: &str) -> Result<EntityType> {
        self.registry().get_type(name).cloned()
    }

    /// The sealed schema, sealing the registry on first use.
    pub fn schema(&self) -> Result<Arc<Schema>> {
        if let Some(schema) = self.registry().schema() {
            return Ok(schema);
        }
        let mut registry = self.registry_mut();
        if !registry.is_sealed() {
            tracing::debug!(
                target: "relmodel::engine",
                version = registry.version(),
                "sealing schema on first use"
            );
        }
        registry.seal()
    }

    /// Reopen the registry for registration. Returns the new registry version.
    pub fn reload_schema(&self) -> u64 {
        let mut registry = self.registry_mut();
        registry.reopen();
        registry.version()
    }

    // ==================== Writes ====================

    /// Create an entity.
    pub fn create(&self, entity_type: &str, data: EntityData) -> Result<Entity> {
        let schema = self.schema()?;
        self.store.create(&schema, entity_type, data)
    }

    /// Update an entity: given scalars overwrite, given relations replace.
    pub fn update(&self, entity_type: &str, id: i64, data: EntityData) -> Result<Entity> {
        let schema = self.schema()?;
        self.store.update(&schema, entity_type, id, data)
    }

    /// Delete an entity and purge references to it.
    pub fn delete(&self, entity_type: &str, id: i64) -> Result<Option<Entity>> {
        let schema = self.schema()?;
        self.store.delete(&schema, entity_type, id)
    }

    /// Fetch an entity by id.
    pub fn find(&self, entity_type: &str, id: i64) -> Result<Option<Entity>> {
        let schema = self.schema()?;
        schema.get_type(entity_type)?;
        Ok(self.store.find(entity_type, id))
    }

    // ==================== Reads ====================

    /// Entities related to `entity` through `attribute`.
    pub fn resolve(&self, entity: &Entity, attribute: &str) -> Result<Vec<Entity>> {
        let schema = self.schema()?;
        let snapshot = self.store.snapshot();
        Resolver::new(&schema, &*snapshot).resolve(entity, attribute)
    }

    /// Number of entities related to `entity` through `attribute`.
    pub fn count(&self, entity: &Entity, attribute: &str) -> Result<usize> {
        let schema = self.schema()?;
        let snapshot = self.store.snapshot();
        Resolver::new(&schema, &*snapshot).count(entity, attribute)
    }

    /// Run a listing query.
    #[tracing::instrument(
        level = "debug",
        target = "relmodel::engine",
        skip(self, query),
        fields(entity_type = %query.entity_type)
    )]
    pub fn query(&self, query: &Query) -> Result<Vec<Row>> {
        let schema = self.schema()?;
        let snapshot = self.store.snapshot();
        QueryEngine::new(Resolver::new(&schema, &*snapshot), &self.config).execute(query)
    }

    /// Run a listing query and render the rows as JSON.
    pub fn query_json(&self, query: &Query) -> Result<serde_json::Value> {
        let rows = self.query(query)?;
        Ok(serde_json::to_value(rows)?)
    }

    /// Number of entities matching the query's filters.
    #[tracing::instrument(
        level = "debug",
        target = "relmodel::engine",
        skip(self, query),
        fields(entity_type = %query.entity_type)
    )]
    pub fn count_matching(&self, query: &Query) -> Result<usize> {
        let schema = self.schema()?;
        let snapshot = self.store.snapshot();
        QueryEngine::new(Resolver::new(&schema, &*snapshot), &self.config).count_matching(query)
    }
}

/// Builder for [`Engine`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::builder()
///     .register(stamp_type)
///     .register(collector_type)
///     .seal(true)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    types: Vec<EntityType>,
    config: EngineConfig,
    seal: bool,
}

impl EngineBuilder {
    /// Create a new engine builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a type for registration.
    #[must_use]
    pub fn register(mut self, ty: EntityType) -> Self {
        self.types.push(ty);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seal the schema during `build`, surfacing schema errors early.
    #[must_use]
    pub fn seal(mut self, seal: bool) -> Self {
        self.seal = seal;
        self
    }

    /// Build the engine, registering every queued type in order.
    pub fn build(self) -> Result<Engine> {
        let engine = Engine::with_config(self.config);
        for ty in self.types {
            engine.register_type(ty)?;
        }
        if self.seal {
            engine.schema()?;
        }
        Ok(engine)
    }
}
