//! relmodel: typed entities, bidirectional relations and path-based listings.
//!
//! `relmodel` is the **facade crate**. It re-exports the public API of the
//! workspace crates and ties them together behind [`Engine`].
//!
//! # Role In The Architecture
//!
//! - **Schema**: entity types and relation metadata from `relmodel-core`.
//! - **Storage**: the in-memory store from `relmodel-store`, with inverse links
//!   maintained on every write.
//! - **Reads**: the resolver and query engine from `relmodel-query`.
//!
//! # Example
//!
//! ```rust,ignore
//! use relmodel::prelude::*;
//!
//! let engine = Engine::new();
//! engine.register_type(EntityType::new("stamp").scalar("name", ScalarType::String))?;
//! engine.register_type(
//!     EntityType::new("collector")
//!         .scalar("name", ScalarType::String)
//!         .relation(
//!             "stamps",
//!             RelationInfo::new(RelationKind::ManyToMany, "stamp").inverse("collectors"),
//!         ),
//! )?;
//!
//! let stamp = engine.create("stamp", EntityData::new().set("name", "1946"))?;
//! engine.create("collector", EntityData::new().set("name", "Emma").link("stamps", [stamp.id]))?;
//!
//! let rows = engine.query(&Query::new("stamp").where_eq("collectors.name", "Emma"))?;
//! ```

pub mod engine;

pub use engine::{Engine, EngineBuilder};

pub use relmodel_core::{
    Attribute, AttributeKind, Entity, EntityData, EntityRecord, EntityType, Error, ID_ATTRIBUTE,
    JoinKey, LOCALE_ATTRIBUTE, LOCALIZATION_TYPE, LOCALIZATIONS_ATTRIBUTE, LinkStorage,
    RelationInfo, RelationKind, RelationSource, Result, ScalarType, Schema, SchemaRegistry, Value,
    normalize_target,
};
pub use relmodel_query::{
    Annotate, Condition, Direction, EngineConfig, FilterOp, PlannedPath, Query, QueryEngine,
    RelationValue, Resolver, Row, SortKey,
};
pub use relmodel_store::{MemoryStore, StoreState};

/// Everything needed for typical use.
pub mod prelude {
    pub use crate::{
        Annotate, Engine, EngineBuilder, EngineConfig, Entity, EntityData, EntityType, Error,
        FilterOp, Query, RelationInfo, RelationKind, RelationValue, Result, Row, ScalarType, Value,
    };
}
