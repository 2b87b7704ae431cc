//! Core types for relmodel.
//!
//! `relmodel-core` is the **foundation layer** of the workspace. It defines the
//! schema, value and entity types every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Schema layer**: [`SchemaRegistry`] collects [`EntityType`]s and seals them
//!   into an immutable [`Schema`] with resolved targets and inverse relations.
//! - **Data model**: [`Value`], [`Entity`] and [`EntityRecord`] are shared by the
//!   store and the query engine.
//! - **Read seam**: [`RelationSource`] is the only thing the resolver needs from a
//!   store, so alternative stores can be plugged in.
//!
//! # Who Uses This Crate
//!
//! - `relmodel-store` implements [`RelationSource`] and maintains inverse links on writes.
//! - `relmodel-query` resolves relations and evaluates filter/sort paths against a [`Schema`].
//! - `relmodel` re-exports everything behind a single `Engine`.

pub mod entity;
pub mod error;
pub mod localization;
pub mod registry;
pub mod relationship;
pub mod schema;
pub mod source;
pub mod value;

pub use entity::{Entity, EntityData, EntityRecord};
pub use error::{Error, Result};
pub use localization::{
    LOCALE_ATTRIBUTE, LOCALIZATION_TYPE, LOCALIZATIONS_ATTRIBUTE, attach_localization_attributes,
    localization_type,
};
pub use registry::{ID_ATTRIBUTE, Schema, SchemaRegistry};
pub use relationship::{JoinKey, LinkStorage, RelationInfo, RelationKind};
pub use schema::{Attribute, AttributeKind, EntityType, ScalarType, normalize_target};
pub use source::RelationSource;
pub use value::Value;
