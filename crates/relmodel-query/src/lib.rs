//! Relation resolution and listing queries for relmodel.
//!
//! `relmodel-query` is the **read layer**. It never writes; everything it
//! needs from storage goes through [`RelationSource`](relmodel_core::RelationSource).
//!
//! # Role In The Architecture
//!
//! - **Resolver**: [`Resolver`] follows one relation attribute from one entity,
//!   from either side of a bidirectional relation.
//! - **Paths**: [`PlannedPath`] turns `collector.name` into relation hops plus a
//!   terminal, rejecting bad paths before any data is read.
//! - **Listings**: [`QueryEngine`] filters, sorts, paginates and annotates rows.
//!
//! # Who Uses This Crate
//!
//! - `relmodel` wraps it behind `Engine::resolve`, `Engine::count` and `Engine::query`.

pub mod config;
pub mod filter;
pub mod path;
pub mod query;
pub mod resolver;

pub use config::EngineConfig;
pub use filter::{Condition, Direction, FilterOp, SortKey};
pub use path::{Hop, PathError, PlannedPath, Terminal};
pub use query::{Annotate, Query, QueryEngine, RelationValue, Row};
pub use resolver::Resolver;
