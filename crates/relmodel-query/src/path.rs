//! Dotted attribute paths.
//!
//! A path such as `collector.name` or `stamps.collectors.id` is planned once
//! against the schema into relation hops plus a terminal, then evaluated per
//! entity by walking the hops through the [`Resolver`].

use std::fmt;

use relmodel_core::{AttributeKind, Entity, ID_ATTRIBUTE, RelationInfo, RelationSource, Schema, Value};

use crate::resolver::Resolver;

/// One relation crossed by a path.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    /// Type the hop starts from.
    pub entity_type: String,
    /// Relation attribute followed.
    pub attribute: String,
    /// Relation metadata from the sealed schema.
    pub info: RelationInfo,
}

/// The last segment of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// A scalar attribute.
    Scalar(String),
    /// The implicit identifier.
    Id,
    /// A relation attribute; evaluates to the related ids.
    Relation(Hop),
}

/// A path planned against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPath {
    raw: String,
    hops: Vec<Hop>,
    terminal: Terminal,
}

/// Why a path could not be planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError(pub String);

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PlannedPath {
    /// Plan `path` starting at `root`.
    ///
    /// Every segment but the last must be a relation; the last may be a
    /// scalar, `id`, or a relation.
    pub fn plan(
        schema: &Schema,
        root: &str,
        path: &str,
        max_depth: usize,
    ) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError("path is empty".into()));
        }
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError("path has an empty segment".into()));
        }
        if segments.len() > max_depth {
            return Err(PathError(format!(
                "path has {} segments, at most {} allowed",
                segments.len(),
                max_depth
            )));
        }

        let mut current = root.to_string();
        let mut hops = Vec::with_capacity(segments.len() - 1);
        let (last, init) = segments
            .split_last()
            .ok_or_else(|| PathError("path is empty".into()))?;

        for segment in init {
            let ty = schema
                .get_type(&current)
                .map_err(|e| PathError(e.to_string()))?;
            let attribute = ty.attribute(segment).ok_or_else(|| {
                PathError(format!("`{segment}` is not an attribute of `{current}`"))
            })?;
            match &attribute.kind {
                AttributeKind::Relation(info) => {
                    hops.push(Hop {
                        entity_type: current.clone(),
                        attribute: (*segment).to_string(),
                        info: info.clone(),
                    });
                    current.clone_from(&info.target);
                }
                AttributeKind::Scalar(_) => {
                    return Err(PathError(format!(
                        "`{current}.{segment}` is a scalar and cannot be traversed"
                    )));
                }
            }
        }

        let terminal = if *last == ID_ATTRIBUTE {
            Terminal::Id
        } else {
            let ty = schema
                .get_type(&current)
                .map_err(|e| PathError(e.to_string()))?;
            match ty.attribute(last).map(|a| &a.kind) {
                Some(AttributeKind::Scalar(_)) => Terminal::Scalar((*last).to_string()),
                Some(AttributeKind::Relation(info)) => Terminal::Relation(Hop {
                    entity_type: current.clone(),
                    attribute: (*last).to_string(),
                    info: info.clone(),
                }),
                None => {
                    return Err(PathError(format!(
                        "`{last}` is not an attribute of `{current}`"
                    )));
                }
            }
        };

        Ok(Self {
            raw: path.to_string(),
            hops,
            terminal,
        })
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Relation hops, in order.
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// The terminal segment.
    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// True when some hop can reach more than one entity.
    pub fn crosses_collection(&self) -> bool {
        self.hops.iter().any(|h| h.info.is_collection())
    }

    /// Entities reached after the last hop, in resolution order.
    pub fn reach<S: RelationSource + ?Sized>(
        &self,
        resolver: &Resolver<'_, S>,
        entity: &Entity,
    ) -> Vec<Entity> {
        let mut frontier = vec![entity.clone()];
        for hop in &self.hops {
            frontier = frontier
                .iter()
                .flat_map(|e| {
                    let ids = resolver.related_ids_with(&hop.entity_type, e.id, &hop.attribute, &hop.info);
                    resolver.entities(&hop.info, &ids)
                })
                .collect();
        }
        frontier
    }

    /// Terminal values reachable from `entity`. Empty when a hop reaches nothing.
    pub fn values<S: RelationSource + ?Sized>(
        &self,
        resolver: &Resolver<'_, S>,
        entity: &Entity,
    ) -> Vec<Value> {
        let reached = self.reach(resolver, entity);
        match &self.terminal {
            Terminal::Scalar(name) => reached.iter().map(|e| e.path_value(name)).collect(),
            Terminal::Id => reached.iter().map(|e| Value::Int(e.id)).collect(),
            Terminal::Relation(hop) => reached
                .iter()
                .flat_map(|e| {
                    resolver.related_ids_with(&hop.entity_type, e.id, &hop.attribute, &hop.info)
                })
                .map(Value::Int)
                .collect(),
        }
    }
}
