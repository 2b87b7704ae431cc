//! Relation Resolver.
//!
//! Follows one relation attribute from one entity. Storage is asymmetric
//! (foreign keys on the "many" side, join records under the dominant side),
//! but resolution is symmetric: every bidirectional relation answers from
//! either end. References to entities that no longer exist are skipped.

use relmodel_core::{
    Entity, EntityType, RelationInfo, RelationKind, RelationSource, Result, Schema,
};

/// Resolves relations against one schema and one consistent source.
pub struct Resolver<'a, S: RelationSource + ?Sized> {
    schema: &'a Schema,
    source: &'a S,
}

impl<S: RelationSource + ?Sized> Clone for Resolver<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: RelationSource + ?Sized> Copy for Resolver<'_, S> {}

impl<'a, S: RelationSource + ?Sized> Resolver<'a, S> {
    /// Create a resolver.
    pub fn new(schema: &'a Schema, source: &'a S) -> Self {
        Self { schema, source }
    }

    /// The schema this resolver reads.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// The source this resolver reads.
    pub fn source(&self) -> &'a S {
        self.source
    }

    /// Ids related to `entity_type#id` through `attribute`.
    pub fn related_ids(&self, entity_type: &str, id: i64, attribute: &str) -> Result<Vec<i64>> {
        let info = self.schema.relation(entity_type, attribute)?;
        Ok(self.related_ids_with(entity_type, id, attribute, info))
    }

    /// Like [`related_ids`](Self::related_ids) with the relation already looked up.
    pub fn related_ids_with(
        &self,
        entity_type: &str,
        id: i64,
        attribute: &str,
        info: &RelationInfo,
    ) -> Vec<i64> {
        let target = info.target.as_str();
        let exists = |t: &i64| self.source.record(target, *t).is_some();
        let stored = || {
            self.source
                .record(entity_type, id)
                .map(|r| r.references(attribute).to_vec())
                .unwrap_or_default()
        };

        let mut ids: Vec<i64> = match info.kind {
            RelationKind::ManyWay => stored().into_iter().filter(exists).collect(),
            RelationKind::OneWay | RelationKind::ManyToOne => {
                stored().into_iter().filter(exists).take(1).collect()
            }
            RelationKind::OneToOne => {
                let agrees = |t: &i64| match info.inverse.as_deref() {
                    Some(inverse) => self
                        .source
                        .record(target, *t)
                        .is_some_and(|r| r.references_id(inverse, id)),
                    None => exists(t),
                };
                stored().into_iter().filter(agrees).take(1).collect()
            }
            RelationKind::OneToMany => match info.inverse.as_deref() {
                Some(inverse) => self
                    .source
                    .ids(target)
                    .into_iter()
                    .filter(|t| {
                        self.source
                            .record(target, *t)
                            .is_some_and(|r| r.references_id(inverse, id))
                    })
                    .collect(),
                None => Vec::new(),
            },
            RelationKind::ManyToMany => match &info.join {
                Some(join) => {
                    let records = self.source.join_records(&join.owner_type, &join.attribute);
                    if join.owner_type == entity_type && join.attribute == attribute {
                        records
                            .iter()
                            .filter(|(owner, _)| *owner == id)
                            .map(|&(_, other)| other)
                            .filter(exists)
                            .collect()
                    } else {
                        records
                            .iter()
                            .filter(|(_, other)| *other == id)
                            .map(|&(owner, _)| owner)
                            .filter(exists)
                            .collect()
                    }
                }
                None => Vec::new(),
            },
        };

        if info.is_collection() {
            let mut seen = std::collections::HashSet::with_capacity(ids.len());
            ids.retain(|t| seen.insert(*t));
        }
        ids
    }

    /// Related entities of `entity` through `attribute`.
    pub fn resolve(&self, entity: &Entity, attribute: &str) -> Result<Vec<Entity>> {
        let info = self.schema.relation(&entity.entity_type, attribute)?;
        let ids = self.related_ids_with(&entity.entity_type, entity.id, attribute, info);
        Ok(self.entities(info, &ids))
    }

    /// The related entity of a single-valued relation (first one for collections).
    pub fn resolve_one(&self, entity: &Entity, attribute: &str) -> Result<Option<Entity>> {
        Ok(self.resolve(entity, attribute)?.into_iter().next())
    }

    /// Number of related entities. Zero when nothing is linked.
    pub fn count(&self, entity: &Entity, attribute: &str) -> Result<usize> {
        let info = self.schema.relation(&entity.entity_type, attribute)?;
        Ok(self
            .related_ids_with(&entity.entity_type, entity.id, attribute, info)
            .len())
    }

    /// Load entities of the relation's target type.
    pub fn entities(&self, info: &RelationInfo, ids: &[i64]) -> Vec<Entity> {
        ids.iter()
            .filter_map(|&id| {
                self.source
                    .record(&info.target, id)
                    .map(|r| r.to_entity(&info.target))
            })
            .collect()
    }

    /// All entities of a type, in id order.
    pub fn all(&self, ty: &EntityType) -> Vec<Entity> {
        self.source
            .ids(ty.name())
            .into_iter()
            .filter_map(|id| self.source.record(ty.name(), id))
            .map(|r| r.to_entity(ty.name()))
            .collect()
    }
}
