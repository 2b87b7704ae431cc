//! Relation writes and inverse-link maintenance.
//!
//! Storage per kind:
//! - many-way / one-way / many-to-one: id list on the owning record
//! - one-to-one: id on both records, kept symmetric and exclusive
//! - one-to-many: nothing on the "one" side; the targets' foreign keys are rewritten
//! - many-to-many: `(dominant_id, other_id)` join records under the dominant side

use relmodel_core::{
    EntityType, Error, LinkStorage, RelationInfo, RelationKind, RelationSource, Result, Schema,
};

use crate::StoreState;

fn missing_inverse(entity_type: &str, attribute: &str) -> Error {
    Error::InvalidSchema(format!(
        "{}.{} has no inverse attribute to maintain",
        entity_type, attribute
    ))
}

impl StoreState {
    /// Check a relation write and return the normalized (deduplicated) target ids.
    pub(crate) fn validate_link(
        &self,
        schema: &Schema,
        entity_type: &str,
        attribute: &str,
        targets: &[i64],
    ) -> Result<Vec<i64>> {
        let info = schema.relation(entity_type, attribute)?;
        let mut normalized: Vec<i64> = Vec::with_capacity(targets.len());
        for &id in targets {
            if !normalized.contains(&id) {
                normalized.push(id);
            }
        }
        if !info.is_collection() && normalized.len() > 1 {
            return Err(Error::invalid_value(
                entity_type,
                attribute,
                format!(
                    "{} relation accepts at most one target, got {}",
                    info.kind.as_str(),
                    normalized.len()
                ),
            ));
        }
        if let Some(&missing) = normalized.iter().find(|&&id| !self.contains(&info.target, id)) {
            return Err(Error::UnknownEntity {
                entity_type: info.target.clone(),
                id: missing,
            });
        }
        Ok(normalized)
    }

    /// Replace the links of `entity_type#id.attribute` with `targets`, maintaining the inverse side.
    ///
    /// This is the only place relation links are written. One write lock covers
    /// the owner's links and every inverse record it touches.
    pub fn link(
        &mut self,
        schema: &Schema,
        entity_type: &str,
        id: i64,
        attribute: &str,
        targets: &[i64],
    ) -> Result<()> {
        if !self.contains(entity_type, id) {
            return Err(Error::UnknownEntity {
                entity_type: entity_type.to_string(),
                id,
            });
        }
        let targets = self.validate_link(schema, entity_type, attribute, targets)?;
        let info = schema.relation(entity_type, attribute)?;

        match info.kind {
            RelationKind::ManyWay | RelationKind::OneWay | RelationKind::ManyToOne => {
                self.set_references(entity_type, id, attribute, targets);
            }
            RelationKind::OneToOne => {
                self.link_one_to_one(entity_type, id, attribute, info, targets.first().copied());
            }
            RelationKind::OneToMany => {
                let inverse = info
                    .inverse
                    .as_deref()
                    .ok_or_else(|| missing_inverse(entity_type, attribute))?;
                self.link_one_to_many(id, &info.target, inverse, &targets);
            }
            RelationKind::ManyToMany => {
                let join = info
                    .join
                    .as_ref()
                    .ok_or_else(|| missing_inverse(entity_type, attribute))?;
                let owned = join.owner_type == entity_type && join.attribute == attribute;
                let records = self.join_records_mut(&join.owner_type, &join.attribute);
                if owned {
                    records.retain(|&(owner, _)| owner != id);
                    records.extend(targets.iter().map(|&t| (id, t)));
                } else {
                    records.retain(|&(_, other)| other != id);
                    records.extend(targets.iter().map(|&t| (t, id)));
                }
            }
        }

        tracing::trace!(
            target: "relmodel::store",
            entity_type = entity_type,
            id = id,
            attribute = attribute,
            kind = info.kind.as_str(),
            "relation linked"
        );
        Ok(())
    }

    fn set_references(&mut self, entity_type: &str, id: i64, attribute: &str, ids: Vec<i64>) {
        if let Some(record) = self.record_mut(entity_type, id) {
            if ids.is_empty() {
                record.references.remove(attribute);
            } else {
                record.references.insert(attribute.to_string(), ids);
            }
        }
    }

    /// Clear `attribute` on `entity_type#id` only if it currently points at `partner`.
    fn clear_reference_to(&mut self, entity_type: &str, id: i64, attribute: &str, partner: i64) {
        let points_back = self
            .record(entity_type, id)
            .is_some_and(|r| r.references_id(attribute, partner));
        if points_back {
            self.set_references(entity_type, id, attribute, Vec::new());
        }
    }

    fn link_one_to_one(
        &mut self,
        entity_type: &str,
        id: i64,
        attribute: &str,
        info: &RelationInfo,
        partner: Option<i64>,
    ) {
        if let Some(inverse) = info.inverse.as_deref() {
            let previous = self
                .record(entity_type, id)
                .and_then(|r| r.references(attribute).first().copied());
            if let Some(previous) = previous.filter(|&p| Some(p) != partner) {
                self.clear_reference_to(&info.target, previous, inverse, id);
            }
            if let Some(partner) = partner {
                let partners_previous = self
                    .record(&info.target, partner)
                    .and_then(|r| r.references(inverse).first().copied());
                if let Some(other) = partners_previous.filter(|&o| o != id) {
                    self.clear_reference_to(entity_type, other, attribute, partner);
                }
                self.set_references(&info.target, partner, inverse, vec![id]);
            }
        }
        self.set_references(entity_type, id, attribute, partner.into_iter().collect());
    }

    fn link_one_to_many(&mut self, id: i64, target_type: &str, inverse: &str, targets: &[i64]) {
        for record in self.records_mut(target_type) {
            if record.references_id(inverse, id) && !targets.contains(&record.id) {
                record.references.remove(inverse);
            }
        }
        for &target in targets {
            self.set_references(target_type, target, inverse, vec![id]);
        }
    }

    /// Remove every reference to a deleted `entity_type#id`.
    pub(crate) fn purge(&mut self, schema: &Schema, entity_type: &str, id: i64) {
        let mut purged = 0usize;

        let incoming: Vec<(String, String, RelationInfo)> = schema
            .relations_targeting(entity_type)
            .map(|(ty, name, info)| (ty.name().to_string(), name.to_string(), info.clone()))
            .collect();
        for (source_type, attribute, info) in incoming {
            match info.kind.storage() {
                LinkStorage::JoinRecords => {
                    purged += self.purge_join(&source_type, &attribute, &info, id, false);
                }
                LinkStorage::Derived => {}
                LinkStorage::References => {
                    for record in self.records_mut(&source_type) {
                        if let Some(ids) = record.references.get_mut(&attribute) {
                            let before = ids.len();
                            ids.retain(|&r| r != id);
                            purged += before - ids.len();
                            if ids.is_empty() {
                                record.references.remove(&attribute);
                            }
                        }
                    }
                }
            }
        }

        let own: Vec<(String, RelationInfo)> = schema
            .get_type(entity_type)
            .map(|ty: &EntityType| {
                ty.relations()
                    .filter(|(_, info)| info.kind.storage() == LinkStorage::JoinRecords)
                    .map(|(name, info)| (name.to_string(), info.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for (attribute, info) in own {
            purged += self.purge_join(entity_type, &attribute, &info, id, true);
        }

        tracing::trace!(
            target: "relmodel::store",
            entity_type = entity_type,
            id = id,
            purged = purged,
            "purged references to deleted entity"
        );
    }

    /// Drop join records involving `id`. `local` says `id` belongs to `source_type`
    /// rather than to the relation's target.
    fn purge_join(
        &mut self,
        source_type: &str,
        attribute: &str,
        info: &RelationInfo,
        id: i64,
        local: bool,
    ) -> usize {
        let Some(join) = info.join.as_ref() else {
            return 0;
        };
        let source_owns = join.owner_type == source_type && join.attribute == attribute;
        let records = self.join_records_mut(&join.owner_type, &join.attribute);
        let before = records.len();
        if source_owns == local {
            records.retain(|&(owner, _)| owner != id);
        } else {
            records.retain(|&(_, other)| other != id);
        }
        before - records.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relmodel_core::{EntityData, RelationSource, ScalarType, SchemaRegistry};

    use super::*;
    use crate::MemoryStore;

    fn schema() -> Arc<Schema> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityType::new("stamp").scalar("name", ScalarType::String))
            .unwrap();
        registry
            .register(
                EntityType::new("collector")
                    .scalar("name", ScalarType::String)
                    .relation("stamps", RelationInfo::new(RelationKind::ManyWay, "stamp"))
                    .relation(
                        "stamps_m2m",
                        RelationInfo::new(RelationKind::ManyToMany, "stamp")
                            .inverse("collectors")
                            .dominant(true),
                    )
                    .relation(
                        "stamps_one_many",
                        RelationInfo::new(RelationKind::OneToMany, "stamp").inverse("collector"),
                    )
                    .relation(
                        "stamps_one_one",
                        RelationInfo::new(RelationKind::OneToOne, "stamp")
                            .inverse("collector_one_one"),
                    ),
            )
            .unwrap();
        registry.seal().unwrap()
    }

    fn stamps(store: &MemoryStore, schema: &Schema, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                store
                    .create(
                        schema,
                        "stamp",
                        EntityData::new().set("name", format!("{}", 1946 + i)),
                    )
                    .unwrap()
                    .id
            })
            .collect()
    }

    #[test]
    fn test_collection_links_are_deduplicated() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 2);
        let c = store
            .create(
                &schema,
                "collector",
                EntityData::new().link("stamps", [s[1], s[0], s[1]]),
            )
            .unwrap();
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.record("collector", c.id).unwrap().references("stamps"),
            &[s[1], s[0]]
        );
    }

    #[test]
    fn test_single_valued_relation_rejects_many_targets() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 2);
        let err = store
            .create(
                &schema,
                "collector",
                EntityData::new().link("stamps_one_one", [s[0], s[1]]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_one_to_one_relink_clears_previous_partners() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 2);
        let a = store
            .create(&schema, "collector", EntityData::new().link("stamps_one_one", [s[0]]))
            .unwrap();
        let b = store
            .create(&schema, "collector", EntityData::new().link("stamps_one_one", [s[0]]))
            .unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.record("collector", a.id).unwrap().references("stamps_one_one").is_empty());
        assert_eq!(
            snapshot.record("stamp", s[0]).unwrap().references("collector_one_one"),
            &[b.id]
        );
        drop(snapshot);

        store
            .update(&schema, "collector", b.id, EntityData::new().link("stamps_one_one", [s[1]]))
            .unwrap();
        let snapshot = store.snapshot();
        assert!(snapshot.record("stamp", s[0]).unwrap().references("collector_one_one").is_empty());
        assert_eq!(
            snapshot.record("stamp", s[1]).unwrap().references("collector_one_one"),
            &[b.id]
        );
    }

    #[test]
    fn test_one_to_one_written_from_inverse_side() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 1);
        let c = store.create(&schema, "collector", EntityData::new()).unwrap();
        store
            .update(&schema, "stamp", s[0], EntityData::new().link("collector_one_one", [c.id]))
            .unwrap();
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.record("collector", c.id).unwrap().references("stamps_one_one"),
            &[s[0]]
        );
    }

    #[test]
    fn test_one_to_many_rewrites_foreign_keys() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 3);
        let isabelle = store
            .create(
                &schema,
                "collector",
                EntityData::new().link("stamps_one_many", [s[1], s[2]]),
            )
            .unwrap();
        let emma = store
            .create(&schema, "collector", EntityData::new().link("stamps_one_many", [s[2]]))
            .unwrap();
        store
            .update(&schema, "collector", isabelle.id, EntityData::new().link("stamps_one_many", [s[0]]))
            .unwrap();

        let snapshot = store.snapshot();
        let fk = |id: i64| snapshot.record("stamp", id).unwrap().references("collector").to_vec();
        assert_eq!(fk(s[0]), vec![isabelle.id]);
        assert_eq!(fk(s[1]), Vec::<i64>::new());
        assert_eq!(fk(s[2]), vec![emma.id]);
    }

    #[test]
    fn test_many_to_many_written_from_either_side() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 2);
        let c = store
            .create(&schema, "collector", EntityData::new().link("stamps_m2m", [s[0]]))
            .unwrap();
        let d = store.create(&schema, "collector", EntityData::new()).unwrap();

        store
            .update(&schema, "stamp", s[1], EntityData::new().link("collectors", [c.id, d.id]))
            .unwrap();
        assert_eq!(
            store.snapshot().join_records("collector", "stamps_m2m"),
            &[(c.id, s[0]), (c.id, s[1]), (d.id, s[1])]
        );

        store
            .update(&schema, "collector", c.id, EntityData::new().unlink("stamps_m2m"))
            .unwrap();
        assert_eq!(
            store.snapshot().join_records("collector", "stamps_m2m"),
            &[(d.id, s[1])]
        );
    }

    #[test]
    fn test_delete_purges_all_references() {
        let schema = schema();
        let store = MemoryStore::new();
        let s = stamps(&store, &schema, 2);
        let c = store
            .create(
                &schema,
                "collector",
                EntityData::new()
                    .link("stamps", [s[0], s[1]])
                    .link("stamps_m2m", [s[0]])
                    .link("stamps_one_many", [s[0]])
                    .link("stamps_one_one", [s[0]]),
            )
            .unwrap();

        store.delete(&schema, "stamp", s[0]).unwrap();
        let snapshot = store.snapshot();
        let record = snapshot.record("collector", c.id).unwrap();
        assert_eq!(record.references("stamps"), &[s[1]]);
        assert!(record.references("stamps_one_one").is_empty());
        assert!(snapshot.join_records("collector", "stamps_m2m").is_empty());
        drop(snapshot);

        store.delete(&schema, "collector", c.id).unwrap();
        let snapshot = store.snapshot();
        assert!(snapshot.record("stamp", s[1]).unwrap().references.is_empty());
    }

    #[test]
    fn test_link_unknown_owner() {
        let schema = schema();
        let mut state = StoreState::new();
        assert!(matches!(
            state.link(&schema, "collector", 1, "stamps", &[]),
            Err(Error::UnknownEntity { .. })
        ));
    }
}
