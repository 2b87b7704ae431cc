//! Schema Registry.
//!
//! Types are registered at startup, then the registry is sealed before the
//! first query or write. Sealing resolves relation targets, synthesizes
//! missing inverse attributes, validates declared inverses and decides which
//! side of each many-to-many pair owns the join records. The sealed
//! [`Schema`] is immutable and shared behind an `Arc`.
//!
//! Registering after sealing fails with [`Error::SchemaSealed`] until
//! [`SchemaRegistry::reopen`] is called.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{Error, Result};
use crate::localization::{LOCALIZATION_TYPE, attach_localization_attributes, localization_type};
use crate::relationship::{JoinKey, RelationInfo, RelationKind};
use crate::schema::{Attribute, AttributeKind, EntityType};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Attribute name every type exposes implicitly.
pub const ID_ATTRIBUTE: &str = "id";

fn identifier_regex() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IDENTIFIER_PATTERN))
        .as_ref()
        .map_err(|e| Error::InvalidSchema(format!("identifier pattern: {}", e)))
}

fn validate_identifier(what: &str, name: &str) -> Result<()> {
    if identifier_regex()?.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidSchema(format!(
            "invalid {} name '{}'",
            what, name
        )))
    }
}

fn validate_type(ty: &EntityType) -> Result<()> {
    validate_identifier("entity type", ty.name())?;
    let mut seen = std::collections::HashSet::new();
    for attr in ty.attributes() {
        validate_identifier("attribute", &attr.name)?;
        if attr.name == ID_ATTRIBUTE {
            return Err(Error::InvalidSchema(format!(
                "{}.{} is reserved",
                ty.name(),
                ID_ATTRIBUTE
            )));
        }
        if !seen.insert(attr.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "{}.{} declared twice",
                ty.name(),
                attr.name
            )));
        }
    }
    Ok(())
}

/// A sealed, immutable schema.
#[derive(Debug, Clone)]
pub struct Schema {
    types: Vec<EntityType>,
    index: HashMap<String, usize>,
    version: u64,
}

impl Schema {
    /// Registry version this schema was sealed from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All types, in registration order.
    pub fn types(&self) -> &[EntityType] {
        &self.types
    }

    /// Look up a type, failing with `UnknownType`.
    pub fn get_type(&self, name: &str) -> Result<&EntityType> {
        self.index
            .get(name)
            .map(|&i| &self.types[i])
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Look up a relation attribute on a type.
    pub fn relation(&self, entity_type: &str, attribute: &str) -> Result<&RelationInfo> {
        self.get_type(entity_type)?.require_relation(attribute)
    }

    /// Every relation, on any type, whose target is `target`.
    pub fn relations_targeting<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = (&'a EntityType, &'a str, &'a RelationInfo)> + 'a {
        self.types.iter().flat_map(move |ty| {
            ty.relations()
                .filter(move |(_, info)| info.target == target)
                .map(move |(name, info)| (ty, name, info))
        })
    }
}

/// Registry of entity types.
///
/// # Example
///
/// ```
/// use relmodel_core::registry::SchemaRegistry;
/// use relmodel_core::relationship::{RelationInfo, RelationKind};
/// use relmodel_core::schema::{EntityType, ScalarType};
///
/// let mut registry = SchemaRegistry::new();
/// registry.register(
///     EntityType::new("collector").relation(
///         "stamps_one_many",
///         RelationInfo::new(RelationKind::OneToMany, "stamp").inverse("collector"),
///     ),
/// ).unwrap();
/// registry.register(EntityType::new("stamp").scalar("name", ScalarType::String)).unwrap();
///
/// let schema = registry.seal().unwrap();
/// let back = schema.relation("stamp", "collector").unwrap();
/// assert_eq!(back.kind, RelationKind::ManyToOne);
/// ```
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: Vec<EntityType>,
    version: u64,
    sealed: Option<Arc<Schema>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the registry has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// Register a type.
    pub fn register(&mut self, mut ty: EntityType) -> Result<()> {
        if self.sealed.is_some() {
            return Err(Error::SchemaSealed(ty.name().to_string()));
        }
        if self.types.iter().any(|t| t.name() == ty.name()) {
            return Err(Error::DuplicateType(ty.name().to_string()));
        }
        if ty.is_localized() {
            attach_localization_attributes(&mut ty);
        }
        validate_type(&ty)?;

        tracing::debug!(
            target: "relmodel::registry",
            entity_type = ty.name(),
            attributes = ty.attributes().len(),
            localized = ty.is_localized(),
            "registered entity type"
        );
        self.types.push(ty);
        self.version += 1;
        Ok(())
    }

    /// Look up a type. Returns the sealed form (with synthesized inverses) once sealed.
    pub fn get_type(&self, name: &str) -> Result<&EntityType> {
        if let Some(schema) = &self.sealed {
            return schema.get_type(name);
        }
        self.types
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// The sealed schema, if sealed.
    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.sealed.clone()
    }

    /// Seal the registry. Idempotent until [`reopen`](Self::reopen).
    pub fn seal(&mut self) -> Result<Arc<Schema>> {
        if let Some(schema) = &self.sealed {
            return Ok(Arc::clone(schema));
        }

        let mut types = self.types.clone();
        if types.iter().any(EntityType::is_localized)
            && !types.iter().any(|t| t.name() == LOCALIZATION_TYPE)
        {
            types.push(localization_type());
        }
        let index: HashMap<String, usize> = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();

        check_targets(&types, &index)?;
        link_inverses(&mut types, &index)?;
        assign_join_keys(&mut types, &index)?;

        let schema = Arc::new(Schema {
            types,
            index,
            version: self.version,
        });
        tracing::debug!(
            target: "relmodel::registry",
            version = schema.version,
            types = schema.types.len(),
            "schema sealed"
        );
        self.sealed = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Explicit reload step: allow registration again. The next `seal` rebuilds the schema.
    pub fn reopen(&mut self) {
        if self.sealed.take().is_some() {
            self.version += 1;
            tracing::debug!(
                target: "relmodel::registry",
                version = self.version,
                "schema reopened"
            );
        }
    }
}

fn check_targets(types: &[EntityType], index: &HashMap<String, usize>) -> Result<()> {
    for ty in types {
        for (attribute, info) in ty.relations() {
            if !index.contains_key(&info.target) {
                return Err(Error::UnresolvedTarget {
                    entity_type: ty.name().to_string(),
                    attribute: attribute.to_string(),
                    target: info.target.clone(),
                });
            }
            if info.kind.mirrored().is_none() && info.inverse.is_some() {
                return Err(Error::InvalidSchema(format!(
                    "{}.{} is {} and cannot declare an inverse",
                    ty.name(),
                    attribute,
                    info.kind.as_str()
                )));
            }
            match (info.kind, info.inverse.as_deref()) {
                (RelationKind::OneToMany, None) => {
                    return Err(Error::InvalidSchema(format!(
                        "{}.{} is oneToMany and needs an inverse to hold its foreign key",
                        ty.name(),
                        attribute
                    )));
                }
                // exclusivity is enforced through the partner's back reference
                (RelationKind::OneToOne, None) => {
                    return Err(Error::InvalidSchema(format!(
                        "{}.{} is oneToOne and needs an inverse; use oneWay for a one-sided link",
                        ty.name(),
                        attribute
                    )));
                }
                (RelationKind::ManyToMany, Some(inverse))
                    if info.target == ty.name() && inverse == attribute =>
                {
                    return Err(Error::InvalidSchema(format!(
                        "{}.{} is manyToMany and cannot be its own inverse",
                        ty.name(),
                        attribute
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn type_index(index: &HashMap<String, usize>, name: &str) -> Result<usize> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| Error::UnknownType(name.to_string()))
}

fn relation_mut<'a>(ty: &'a mut EntityType, attribute: &str) -> Option<&'a mut RelationInfo> {
    ty.attributes_mut()
        .iter_mut()
        .find(|a| a.name == attribute)
        .and_then(|a| match &mut a.kind {
            AttributeKind::Relation(info) => Some(info),
            AttributeKind::Scalar(_) => None,
        })
}

fn link_inverses(types: &mut [EntityType], index: &HashMap<String, usize>) -> Result<()> {
    let declared: Vec<(String, String, RelationInfo)> = types
        .iter()
        .flat_map(|ty| {
            ty.relations()
                .filter(|(_, info)| info.inverse.is_some())
                .map(|(name, info)| (ty.name().to_string(), name.to_string(), info.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (source, attribute, info) in declared {
        let Some(inverse_name) = info.inverse.as_deref() else {
            continue;
        };
        let target = &mut types[type_index(index, &info.target)?];
        let mismatch = |why: &str| {
            Error::InvalidSchema(format!(
                "{}.{} is not a valid inverse of {}.{}: {}",
                info.target, inverse_name, source, attribute, why
            ))
        };

        match target.attribute(inverse_name).map(|a| a.kind.clone()) {
            None => {
                let Some(synthesized) = info.synthesize_inverse(&source, &attribute) else {
                    continue;
                };
                tracing::debug!(
                    target: "relmodel::registry",
                    entity_type = info.target.as_str(),
                    attribute = inverse_name,
                    kind = synthesized.kind.as_str(),
                    "synthesized inverse relation"
                );
                target.add_attribute(Attribute::relation(inverse_name, synthesized));
            }
            Some(AttributeKind::Scalar(_)) => return Err(mismatch("it is a scalar")),
            Some(AttributeKind::Relation(existing)) => {
                if existing.target != source {
                    return Err(mismatch("it targets another type"));
                }
                if Some(existing.kind) != info.kind.mirrored() {
                    return Err(mismatch("relation kinds do not mirror"));
                }
                match existing.inverse.as_deref() {
                    Some(back) if back != attribute => {
                        return Err(mismatch("it points back to another attribute"));
                    }
                    Some(_) => {}
                    None => {
                        if let Some(info) = relation_mut(target, inverse_name) {
                            info.inverse = Some(attribute.clone());
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn assign_join_keys(types: &mut [EntityType], index: &HashMap<String, usize>) -> Result<()> {
    let many_to_many: Vec<(String, String)> = types
        .iter()
        .flat_map(|ty| {
            ty.relations()
                .filter(|(_, info)| info.kind == RelationKind::ManyToMany)
                .map(|(name, _)| (ty.name().to_string(), name.to_string()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (source, attribute) in many_to_many {
        let source_idx = type_index(index, &source)?;
        let Some(info) = types[source_idx].relation_info(&attribute).cloned() else {
            continue;
        };
        if info.join.is_some() {
            continue;
        }

        let partner = match info.inverse.as_deref() {
            Some(inverse) => {
                let target_idx = type_index(index, &info.target)?;
                types[target_idx]
                    .relation_info(inverse)
                    .cloned()
                    .map(|p| (target_idx, inverse.to_string(), p))
            }
            None => None,
        };

        let owner_is_source = match &partner {
            None => true,
            Some((_, _, p)) => {
                let partner_dominant = p.dominant && !p.synthesized;
                if info.dominant && partner_dominant {
                    return Err(Error::InvalidSchema(format!(
                        "{}.{} and its inverse are both dominant",
                        source, attribute
                    )));
                }
                !partner_dominant && (info.dominant || !info.synthesized)
            }
        };

        let key = match (&partner, owner_is_source) {
            (Some((_, inverse, _)), false) => JoinKey::new(info.target.clone(), inverse.clone()),
            _ => JoinKey::new(source.clone(), attribute.clone()),
        };

        if let Some(rel) = relation_mut(&mut types[source_idx], &attribute) {
            rel.dominant = owner_is_source;
            rel.join = Some(key.clone());
        }
        if let Some((target_idx, inverse, _)) = partner {
            if let Some(rel) = relation_mut(&mut types[target_idx], &inverse) {
                rel.dominant = !owner_is_source;
                rel.join = Some(key.clone());
            }
        }

        tracing::trace!(
            target: "relmodel::registry",
            owner_type = key.owner_type.as_str(),
            attribute = key.attribute.as_str(),
            "join records assigned"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::{LOCALE_ATTRIBUTE, LOCALIZATIONS_ATTRIBUTE};
    use crate::schema::ScalarType;

    fn stamp() -> EntityType {
        EntityType::new("stamp").scalar("name", ScalarType::String)
    }

    fn collector() -> EntityType {
        EntityType::new("collector")
            .scalar("name", ScalarType::String)
            .scalar("age", ScalarType::Integer)
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
                RelationInfo::new(RelationKind::OneToOne, "stamp").inverse("collector_one_one"),
            )
    }

    #[test]
    fn test_register_duplicate_type() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        assert_eq!(
            registry.register(stamp()),
            Err(Error::DuplicateType("stamp".into()))
        );
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_get_unknown_type() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.get_type("stamp").unwrap_err(),
            Error::UnknownType("stamp".into())
        );
    }

    #[test]
    fn test_target_may_register_later() {
        let mut registry = SchemaRegistry::new();
        registry.register(collector()).unwrap();
        registry.register(stamp()).unwrap();
        assert!(registry.seal().is_ok());
    }

    #[test]
    fn test_unresolved_target_fails_seal() {
        let mut registry = SchemaRegistry::new();
        registry.register(collector()).unwrap();
        assert_eq!(
            registry.seal().unwrap_err(),
            Error::UnresolvedTarget {
                entity_type: "collector".into(),
                attribute: "stamps".into(),
                target: "stamp".into(),
            }
        );
        assert!(!registry.is_sealed());
    }

    #[test]
    fn test_seal_synthesizes_inverses() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        registry.register(collector()).unwrap();
        let schema = registry.seal().unwrap();

        let stamp = schema.get_type("stamp").unwrap();
        let collectors = stamp.relation_info("collectors").unwrap();
        assert_eq!(collectors.kind, RelationKind::ManyToMany);
        assert!(collectors.synthesized);
        assert!(!collectors.dominant);

        let collector = stamp.relation_info("collector").unwrap();
        assert_eq!(collector.kind, RelationKind::ManyToOne);
        assert_eq!(collector.inverse.as_deref(), Some("stamps_one_many"));

        let one_one = stamp.relation_info("collector_one_one").unwrap();
        assert_eq!(one_one.kind, RelationKind::OneToOne);
    }

    #[test]
    fn test_join_key_owned_by_dominant_side() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        registry.register(collector()).unwrap();
        let schema = registry.seal().unwrap();

        let expected = Some(JoinKey::new("collector", "stamps_m2m"));
        let owner = schema.relation("collector", "stamps_m2m").unwrap();
        let other = schema.relation("stamp", "collectors").unwrap();
        assert_eq!(owner.join, expected);
        assert_eq!(other.join, expected);
        assert!(owner.dominant);
    }

    #[test]
    fn test_declared_dominant_inverse_wins() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityType::new("tag").relation(
                "posts",
                RelationInfo::new(RelationKind::ManyToMany, "post").inverse("tags"),
            ))
            .unwrap();
        registry
            .register(EntityType::new("post").relation(
                "tags",
                RelationInfo::new(RelationKind::ManyToMany, "tag")
                    .inverse("posts")
                    .dominant(true),
            ))
            .unwrap();
        let schema = registry.seal().unwrap();
        assert_eq!(
            schema.relation("tag", "posts").unwrap().join,
            Some(JoinKey::new("post", "tags"))
        );
    }

    #[test]
    fn test_both_dominant_is_invalid() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityType::new("a").relation(
                "bs",
                RelationInfo::new(RelationKind::ManyToMany, "b")
                    .inverse("as")
                    .dominant(true),
            ))
            .unwrap();
        registry
            .register(EntityType::new("b").relation(
                "as",
                RelationInfo::new(RelationKind::ManyToMany, "a")
                    .inverse("bs")
                    .dominant(true),
            ))
            .unwrap();
        assert!(matches!(registry.seal(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_mismatched_inverse_kind_is_invalid() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityType::new("team").relation(
                "heroes",
                RelationInfo::new(RelationKind::OneToMany, "hero").inverse("team"),
            ))
            .unwrap();
        registry
            .register(EntityType::new("hero").relation(
                "team",
                RelationInfo::new(RelationKind::OneToOne, "team"),
            ))
            .unwrap();
        assert!(matches!(registry.seal(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_one_way_cannot_declare_inverse() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        registry
            .register(EntityType::new("album").relation(
                "cover",
                RelationInfo::new(RelationKind::OneWay, "stamp").inverse("album"),
            ))
            .unwrap();
        assert!(matches!(registry.seal(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_one_to_many_requires_inverse() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        registry
            .register(EntityType::new("dealer").relation(
                "stock",
                RelationInfo::new(RelationKind::OneToMany, "stamp"),
            ))
            .unwrap();
        assert!(matches!(registry.seal(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_one_to_one_requires_inverse() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        registry
            .register(EntityType::new("collector").relation(
                "best",
                RelationInfo::new(RelationKind::OneToOne, "stamp"),
            ))
            .unwrap();
        assert!(matches!(registry.seal(), Err(Error::InvalidSchema(_))));
        assert!(!registry.is_sealed());
    }

    #[test]
    fn test_self_inverse_many_to_many_is_invalid() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityType::new("person").relation(
                "friends",
                RelationInfo::new(RelationKind::ManyToMany, "person").inverse("friends"),
            ))
            .unwrap();
        assert!(matches!(registry.seal(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_self_referencing_many_to_many_with_distinct_inverse() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityType::new("person").relation(
                "follows",
                RelationInfo::new(RelationKind::ManyToMany, "person").inverse("followers"),
            ))
            .unwrap();
        let schema = registry.seal().unwrap();
        let expected = Some(JoinKey::new("person", "follows"));
        assert_eq!(schema.relation("person", "follows").unwrap().join, expected);
        assert_eq!(schema.relation("person", "followers").unwrap().join, expected);
    }

    #[test]
    fn test_sealed_registry_rejects_registration_until_reopened() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        let first = registry.seal().unwrap();

        assert_eq!(
            registry.register(EntityType::new("album")),
            Err(Error::SchemaSealed("album".into()))
        );

        registry.reopen();
        registry.register(EntityType::new("album")).unwrap();
        let second = registry.seal().unwrap();
        assert!(second.version() > first.version());
        assert!(second.get_type("album").is_ok());
    }

    #[test]
    fn test_seal_is_idempotent() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        let a = registry.seal().unwrap();
        let b = registry.seal().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register(EntityType::new("bad name")),
            Err(Error::InvalidSchema(_))
        ));
        assert!(matches!(
            registry.register(EntityType::new("ok").scalar("id", ScalarType::Integer)),
            Err(Error::InvalidSchema(_))
        ));
        assert!(matches!(
            registry.register(
                EntityType::new("twice")
                    .scalar("name", ScalarType::String)
                    .scalar("name", ScalarType::Text)
            ),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_localized_type_pulls_in_localization() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                EntityType::new("article")
                    .scalar("title", ScalarType::String)
                    .localized(true),
            )
            .unwrap();

        let article = registry.get_type("article").unwrap();
        assert!(article.has_attribute(LOCALE_ATTRIBUTE));
        assert!(article.relation_info(LOCALIZATIONS_ATTRIBUTE).is_some());

        let schema = registry.seal().unwrap();
        assert!(schema.get_type(LOCALIZATION_TYPE).is_ok());
    }

    #[test]
    fn test_relations_targeting() {
        let mut registry = SchemaRegistry::new();
        registry.register(stamp()).unwrap();
        registry.register(collector()).unwrap();
        let schema = registry.seal().unwrap();

        let names: Vec<_> = schema
            .relations_targeting("stamp")
            .map(|(ty, name, _)| format!("{}.{}", ty.name(), name))
            .collect();
        assert_eq!(
            names,
            vec![
                "collector.stamps",
                "collector.stamps_m2m",
                "collector.stamps_one_many",
                "collector.stamps_one_one",
            ]
        );
    }
}
