//! Entity listings: filter, sort, paginate, annotate.
//!
//! A [`Query`] is plain data; [`QueryEngine`] plans it against a sealed schema
//! and runs it over one consistent [`RelationSource`]. Planning happens before
//! any data is read, so a bad path is rejected with no partial result.
//!
//! # Example
//!
//! ```ignore
//! let query = Query::new("stamp")
//!     .where_eq("collectors.name", "Emma")
//!     .sort("collector.name:DESC")
//!     .populate("collectors")
//!     .limit(10);
//! let rows = QueryEngine::new(Resolver::new(&schema, &*snapshot), &config).execute(&query)?;
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use relmodel_core::{Entity, EntityType, Error, RelationInfo, RelationSource, Result, Value};

use crate::config::EngineConfig;
use crate::filter::{Condition, Direction, FilterOp, SortKey};
use crate::path::{PlannedPath, Terminal};
use crate::resolver::Resolver;

/// How a relation attribute is rendered on each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Annotate {
    /// `{"count": n}`.
    Count,
    /// The related entity (single relations) or entities (collections).
    Populate,
    /// Leave the attribute out.
    Skip,
}

impl Annotate {
    /// Collections are counted, single relations populated.
    pub fn default_for(info: &RelationInfo) -> Self {
        if info.is_collection() {
            Annotate::Count
        } else {
            Annotate::Populate
        }
    }
}

/// A rendered relation on a row.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// Number of related entities.
    Count(usize),
    /// A populated single relation; `None` when nothing is linked.
    One(Option<Entity>),
    /// A populated collection.
    Many(Vec<Entity>),
}

impl RelationValue {
    /// Count carried by a `Count` annotation.
    pub fn count(&self) -> Option<usize> {
        match self {
            RelationValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Related entities regardless of shape; empty for counts.
    pub fn entities(&self) -> &[Entity] {
        match self {
            RelationValue::One(Some(entity)) => std::slice::from_ref(entity),
            RelationValue::Many(entities) => entities,
            RelationValue::One(None) | RelationValue::Count(_) => &[],
        }
    }
}

impl Serialize for RelationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RelationValue::Count(n) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("count", n)?;
                map.end()
            }
            RelationValue::One(entity) => entity.serialize(serializer),
            RelationValue::Many(entities) => entities.serialize(serializer),
        }
    }
}

/// One listing row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// The listed entity with its scalar values.
    pub entity: Entity,
    /// Rendered relations by attribute name.
    pub relations: BTreeMap<String, RelationValue>,
    /// Sort key values this row was ordered by, one per key.
    pub sort_values: Vec<Value>,
}

impl Row {
    /// Id of the listed entity.
    pub fn id(&self) -> i64 {
        self.entity.id
    }

    /// A rendered relation, if the projection kept it.
    pub fn relation(&self, attribute: &str) -> Option<&RelationValue> {
        self.relations.get(attribute)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = 1 + self.entity.values.len() + self.relations.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("id", &self.entity.id)?;
        for (name, value) in &self.entity.values {
            map.serialize_entry(name, value)?;
        }
        for (name, value) in &self.relations {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A listing request over one entity type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    /// Type being listed.
    pub entity_type: String,
    /// Conditions, all of which must hold.
    pub filters: Vec<Condition>,
    /// Sort keys as `path[:ASC|DESC]`, parsed at execution.
    pub sort: Vec<String>,
    /// Per-attribute overrides of the default relation rendering.
    pub projection: BTreeMap<String, Annotate>,
    /// Rows skipped after sorting.
    pub offset: usize,
    /// Maximum rows returned; falls back to the configured default.
    pub limit: Option<usize>,
}

impl Query {
    /// Create an unfiltered listing of `entity_type`.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    /// Add a condition.
    #[must_use]
    pub fn filter(mut self, path: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Condition::new(path, op, value));
        self
    }

    /// Add an equality condition.
    #[must_use]
    pub fn where_eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(path, FilterOp::Eq, value)
    }

    /// Add a sort key, e.g. `"collector.name:DESC"`.
    #[must_use]
    pub fn sort(mut self, key: impl Into<String>) -> Self {
        self.sort.push(key.into());
        self
    }

    /// Override how a relation attribute is rendered.
    #[must_use]
    pub fn annotate(mut self, attribute: impl Into<String>, mode: Annotate) -> Self {
        self.projection.insert(attribute.into(), mode);
        self
    }

    /// Render `attribute` as a count.
    #[must_use]
    pub fn count(self, attribute: impl Into<String>) -> Self {
        self.annotate(attribute, Annotate::Count)
    }

    /// Render `attribute` as the related entities.
    #[must_use]
    pub fn populate(self, attribute: impl Into<String>) -> Self {
        self.annotate(attribute, Annotate::Populate)
    }

    /// Leave `attribute` out of the rows.
    #[must_use]
    pub fn skip(self, attribute: impl Into<String>) -> Self {
        self.annotate(attribute, Annotate::Skip)
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

struct PlannedSort {
    path: PlannedPath,
    direction: Direction,
}

/// Runs queries against one schema and one snapshot.
pub struct QueryEngine<'a, S: RelationSource + ?Sized> {
    resolver: Resolver<'a, S>,
    config: &'a EngineConfig,
}

impl<'a, S: RelationSource + ?Sized> QueryEngine<'a, S> {
    pub fn new(resolver: Resolver<'a, S>, config: &'a EngineConfig) -> Self {
        Self { resolver, config }
    }

    /// Run a listing.
    pub fn execute(&self, query: &Query) -> Result<Vec<Row>> {
        let ty = self.resolver.schema().get_type(&query.entity_type)?;
        let filters = self.plan_filters(query)?;
        let sorts = self.plan_sorts(query)?;
        let projection = plan_projection(ty, query)?;

        tracing::debug!(
            target: "relmodel::query",
            entity_type = %query.entity_type,
            filters = filters.len(),
            sort_keys = sorts.len(),
            "planned query"
        );

        let matching = self.matching(ty, &filters);
        let matched = matching.len();
        let mut rows = self.expand(matching, &sorts);
        if rows.len() > matched && rows.len() > self.config.expansion_warn_threshold {
            tracing::warn!(
                target: "relmodel::query",
                entity_type = %query.entity_type,
                matched = matched,
                rows = rows.len(),
                threshold = self.config.expansion_warn_threshold,
                "sort expansion produced more rows than the warning threshold"
            );
        }
        sort_rows(&mut rows, &sorts);

        let limit = query.limit.or(self.config.default_limit).unwrap_or(usize::MAX);
        let mut page: Vec<Row> = rows.into_iter().skip(query.offset).take(limit).collect();
        for row in &mut page {
            row.relations = self.annotate(ty, &row.entity, &projection);
        }

        tracing::debug!(
            target: "relmodel::query",
            entity_type = %query.entity_type,
            matched = matched,
            returned = page.len(),
            "executed query"
        );
        Ok(page)
    }

    /// Number of entities matching the query's filters. Sort, projection and
    /// pagination are ignored.
    pub fn count_matching(&self, query: &Query) -> Result<usize> {
        let ty = self.resolver.schema().get_type(&query.entity_type)?;
        let filters = self.plan_filters(query)?;
        Ok(self.matching(ty, &filters).len())
    }

    fn plan_filters<'q>(&self, query: &'q Query) -> Result<Vec<(PlannedPath, &'q Condition)>> {
        query
            .filters
            .iter()
            .map(|cond| {
                PlannedPath::plan(
                    self.resolver.schema(),
                    &query.entity_type,
                    &cond.path,
                    self.config.max_path_depth,
                )
                .map(|path| (path, cond))
                .map_err(|e| Error::InvalidFilterPath {
                    path: cond.path.clone(),
                    reason: e.0,
                })
            })
            .collect()
    }

    fn plan_sorts(&self, query: &Query) -> Result<Vec<PlannedSort>> {
        query
            .sort
            .iter()
            .map(|raw| {
                let key = SortKey::parse(raw)?;
                let invalid = |reason: String| Error::InvalidSortPath {
                    path: raw.clone(),
                    reason,
                };
                let path = PlannedPath::plan(
                    self.resolver.schema(),
                    &query.entity_type,
                    &key.path,
                    self.config.max_path_depth,
                )
                .map_err(|e| invalid(e.0))?;
                if matches!(path.terminal(), Terminal::Relation(_)) {
                    return Err(invalid("a sort key must end in a scalar or `id`".into()));
                }
                if path.crosses_collection() && !self.config.expand_collection_sorts {
                    return Err(invalid("sort key crosses a collection relation".into()));
                }
                Ok(PlannedSort {
                    path,
                    direction: key.direction,
                })
            })
            .collect()
    }

    fn matching(&self, ty: &EntityType, filters: &[(PlannedPath, &Condition)]) -> Vec<Entity> {
        self.resolver
            .all(ty)
            .into_iter()
            .filter(|entity| {
                filters.iter().all(|(path, cond)| {
                    let values = path.values(&self.resolver, entity);
                    cond.holds(values.iter())
                })
            })
            .collect()
    }

    /// One row per combination of sort values; a key reaching nothing contributes `Null`.
    fn expand(&self, entities: Vec<Entity>, sorts: &[PlannedSort]) -> Vec<Row> {
        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities {
            let mut combos: Vec<Vec<Value>> = vec![Vec::with_capacity(sorts.len())];
            for sort in sorts {
                let mut values = sort.path.values(&self.resolver, &entity);
                if values.is_empty() {
                    values.push(Value::Null);
                }
                combos = combos
                    .into_iter()
                    .flat_map(|prefix| {
                        values.iter().map(move |v| {
                            let mut next = prefix.clone();
                            next.push(v.clone());
                            next
                        })
                    })
                    .collect();
            }
            rows.extend(combos.into_iter().map(|sort_values| Row {
                entity: entity.clone(),
                relations: BTreeMap::new(),
                sort_values,
            }));
        }
        rows
    }

    fn annotate(
        &self,
        ty: &EntityType,
        entity: &Entity,
        projection: &BTreeMap<&str, (Annotate, &RelationInfo)>,
    ) -> BTreeMap<String, RelationValue> {
        let mut relations = BTreeMap::new();
        for (name, (mode, info)) in projection {
            let ids = self.resolver.related_ids_with(ty.name(), entity.id, name, info);
            let value = match mode {
                Annotate::Skip => continue,
                Annotate::Count => RelationValue::Count(ids.len()),
                Annotate::Populate => {
                    let entities = self.resolver.entities(info, &ids);
                    if info.is_collection() {
                        RelationValue::Many(entities)
                    } else {
                        RelationValue::One(entities.into_iter().next())
                    }
                }
            };
            relations.insert((*name).to_string(), value);
        }
        relations
    }
}

fn plan_projection<'t>(
    ty: &'t EntityType,
    query: &Query,
) -> Result<BTreeMap<&'t str, (Annotate, &'t RelationInfo)>> {
    for name in query.projection.keys() {
        ty.require_relation(name)?;
    }
    Ok(ty
        .relations()
        .map(|(name, info)| {
            let mode = query
                .projection
                .get(name)
                .copied()
                .unwrap_or_else(|| Annotate::default_for(info));
            (name, (mode, info))
        })
        .collect())
}

/// Stable sort. When the first key is descending, the whole order is computed
/// ascending with every key flipped and then reversed, so a single descending
/// key is the exact reverse of its ascending order.
fn sort_rows(rows: &mut [Row], sorts: &[PlannedSort]) {
    let Some(first) = sorts.first() else {
        return;
    };
    let flip = first.direction == Direction::Desc;
    rows.sort_by(|a, b| {
        sorts
            .iter()
            .enumerate()
            .map(|(i, sort)| {
                let direction = if flip {
                    sort.direction.reversed()
                } else {
                    sort.direction
                };
                direction.apply(a.sort_values[i].natural_cmp(&b.sort_values[i]))
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    if flip {
        rows.reverse();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relmodel_core::{EntityData, RelationKind, ScalarType, Schema, SchemaRegistry};
    use relmodel_store::MemoryStore;

    use super::*;

    struct Fixture {
        schema: Arc<Schema>,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = SchemaRegistry::new();
            registry
                .register(EntityType::new("stamp").scalar("name", ScalarType::String))
                .unwrap();
            registry
                .register(
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
                            RelationInfo::new(RelationKind::OneToMany, "stamp")
                                .inverse("collector"),
                        ),
                )
                .unwrap();
            let schema = registry.seal().unwrap();
            let store = MemoryStore::new();

            let stamp = |name: &str| {
                store
                    .create(&schema, "stamp", EntityData::new().set("name", name))
                    .unwrap()
                    .id
            };
            let (s1, s2, s3) = (stamp("1946"), stamp("1947"), stamp("1948"));
            let collectors = [
                ("Bernard", 25, vec![s1, s2], vec![s1], vec![]),
                ("Isabelle", 55, vec![s1], vec![], vec![s2, s3]),
                ("Emma", 23, vec![], vec![s1, s2], vec![s1]),
            ];
            for (name, age, stamps, m2m, one_many) in collectors {
                store
                    .create(
                        &schema,
                        "collector",
                        EntityData::new()
                            .set("name", name)
                            .set("age", age)
                            .link("stamps", stamps)
                            .link("stamps_m2m", m2m)
                            .link("stamps_one_many", one_many),
                    )
                    .unwrap();
            }
            Self { schema, store }
        }

        fn run(&self, query: &Query) -> Result<Vec<Row>> {
            self.run_with(query, &EngineConfig::default())
        }

        fn run_with(&self, query: &Query, config: &EngineConfig) -> Result<Vec<Row>> {
            let snapshot = self.store.snapshot();
            QueryEngine::new(Resolver::new(&self.schema, &*snapshot), config).execute(query)
        }
    }

    fn names(rows: &[Row]) -> Vec<&str> {
        rows.iter().filter_map(|r| r.entity.get_str("name")).collect()
    }

    #[test]
    fn test_filter_through_many_way() {
        let fx = Fixture::new();
        let rows = fx
            .run(&Query::new("collector").where_eq("stamps.name", "1946"))
            .unwrap();
        assert_eq!(names(&rows), vec!["Bernard", "Isabelle"]);
    }

    #[test]
    fn test_filter_through_synthesized_inverse() {
        let fx = Fixture::new();
        let rows = fx
            .run(&Query::new("stamp").where_eq("collectors.name", "Emma"))
            .unwrap();
        assert_eq!(names(&rows), vec!["1946", "1947"]);

        let rows = fx
            .run(&Query::new("stamp").where_eq("collector.name", "Isabelle"))
            .unwrap();
        assert_eq!(names(&rows), vec!["1947", "1948"]);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let fx = Fixture::new();
        let rows = fx
            .run(
                &Query::new("collector")
                    .where_eq("stamps.name", "1946")
                    .filter("age", FilterOp::Gt, 30),
            )
            .unwrap();
        assert_eq!(names(&rows), vec!["Isabelle"]);
    }

    #[test]
    fn test_relation_terminal_compares_ids() {
        let fx = Fixture::new();
        let rows = fx
            .run(&Query::new("collector").where_eq("stamps_m2m", 2))
            .unwrap();
        assert_eq!(names(&rows), vec!["Emma"]);
    }

    #[test]
    fn test_sort_by_many_to_one_and_exact_reverse() {
        let fx = Fixture::new();
        let asc = fx
            .run(&Query::new("stamp").sort("collector.name:ASC"))
            .unwrap();
        let owners: Vec<Value> = asc.iter().map(|r| r.sort_values[0].clone()).collect();
        assert_eq!(
            owners,
            vec![Value::from("Emma"), Value::from("Isabelle"), Value::from("Isabelle")]
        );
        assert_eq!(names(&asc), vec!["1946", "1947", "1948"]);

        let desc = fx
            .run(&Query::new("stamp").sort("collector.name:desc"))
            .unwrap();
        let mut reversed: Vec<i64> = asc.iter().map(Row::id).collect();
        reversed.reverse();
        assert_eq!(desc.iter().map(Row::id).collect::<Vec<_>>(), reversed);
    }

    #[test]
    fn test_collection_sort_expands_rows_with_null_lowest() {
        let fx = Fixture::new();
        let rows = fx.run(&Query::new("collector").sort("stamps.name")).unwrap();
        assert_eq!(names(&rows), vec!["Emma", "Bernard", "Isabelle", "Bernard"]);
        assert_eq!(rows[0].sort_values, vec![Value::Null]);
    }

    #[test]
    fn test_collection_sort_can_be_disabled() {
        let fx = Fixture::new();
        let config = EngineConfig::default().expand_collection_sorts(false);
        let err = fx
            .run_with(&Query::new("collector").sort("stamps.name"), &config)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSortPath { .. }));
    }

    #[test]
    fn test_multiple_sort_keys() {
        let fx = Fixture::new();
        let rows = fx
            .run(&Query::new("stamp").sort("collector.name:DESC").sort("name:ASC"))
            .unwrap();
        assert_eq!(names(&rows), vec!["1947", "1948", "1946"]);
    }

    #[test]
    fn test_default_projection_and_overrides() {
        let fx = Fixture::new();
        let rows = fx.run(&Query::new("stamp")).unwrap();
        let counts: Vec<Option<usize>> = rows
            .iter()
            .map(|r| r.relation("collectors").and_then(RelationValue::count))
            .collect();
        assert_eq!(counts, vec![Some(2), Some(1), Some(0)]);
        assert_eq!(rows[0].relation("collector").map(|r| r.entities().len()), Some(1));
        let owner = rows[1]
            .relation("collector")
            .and_then(|r| r.entities().first())
            .and_then(|e| e.get_str("name"));
        assert_eq!(owner, Some("Isabelle"));

        let rows = fx
            .run(&Query::new("stamp").populate("collectors").skip("collector"))
            .unwrap();
        let first = &rows[0];
        assert!(first.relation("collector").is_none());
        let populated: Vec<&str> = first
            .relation("collectors")
            .map(|r| r.entities().iter().filter_map(|e| e.get_str("name")).collect())
            .unwrap_or_default();
        assert_eq!(populated, vec!["Bernard", "Emma"]);
    }

    #[test]
    fn test_projection_rejects_unknown_and_scalar_attributes() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.run(&Query::new("stamp").count("owners")),
            Err(Error::UnknownAttribute { .. })
        ));
        assert!(matches!(
            fx.run(&Query::new("stamp").count("name")),
            Err(Error::NotARelation { .. })
        ));
    }

    #[test]
    fn test_pagination_after_sort() {
        let fx = Fixture::new();
        let rows = fx
            .run(&Query::new("collector").sort("age:DESC").offset(1).limit(1))
            .unwrap();
        assert_eq!(names(&rows), vec!["Bernard"]);

        let config = EngineConfig::default().default_limit(Some(2));
        let rows = fx.run_with(&Query::new("collector"), &config).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_count_matching_ignores_pagination() {
        let fx = Fixture::new();
        let query = Query::new("collector")
            .where_eq("stamps.name", "1946")
            .limit(1);
        let snapshot = fx.store.snapshot();
        let config = EngineConfig::default();
        let engine = QueryEngine::new(Resolver::new(&fx.schema, &*snapshot), &config);
        assert_eq!(engine.count_matching(&query).unwrap(), 2);
        assert_eq!(engine.execute(&query).unwrap().len(), 1);
    }

    #[test]
    fn test_path_errors() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.run(&Query::new("collector").where_eq("stamps.title", "x")),
            Err(Error::InvalidFilterPath { .. })
        ));
        assert!(matches!(
            fx.run(&Query::new("collector").where_eq("name.stamps", "x")),
            Err(Error::InvalidFilterPath { .. })
        ));
        assert!(matches!(
            fx.run(&Query::new("stamp").sort("collector")),
            Err(Error::InvalidSortPath { .. })
        ));
        assert!(matches!(
            fx.run(&Query::new("stamp").sort("name:SIDEWAYS")),
            Err(Error::InvalidSortPath { .. })
        ));
        assert!(matches!(
            fx.run(&Query::new("album")),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_row_serializes_in_listing_shape() {
        let fx = Fixture::new();
        let rows = fx
            .run(&Query::new("stamp").where_eq("name", "1947"))
            .unwrap();
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["name"], "1947");
        assert_eq!(json["collectors"], serde_json::json!({ "count": 1 }));
        assert_eq!(json["collector"]["name"], "Isabelle");
    }
}
