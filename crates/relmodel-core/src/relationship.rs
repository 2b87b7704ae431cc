//! Relation metadata for relmodel.
//!
//! Relations are declared on an [`EntityType`](crate::schema::EntityType) and
//! completed when the registry is sealed: inverse attributes are synthesized
//! on the target, and many-to-many relations learn where their join records
//! live. Higher layers (store, resolver) only ever read sealed metadata.

use serde::{Deserialize, Serialize};

/// The kind of relation between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    /// Collection of references with no inverse on the target.
    ManyWay,
    /// Single reference with no inverse on the target.
    OneWay,
    /// `Collector` has one `Stamp`, and that stamp has one collector.
    OneToOne,
    /// One `Collector` owns many `Stamp`s; the foreign key lives on the stamp.
    OneToMany,
    /// Many `Stamp`s belong to one `Collector`.
    ManyToOne,
    /// `Collector`s have many `Stamp`s via join records.
    ManyToMany,
}

impl RelationKind {
    /// Parse the host framework's `nature` spelling (`"manyToMany"`, ...).
    pub fn from_nature(nature: &str) -> Option<Self> {
        match nature {
            "manyWay" => Some(RelationKind::ManyWay),
            "oneWay" => Some(RelationKind::OneWay),
            "oneToOne" => Some(RelationKind::OneToOne),
            "oneToMany" => Some(RelationKind::OneToMany),
            "manyToOne" => Some(RelationKind::ManyToOne),
            "manyToMany" => Some(RelationKind::ManyToMany),
            _ => None,
        }
    }

    /// The `nature` spelling of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::ManyWay => "manyWay",
            RelationKind::OneWay => "oneWay",
            RelationKind::OneToOne => "oneToOne",
            RelationKind::OneToMany => "oneToMany",
            RelationKind::ManyToOne => "manyToOne",
            RelationKind::ManyToMany => "manyToMany",
        }
    }

    /// Whether resolving this relation can yield more than one entity.
    pub const fn is_collection(self) -> bool {
        matches!(
            self,
            RelationKind::ManyWay | RelationKind::OneToMany | RelationKind::ManyToMany
        )
    }

    /// The kind an inverse attribute on the target must have.
    ///
    /// `None` for one-directional kinds, which never carry an inverse.
    pub const fn mirrored(self) -> Option<Self> {
        match self {
            RelationKind::ManyWay | RelationKind::OneWay => None,
            RelationKind::OneToOne => Some(RelationKind::OneToOne),
            RelationKind::OneToMany => Some(RelationKind::ManyToOne),
            RelationKind::ManyToOne => Some(RelationKind::OneToMany),
            RelationKind::ManyToMany => Some(RelationKind::ManyToMany),
        }
    }

    /// How links of this kind are stored.
    pub const fn storage(self) -> LinkStorage {
        match self {
            RelationKind::ManyWay
            | RelationKind::OneWay
            | RelationKind::OneToOne
            | RelationKind::ManyToOne => LinkStorage::References,
            RelationKind::OneToMany => LinkStorage::Derived,
            RelationKind::ManyToMany => LinkStorage::JoinRecords,
        }
    }
}

/// Where the links of a relation physically live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStorage {
    /// An ordered id list on the owning record.
    References,
    /// Nothing stored; derived from the inverse foreign keys.
    Derived,
    /// Join records keyed by the dominant side.
    JoinRecords,
}

/// Location of the join records of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    /// Entity type of the dominant side.
    pub owner_type: String,
    /// Relation attribute on the dominant side.
    pub attribute: String,
}

impl JoinKey {
    /// Create a new join key.
    pub fn new(owner_type: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            attribute: attribute.into(),
        }
    }
}

/// Metadata about a relation attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    /// Name of the target entity type.
    pub target: String,

    /// Kind of relation.
    pub kind: RelationKind,

    /// The attribute on the target that points back.
    pub inverse: Option<String>,

    /// Uniqueness flag carried from the declaration.
    pub unique: bool,

    /// Whether this side owns the join records (many-to-many only).
    pub dominant: bool,

    /// Set when the registry created this attribute as an inverse.
    pub synthesized: bool,

    /// Join record location; filled in at seal time for many-to-many.
    pub join: Option<JoinKey>,
}

impl RelationInfo {
    /// Create a new relation with required fields.
    pub fn new(kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind,
            inverse: None,
            unique: false,
            dominant: false,
            synthesized: false,
            join: None,
        }
    }

    /// Set the inverse attribute name on the target.
    #[must_use]
    pub fn inverse(mut self, attribute: impl Into<String>) -> Self {
        self.inverse = Some(attribute.into());
        self
    }

    /// Set the uniqueness flag.
    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Mark this side as dominant (many-to-many).
    #[must_use]
    pub fn dominant(mut self, value: bool) -> Self {
        self.dominant = value;
        self
    }

    /// Whether resolving this relation can yield more than one entity.
    pub fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }

    /// Build the relation the registry places on the target as this relation's inverse.
    ///
    /// Returns `None` for one-directional kinds.
    pub fn synthesize_inverse(&self, source_type: &str, source_attribute: &str) -> Option<Self> {
        let kind = self.kind.mirrored()?;
        Some(Self {
            target: source_type.to_string(),
            kind,
            inverse: Some(source_attribute.to_string()),
            unique: false,
            dominant: false,
            synthesized: true,
            join: None,
        })
    }
}
