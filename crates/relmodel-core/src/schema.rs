//! Entity type definitions.
//!
//! An [`EntityType`] is an ordered list of attributes, each either a typed
//! scalar or a relation. Types are built in Rust with the builder methods or
//! loaded from the host framework's JSON content-type shape with
//! [`EntityType::from_json`].

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::relationship::{RelationInfo, RelationKind};
use crate::value::Value;

/// Scalar attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// Short string.
    String,
    /// Long text.
    Text,
    /// 64-bit integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean.
    Boolean,
}

impl ScalarType {
    /// Parse the host framework's attribute `type` spelling.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" | "email" | "uid" | "enumeration" | "password" => Some(ScalarType::String),
            "text" | "richtext" => Some(ScalarType::Text),
            "integer" | "biginteger" => Some(ScalarType::Integer),
            "float" | "decimal" => Some(ScalarType::Float),
            "boolean" => Some(ScalarType::Boolean),
            _ => None,
        }
    }

    /// Whether a value may be stored in an attribute of this type. `Null` always fits.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ScalarType::String | ScalarType::Text, Value::Text(_)) => true,
            (ScalarType::Integer, Value::Int(_)) => true,
            (ScalarType::Float, Value::Int(_) | Value::Double(_)) => true,
            (ScalarType::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

/// What an attribute holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    /// A typed scalar value.
    Scalar(ScalarType),
    /// A relation to another entity type.
    Relation(RelationInfo),
}

/// A named attribute on an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, unique within its type.
    pub name: String,
    /// Scalar type or relation metadata.
    pub kind: AttributeKind,
}

impl Attribute {
    /// Create a scalar attribute.
    pub fn scalar(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Scalar(scalar_type),
        }
    }

    /// Create a relation attribute.
    pub fn relation(name: impl Into<String>, info: RelationInfo) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Relation(info),
        }
    }

    /// Relation metadata, if this is a relation.
    pub fn as_relation(&self) -> Option<&RelationInfo> {
        match &self.kind {
            AttributeKind::Relation(info) => Some(info),
            AttributeKind::Scalar(_) => None,
        }
    }

    /// Scalar type, if this is a scalar.
    pub fn as_scalar(&self) -> Option<ScalarType> {
        match &self.kind {
            AttributeKind::Scalar(ty) => Some(*ty),
            AttributeKind::Relation(_) => None,
        }
    }
}

/// An entity type: name plus ordered attributes.
///
/// # Example
///
/// ```
/// use relmodel_core::relationship::{RelationInfo, RelationKind};
/// use relmodel_core::schema::{EntityType, ScalarType};
///
/// let collector = EntityType::new("collector")
///     .scalar("name", ScalarType::String)
///     .relation(
///         "stamps_m2m",
///         RelationInfo::new(RelationKind::ManyToMany, "stamp")
///             .inverse("collectors")
///             .dominant(true),
///     );
///
/// assert_eq!(collector.attributes().len(), 2);
/// assert!(collector.relation_info("stamps_m2m").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: String,
    attributes: Vec<Attribute>,
    localized: bool,
}

impl EntityType {
    /// Create an empty entity type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            localized: false,
        }
    }

    /// Add a scalar attribute.
    #[must_use]
    pub fn scalar(mut self, name: impl Into<String>, scalar_type: ScalarType) -> Self {
        self.attributes.push(Attribute::scalar(name, scalar_type));
        self
    }

    /// Add a relation attribute.
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, info: RelationInfo) -> Self {
        self.attributes.push(Attribute::relation(name, info));
        self
    }

    /// Flag the type for localization links.
    #[must_use]
    pub fn localized(mut self, value: bool) -> Self {
        self.localized = value;
        self
    }

    /// Append an attribute.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut Vec<Attribute> {
        &mut self.attributes
    }

    /// Whether the type is flagged for localization links.
    pub fn is_localized(&self) -> bool {
        self.localized
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether an attribute with this name exists.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Relation metadata for an attribute, if it is a relation.
    pub fn relation_info(&self, name: &str) -> Option<&RelationInfo> {
        self.attribute(name).and_then(Attribute::as_relation)
    }

    /// Look up an attribute, failing with `UnknownAttribute`.
    pub fn require_attribute(&self, name: &str) -> Result<&Attribute> {
        self.attribute(name)
            .ok_or_else(|| Error::unknown_attribute(&self.name, name))
    }

    /// Look up a relation, failing with `UnknownAttribute` or `NotARelation`.
    pub fn require_relation(&self, name: &str) -> Result<&RelationInfo> {
        self.require_attribute(name)?
            .as_relation()
            .ok_or_else(|| Error::NotARelation {
                entity_type: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    /// Relation attributes in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &RelationInfo)> {
        self.attributes
            .iter()
            .filter_map(|a| a.as_relation().map(|r| (a.name.as_str(), r)))
    }

    /// Parse a content-type definition in the host framework's JSON shape.
    ///
    /// ```
    /// use relmodel_core::schema::EntityType;
    ///
    /// let stamp = EntityType::from_json(r#"{
    ///     "name": "stamp",
    ///     "attributes": { "name": { "type": "string" } }
    /// }"#).unwrap();
    /// assert_eq!(stamp.name(), "stamp");
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// Parse a content-type definition from an already-decoded JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawEntityType = serde_json::from_value(value)?;
        let mut ty = EntityType::new(raw.name.clone()).localized(raw.plugin_options.i18n.enabled);
        for (name, def) in raw.attributes {
            let def: RawAttribute = serde_json::from_value(def)?;
            ty.add_attribute(def.into_attribute(&raw.name, name)?);
        }
        Ok(ty)
    }
}

/// Normalize a target uid such as `application::stamp.stamp` to `stamp`.
pub fn normalize_target(target: &str) -> &str {
    match target.rsplit_once("::") {
        Some((_, rest)) => rest.rsplit('.').next().unwrap_or(rest),
        None => target,
    }
}

#[derive(Debug, Deserialize)]
struct RawEntityType {
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "pluginOptions")]
    plugin_options: RawPluginOptions,
}

#[derive(Debug, Default, Deserialize)]
struct RawPluginOptions {
    #[serde(default)]
    i18n: RawToggle,
}

#[derive(Debug, Default, Deserialize)]
struct RawToggle {
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(rename = "type")]
    scalar_type: Option<String>,
    nature: Option<RelationKind>,
    target: Option<String>,
    #[serde(rename = "targetAttribute")]
    target_attribute: Option<String>,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    dominant: bool,
}

impl RawAttribute {
    fn into_attribute(self, type_name: &str, name: String) -> Result<Attribute> {
        match (self.nature, self.scalar_type) {
            (Some(kind), _) => {
                let target = self.target.ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "relation {}.{} has no target",
                        type_name, name
                    ))
                })?;
                let mut info = RelationInfo::new(kind, normalize_target(&target))
                    .unique(self.unique)
                    .dominant(self.dominant);
                info.inverse = self.target_attribute;
                Ok(Attribute::relation(name, info))
            }
            (None, Some(type_name_raw)) => {
                let scalar = ScalarType::from_type_name(&type_name_raw).ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "attribute {}.{} has unsupported type '{}'",
                        type_name, name, type_name_raw
                    ))
                })?;
                Ok(Attribute::scalar(name, scalar))
            }
            (None, None) => Err(Error::InvalidSchema(format!(
                "attribute {}.{} declares neither a type nor a nature",
                type_name, name
            ))),
        }
    }
}
