//! Error types for relmodel.
//!
//! Every fallible operation in the workspace returns [`Result`]. Errors are
//! structural: they describe a request that cannot be answered (unknown type,
//! bad path, invalid schema). A relation that simply has nothing on the other
//! end is never an error.

use std::error::Error as StdError;
use std::fmt;

/// Convenience alias used across all relmodel crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A type with this name is already registered.
    DuplicateType(String),
    /// No type with this name is registered.
    UnknownType(String),
    /// The attribute is not declared on the entity type.
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },
    /// The attribute exists but is a scalar where a relation was required.
    NotARelation {
        entity_type: String,
        attribute: String,
    },
    /// A sort key could not be planned against the schema.
    InvalidSortPath { path: String, reason: String },
    /// A filter path could not be planned against the schema.
    InvalidFilterPath { path: String, reason: String },
    /// The registry was sealed by first use; call `reopen` before registering.
    SchemaSealed(String),
    /// A relation names a target type that was never registered.
    UnresolvedTarget {
        entity_type: String,
        attribute: String,
        target: String,
    },
    /// The schema is structurally inconsistent.
    InvalidSchema(String),
    /// No entity with this id exists for the type.
    UnknownEntity { entity_type: String, id: i64 },
    /// A written value does not fit the attribute.
    InvalidValue {
        entity_type: String,
        attribute: String,
        message: String,
    },
    /// A JSON definition could not be decoded.
    Json(String),
}

impl Error {
    pub(crate) fn unknown_attribute(entity_type: &str, attribute: &str) -> Self {
        Error::UnknownAttribute {
            entity_type: entity_type.to_string(),
            attribute: attribute.to_string(),
        }
    }

    /// Build an [`Error::InvalidValue`].
    pub fn invalid_value(entity_type: &str, attribute: &str, message: impl Into<String>) -> Self {
        Error::InvalidValue {
            entity_type: entity_type.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error was caused by the shape of the request rather than the schema.
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFilterPath { .. } | Error::InvalidSortPath { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateType(name) => write!(f, "entity type already registered: {}", name),
            Error::UnknownType(name) => write!(f, "unknown entity type: {}", name),
            Error::UnknownAttribute {
                entity_type,
                attribute,
            } => write!(f, "unknown attribute {}.{}", entity_type, attribute),
            Error::NotARelation {
                entity_type,
                attribute,
            } => write!(f, "attribute {}.{} is not a relation", entity_type, attribute),
            Error::InvalidSortPath { path, reason } => {
                write!(f, "invalid sort path '{}': {}", path, reason)
            }
            Error::InvalidFilterPath { path, reason } => {
                write!(f, "invalid filter path '{}': {}", path, reason)
            }
            Error::SchemaSealed(name) => {
                write!(f, "schema is sealed, cannot register '{}'", name)
            }
            Error::UnresolvedTarget {
                entity_type,
                attribute,
                target,
            } => write!(
                f,
                "relation {}.{} targets unregistered type '{}'",
                entity_type, attribute, target
            ),
            Error::InvalidSchema(msg) => write!(f, "invalid schema: {}", msg),
            Error::UnknownEntity { entity_type, id } => {
                write!(f, "no {} with id {}", entity_type, id)
            }
            Error::InvalidValue {
                entity_type,
                attribute,
                message,
            } => write!(
                f,
                "invalid value for {}.{}: {}",
                entity_type, attribute, message
            ),
            Error::Json(msg) => write!(f, "json error: {}", msg),
        }
    }
}

impl StdError for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}
