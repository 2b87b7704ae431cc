//! Filter conditions and sort keys.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use relmodel_core::{Error, Result, Value};

/// Comparison applied between a path value and the condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    #[default]
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Substring match on text values.
    Contains,
}

impl FilterOp {
    /// Parse an operator suffix (`eq`, `ne`, `lt`, `lte`, `gt`, `gte`, `contains`).
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(FilterOp::Eq),
            "ne" => Some(FilterOp::Ne),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "contains" => Some(FilterOp::Contains),
            _ => None,
        }
    }

    /// Whether `actual` satisfies this operator against `expected`.
    ///
    /// Ordering operators only compare values of the same family (numbers with
    /// numbers, text with text, booleans with booleans); anything else fails.
    pub fn test(self, actual: &Value, expected: &Value) -> bool {
        match self {
            FilterOp::Eq => actual.matches(expected),
            FilterOp::Ne => !actual.matches(expected),
            FilterOp::Lt => ordered(actual, expected).is_some_and(Ordering::is_lt),
            FilterOp::Lte => ordered(actual, expected).is_some_and(Ordering::is_le),
            FilterOp::Gt => ordered(actual, expected).is_some_and(Ordering::is_gt),
            FilterOp::Gte => ordered(actual, expected).is_some_and(Ordering::is_ge),
            FilterOp::Contains => match (actual, expected) {
                (Value::Text(a), Value::Text(e)) => a.contains(e.as_str()),
                _ => false,
            },
        }
    }
}

fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
    let comparable = matches!(
        (a, b),
        (Value::Bool(_), Value::Bool(_))
            | (Value::Text(_), Value::Text(_))
            | (
                Value::Int(_) | Value::Double(_),
                Value::Int(_) | Value::Double(_)
            )
    );
    comparable.then(|| a.natural_cmp(b))
}

/// One filter condition: `path op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path from the queried type, e.g. `collectors.name`.
    pub path: String,
    /// Defaults to `eq`.
    #[serde(default)]
    pub op: FilterOp,
    pub value: Value,
}

impl Condition {
    /// Create a condition.
    pub fn new(path: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    /// Equality condition.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(path, FilterOp::Eq, value)
    }

    /// True when any of the reachable values satisfies the condition.
    pub fn holds<'v>(&self, mut values: impl Iterator<Item = &'v Value>) -> bool {
        values.any(|v| self.op.test(v, &self.value))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// The opposite direction.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }

    /// Apply the direction to an ascending comparison.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => write!(f, "ASC"),
            Direction::Desc => write!(f, "DESC"),
        }
    }
}

/// A parsed sort key `path[:ASC|DESC]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dotted path from the queried type.
    pub path: String,
    pub direction: Direction,
}

impl SortKey {
    /// Create a sort key.
    pub fn new(path: impl Into<String>, direction: Direction) -> Self {
        Self {
            path: path.into(),
            direction,
        }
    }

    /// Parse `"collector.name:DESC"`. The direction is optional and case-insensitive.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSortPath {
            path: key.to_string(),
            reason,
        };
        let (path, direction) = match key.split_once(':') {
            None => (key, Direction::Asc),
            Some((path, dir)) => {
                let direction = match dir.to_ascii_uppercase().as_str() {
                    "ASC" => Direction::Asc,
                    "DESC" => Direction::Desc,
                    _ => return Err(invalid(format!("malformed direction `{dir}`"))),
                };
                (path, direction)
            }
        };
        if path.trim().is_empty() {
            return Err(invalid("path is empty".into()));
        }
        Ok(Self::new(path.trim(), direction))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_is_numeric_across_int_and_double() {
        assert!(FilterOp::Eq.test(&Value::Int(2), &Value::Double(2.0)));
        assert!(!FilterOp::Eq.test(&Value::Text("2".into()), &Value::Int(2)));
        assert!(FilterOp::Ne.test(&Value::Null, &Value::Text("1946".into())));
    }

    #[test]
    fn test_ordering_ops_reject_mixed_families() {
        assert!(FilterOp::Lt.test(&Value::Int(23), &Value::Int(25)));
        assert!(FilterOp::Gte.test(&Value::Double(25.0), &Value::Int(25)));
        assert!(!FilterOp::Lt.test(&Value::Null, &Value::Int(25)));
        assert!(!FilterOp::Gt.test(&Value::Text("b".into()), &Value::Int(1)));
        assert!(FilterOp::Gt.test(&Value::Text("b".into()), &Value::Text("a".into())));
    }

    #[test]
    fn test_contains() {
        let name = Value::Text("Isabelle".into());
        assert!(FilterOp::Contains.test(&name, &Value::Text("abel".into())));
        assert!(!FilterOp::Contains.test(&name, &Value::Text("Emma".into())));
        assert!(!FilterOp::Contains.test(&Value::Int(1946), &Value::Text("19".into())));
    }

    #[test]
    fn test_condition_is_existential() {
        let cond = Condition::eq("stamps.name", "1946");
        let values = [Value::from("1947"), Value::from("1946")];
        assert!(cond.holds(values.iter()));
        assert!(!cond.holds(std::iter::empty()));
    }

    #[test]
    fn test_op_parse() {
        assert_eq!(FilterOp::from_str_opt("LTE"), Some(FilterOp::Lte));
        assert_eq!(FilterOp::from_str_opt("like"), None);
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            SortKey::parse("collector.name").unwrap(),
            SortKey::new("collector.name", Direction::Asc)
        );
        assert_eq!(
            SortKey::parse("collector.name:desc").unwrap(),
            SortKey::new("collector.name", Direction::Desc)
        );
        assert_eq!(SortKey::parse("name:Asc").unwrap().to_string(), "name:ASC");
    }

    #[test]
    fn test_sort_key_parse_errors() {
        for bad in ["name:UP", "name:", ":ASC", ""] {
            assert!(
                matches!(SortKey::parse(bad), Err(Error::InvalidSortPath { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
