//! Query engine configuration.

use serde::{Deserialize, Serialize};

use relmodel_core::Result;

/// Configuration for query planning and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of segments in a filter or sort path.
    pub max_path_depth: usize,
    /// Whether a sort key may cross a collection relation, producing one row per related entity.
    /// When false such keys fail with `InvalidSortPath`.
    pub expand_collection_sorts: bool,
    /// Limit applied when a query does not set one.
    pub default_limit: Option<usize>,
    /// Row count above which an expanding sort logs a warning.
    pub expansion_warn_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 4,
            expand_collection_sorts: true,
            default_limit: None,
            expansion_warn_threshold: 1000,
        }
    }
}

impl EngineConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the maximum path depth.
    #[must_use]
    pub fn max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth;
        self
    }

    /// Allow or forbid sort keys across collection relations.
    #[must_use]
    pub fn expand_collection_sorts(mut self, value: bool) -> Self {
        self.expand_collection_sorts = value;
        self
    }

    /// Set the default limit.
    #[must_use]
    pub fn default_limit(mut self, limit: Option<usize>) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set the expansion warning threshold.
    #[must_use]
    pub fn expansion_warn_threshold(mut self, rows: usize) -> Self {
        self.expansion_warn_threshold = rows;
        self
    }
}
