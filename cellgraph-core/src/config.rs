//! Store Configuration
//!
//! Stores are configured with a small serde-backed struct so embedding
//! applications can keep the settings next to their own configuration.

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Default bound on nested compute frames.
const DEFAULT_MAX_COMPUTE_DEPTH: usize = 256;

/// Settings for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name attached to the store's log events.
    pub name: String,

    /// Maximum number of computations that may be active at once.
    ///
    /// Each derived atom reading another uncomputed derived atom adds a
    /// frame. A read from outside any computation that hits the limit
    /// resolves the deeper atoms first and retries, so long chains still
    /// evaluate; only nesting that never bottoms out fails with
    /// `DepthExceeded`.
    pub max_compute_depth: usize,

    /// Recompute every invalidated atom after a write.
    ///
    /// When disabled, only atoms with subscribers are recomputed during the
    /// write; the rest stay invalidated until they are read.
    pub eager_recompute: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            max_compute_depth: DEFAULT_MAX_COMPUTE_DEPTH,
            eager_recompute: true,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn defaults_are_eager() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "store");
        assert_eq!(config.max_compute_depth, 256);
        assert!(config.eager_recompute);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = StoreConfig::from_json(r#"{ "eager_recompute": false }"#).unwrap();
        assert!(!config.eager_recompute);
        assert_eq!(config.name, "store");
        assert_eq!(config.max_compute_depth, 256);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let err = StoreConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = StoreConfig {
            name: "ui".into(),
            max_compute_depth: 16,
            eager_recompute: false,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(StoreConfig::from_json(&json).unwrap(), config);
    }
}
