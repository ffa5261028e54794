//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::value::DisplayPolicy;

/// Tunables for an [`Engine`](crate::engine::Engine).
///
/// Every field has a default, so a host only needs to supply what it
/// overrides:
///
/// ```rust
/// use tessera_core::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "display": { "digits": 4 } }"#).unwrap();
/// assert_eq!(config.display.digits, Some(4));
/// assert_eq!(config.max_settle_passes, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Display policy for numbers with no declaring ancestor.
    pub display: DisplayPolicy,

    /// Upper bound on composite-expansion and trigger-condition passes in
    /// one microcycle.
    pub max_settle_passes: usize,

    /// Upper bound on how many inverse definitions a single write may pass
    /// through before reaching essential storage.
    pub max_write_depth: usize,

    /// Treat any structural diagnostic as a load failure.
    pub strict_structure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            display: DisplayPolicy::default(),
            max_settle_passes: 32,
            max_write_depth: 64,
            strict_structure: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_display_policy_keeps_other_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "display": { "decimals": 2 }, "strictStructure": true }"#)
                .unwrap();
        assert_eq!(config.display.decimals, Some(2));
        assert_eq!(config.display.digits, Some(10));
        assert!(config.strict_structure);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(EngineConfig::from_json("{ display: }").is_err());
    }
}
