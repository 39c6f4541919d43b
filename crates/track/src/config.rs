use blocktrace_common::WorldId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Tracker configuration: which worlds and which event kinds are audited.
///
/// Every field has a default, so a partial YAML file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Worlds to audit; `None` audits every world.
    pub enabled_worlds: Option<BTreeSet<String>>,
    pub block_break: bool,
    pub block_place: bool,
    pub block_burn: bool,
    /// Track cells destroyed as a consequence of a primary break (torches
    /// losing support and the like).
    pub natural_break: bool,
    /// Track liquid form transitions.
    pub liquid_tracking: bool,
    /// Accept bulk edit batches from external tools.
    pub external_edits: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled_worlds: None,
            block_break: true,
            block_place: true,
            block_burn: true,
            natural_break: true,
            liquid_tracking: true,
            external_edits: true,
        }
    }
}

impl TrackerConfig {
    /// Whether auditing is on for `world`.
    pub fn world_enabled(&self, world: &WorldId) -> bool {
        match &self.enabled_worlds {
            Some(worlds) => worlds.contains(world.as_str()),
            None => true,
        }
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_track_everything() {
        let config = TrackerConfig::default();
        assert!(config.world_enabled(&WorldId::new("overworld")));
        assert!(config.block_break && config.block_place && config.block_burn);
        assert!(config.natural_break && config.liquid_tracking && config.external_edits);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = TrackerConfig::from_yaml("natural_break: false\n").unwrap();
        assert!(!config.natural_break);
        assert!(config.block_break);
    }

    #[test]
    fn world_allowlist() {
        let config = TrackerConfig::from_yaml("enabled_worlds: [overworld]\n").unwrap();
        assert!(config.world_enabled(&WorldId::new("overworld")));
        assert!(!config.world_enabled(&WorldId::new("nether")));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(TrackerConfig::from_yaml("enabled_worlds: {{").is_err());
    }
}
