//! RON configuration for the game rules

use crate::{Error, Result};
use outpost_sync::FeedConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Game rule settings
///
/// Every field is optional in the RON source.
///
/// # Example
///
/// ```
/// use outpost_game::GameConfig;
///
/// let config = GameConfig::from_ron("(counter_period_ms: 250)").unwrap();
/// assert_eq!(config.counter_period_ms, 250);
/// assert_eq!(config.mining_period_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GameConfig {
    /// Period of the session counter
    #[serde(default = "default_counter_period")]
    pub counter_period_ms: u64,
    /// XP granted when a building finishes construction
    #[serde(default = "default_xp_per_building")]
    pub xp_per_building: u64,
    /// Period of a complete mineshaft's mining cycle
    #[serde(default = "default_mining_period")]
    pub mining_period_ms: u64,
    /// Iron mined per cycle
    #[serde(default = "default_iron_per_cycle")]
    pub iron_per_cycle: u64,
    /// Inhabitants of a complete habitat
    #[serde(default = "default_habitat_inhabitants")]
    pub habitat_inhabitants: u32,
    #[serde(default = "default_habitat_construction")]
    pub habitat_construction_ms: u64,
    #[serde(default = "default_mineshaft_construction")]
    pub mineshaft_construction_ms: u64,
    /// State feed settings
    #[serde(default)]
    pub feed: FeedConfig,
}

fn default_counter_period() -> u64 {
    1000
}

fn default_xp_per_building() -> u64 {
    10
}

fn default_mining_period() -> u64 {
    5000
}

fn default_iron_per_cycle() -> u64 {
    10
}

fn default_habitat_inhabitants() -> u32 {
    10
}

fn default_habitat_construction() -> u64 {
    15_000
}

fn default_mineshaft_construction() -> u64 {
    10_000
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            counter_period_ms: default_counter_period(),
            xp_per_building: default_xp_per_building(),
            mining_period_ms: default_mining_period(),
            iron_per_cycle: default_iron_per_cycle(),
            habitat_inhabitants: default_habitat_inhabitants(),
            habitat_construction_ms: default_habitat_construction(),
            mineshaft_construction_ms: default_mineshaft_construction(),
            feed: FeedConfig::default(),
        }
    }
}

impl GameConfig {
    /// Parse configuration from RON source
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded game config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GameConfig::from_ron("()").unwrap();
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.habitat_construction_ms, 15_000);
        assert_eq!(config.mineshaft_construction_ms, 10_000);
    }

    #[test]
    fn test_nested_feed_config() {
        let config = GameConfig::from_ron(
            r#"(
                iron_per_cycle: 25,
                feed: (resync_interval: None),
            )"#,
        )
        .unwrap();
        assert_eq!(config.iron_per_cycle, 25);
        assert_eq!(config.feed.resync_interval, None);
        assert_eq!(config.xp_per_building, 10);
    }

    #[test]
    fn test_invalid_config() {
        let err = GameConfig::from_ron("(counter_period_ms: \"soon\")").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = GameConfig::load("/nonexistent/outpost.ron").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
