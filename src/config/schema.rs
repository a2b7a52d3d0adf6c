//! Configuration schema for volcache
//!
//! Configuration is read from `.volcache.toml` in the working directory, or
//! from the file given with `--config`.

use crate::cache::{Elevation, StrategyChoice};
use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache attachment settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: LogFormat,
}

/// Cache attachment settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Mode tags to resolve, in order
    pub modes: Vec<String>,

    /// Manual cache paths, in order
    pub paths: Vec<String>,

    /// Add modes detected from marker files
    pub detect: bool,

    /// Fail the attach phase when any path was a cache miss
    pub fail_on_cache_miss: bool,

    /// Attachment strategy
    pub strategy: StrategyChoice,

    /// Privilege elevation for filesystem steps
    pub elevate: Elevation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.strategy, StrategyChoice::Auto);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            modes = ["go", "pnpm"]
            strategy = "bind-mount"
            elevate = "never"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.modes, vec!["go", "pnpm"]);
        assert_eq!(config.cache.strategy, StrategyChoice::BindMount);
        assert_eq!(config.cache.elevate, Elevation::Never);
        assert!(!config.cache.fail_on_cache_miss); // default preserved
        assert_eq!(config.general.log_format, LogFormat::Text);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[cache]\nmode = [\"go\"]").is_err());
    }
}
