//! Configuration management for the revision tree engine
//!
//! Defaults suit a document store that prunes on every save. A TOML file and
//! environment variables can override any of them.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Default config file looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "massive-revtree.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Revision tree limits
    pub tree: TreeConfig,

    /// Storage behaviour
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Revision tree limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Generations kept behind each leaf when pruning (0 = never prune)
    pub max_depth: u32,

    /// Cap on `possible_ancestors` results
    pub max_possible_ancestors: usize,

    /// Default cap on `history` walks
    pub max_history: usize,
}

/// Storage behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prune to `tree.max_depth` before every save
    pub prune_on_save: bool,

    /// Initial document map capacity
    pub initial_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            max_possible_ancestors: 10,
            max_history: 20,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prune_on_save: true,
            initial_capacity: 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and environment variables
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if Path::new(CONFIG_FILE).exists() {
            config = Self::from_file(CONFIG_FILE)?;
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// An unreadable file is an [`Error::Io`]; bad contents are an
    /// [`Error::Config`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply overrides looked up through `var`
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(depth) = var("MR_MAX_DEPTH") {
            self.tree.max_depth = parse_var("max depth", &depth)?;
        }

        if let Some(limit) = var("MR_MAX_POSSIBLE_ANCESTORS") {
            self.tree.max_possible_ancestors = parse_var("max possible ancestors", &limit)?;
        }

        if let Some(limit) = var("MR_MAX_HISTORY") {
            self.tree.max_history = parse_var("max history", &limit)?;
        }

        if let Some(prune) = var("MR_PRUNE_ON_SAVE") {
            self.storage.prune_on_save = parse_var("prune on save", &prune)?;
        }

        if let Some(level) = var("MR_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = var("MR_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // parent links are u16, so no chain can be deeper
        if self.tree.max_depth > u16::MAX as u32 {
            return Err(Error::config("Max depth too large (maximum 65535)"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(what: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::config(format!("Invalid {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert_eq!(config.tree.max_depth, 20);
        assert_eq!(config.tree.max_possible_ancestors, 10);
        assert!(config.storage.prune_on_save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tree]\nmax_depth = 5\n\n[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.tree.max_depth, 5);
        assert_eq!(config.tree.max_history, 20);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_unparseable_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tree\nmax_depth = ").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(vars(&[
                ("MR_MAX_DEPTH", "0"),
                ("MR_PRUNE_ON_SAVE", "false"),
                ("MR_LOG_FORMAT", "compact"),
            ]))
            .unwrap();

        assert_eq!(config.tree.max_depth, 0);
        assert!(!config.storage.prune_on_save);
        assert_eq!(config.logging.format, "compact");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(vars(&[("MR_MAX_HISTORY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation_rejects() {
        let mut config = Config::default();
        config.tree.max_depth = 70_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
