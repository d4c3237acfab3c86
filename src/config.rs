//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs to mention
//! the values it overrides:
//!
//! ```toml
//! concurrency = 4
//! message_capacity = 256
//!
//! [type_capacity]
//! particlefx = 64
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::{fs, io};

use serde::Deserialize;

/// Capacity hints and scheduling parameters for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of worker threads used to run worlds in parallel.
    /// Zero runs all worlds on the thread calling [`Engine::tick`](crate::Engine::tick).
    pub concurrency:       usize,
    /// Maximum number of pending messages per world.
    pub message_capacity:  usize,
    /// Default maximum number of live instances per component type per world.
    pub instance_capacity: usize,
    /// Per-type overrides of `instance_capacity`, keyed by component type name.
    pub type_capacity:     BTreeMap<String, usize>,
    /// Maximum number of simultaneously active worlds.
    pub max_worlds:        usize,
    /// Maximum number of resident resources.
    pub max_resources:     usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency:       0,
            message_capacity:  1024,
            instance_capacity: 1024,
            type_capacity:     BTreeMap::new(),
            max_worlds:        64,
            max_resources:     4096,
        }
    }
}

impl Config {
    /// Parses a configuration from TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(source)?) }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Returns the instance capacity of the component type `name`.
    pub fn capacity_of(&self, name: &str) -> usize {
        self.type_capacity.get(name).copied().unwrap_or(self.instance_capacity)
    }
}

/// Errors from reading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid TOML or has fields of the wrong type.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            concurrency = 2
            [type_capacity]
            particlefx = 8
            "#,
        )
        .expect("valid config");

        assert_eq!(config.concurrency, 2);
        assert_eq!(config.message_capacity, Config::default().message_capacity);
        assert_eq!(config.capacity_of("particlefx"), 8);
        assert_eq!(config.capacity_of("sound"), Config::default().instance_capacity);
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let err = Config::from_toml_str("max_worlds = \"many\"").expect_err("string for usize");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
