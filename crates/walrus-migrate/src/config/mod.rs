//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load the first config file found at the standard locations,
    /// falling back to defaults when none exists.
    pub fn load_default() -> Result<Self> {
        for candidate in Self::search_paths() {
            if candidate.is_file() {
                debug!("Loading configuration from {}", candidate.display());
                return Self::load(candidate);
            }
        }
        Ok(Self::default())
    }

    /// Standard config locations, in probe order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/walrus-migrate/config.yaml"));
            paths.push(home.join(".walrus-migrate/config.yaml"));
        }
        paths.push(PathBuf::from("walrus-config.yaml"));
        paths
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
