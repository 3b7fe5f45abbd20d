//! Core configuration trait

use crate::{MetainfoError, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Common behaviour of Strata configuration types
pub trait StrataConfig: Clone + Default + DeserializeOwned + Send + Sync + 'static {
    /// Prefix of environment variables overriding this configuration
    const ENV_PREFIX: &'static str;

    /// Get default configuration values
    fn defaults() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MetainfoError::internal(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| MetainfoError::invalid_argument(format!("Invalid TOML: {e}")))
    }

    /// Apply `<ENV_PREFIX><KEY>` environment variables
    fn merge_with_env(&mut self) -> Result<()> {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(Self::ENV_PREFIX) {
                self.set_from_string(&config_key.to_ascii_lowercase(), &value)?;
            }
        }
        Ok(())
    }

    /// Overlay values from `other` that differ from the defaults
    fn merge_with(&mut self, other: &Self);

    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Set a single configuration value from its string form
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<()>;
}
