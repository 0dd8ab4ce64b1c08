use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kb::EncoderConfig;
use crate::query::QueryConfig;


#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Reasoner settings, loadable from a TOML file with `[encoder]` and `[query]` tables.
/// Every field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub encoder: EncoderConfig,
    pub query: QueryConfig,
}

impl ReasonerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ReasonerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.encoder.validate()?;
        self.query.validate()
    }
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &str) -> Self {
        ConfigError::Invalid { field, reason: reason.to_string() }
    }
}
