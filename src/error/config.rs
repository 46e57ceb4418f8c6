use thiserror::Error;

use super::LoadAuthError;

/// Failures while loading or validating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration load failed: {0}")]
    Load(String),

    #[error("Invalid configuration value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for LoadAuthError {
    fn from(err: ConfigError) -> Self {
        Self::config_with_source(err.to_string(), err)
    }
}
