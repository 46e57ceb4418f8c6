//! # Configuration
//!
//! Loads `AuthConfig` from TOML and validates it.

mod app_config;

pub use app_config::{AuthConfig, DataLoaderConfig, TargetHardwareConfig, TftpConfig};

use crate::error::{ConfigError, Result};
use crate::{ldebug, linfo};
use crate::logging::{LogComponent, LogStage};
use std::env;
use std::path::{Path, PathBuf};

/// Resolve the configuration file to read.
///
/// An explicit path wins. Otherwise `config/config.{RUST_ENV}.toml` is used when
/// it exists (`RUST_ENV` defaults to `dev`).
#[must_use]
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let candidate = PathBuf::from(format!("config/config.{env}.toml"));
    candidate.exists().then_some(candidate)
}

/// Load and validate the configuration, falling back to defaults when no file exists
pub fn load_config(explicit: Option<&Path>) -> Result<AuthConfig> {
    let Some(path) = config_path(explicit) else {
        ldebug!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "load_config",
            "No configuration file found, using defaults"
        );
        let config = AuthConfig::default();
        config.validate()?;
        return Ok(config);
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        ConfigError::Load(format!("cannot read {}: {e}", path.display()))
    })?;
    let config = parse_config(&content)?;

    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "load_config",
        "Configuration loaded",
        path = %path.display()
    );
    Ok(config)
}

/// Parse and validate a TOML document
pub fn parse_config(content: &str) -> Result<AuthConfig> {
    let config: AuthConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadAuthError;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = AuthConfig::default();
        assert_eq!(config.tftp.timeout(), Duration::from_secs(2));
        assert_eq!(config.data_loader.dlp_timeout(), Duration::from_secs(13));
        assert_eq!(config.data_loader.server_port, 59);
        assert_eq!(config.target_hardware.status_period(), Duration::from_millis(1000));
        assert_eq!(config.target_hardware.max_certificate_size, 10 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = parse_config(
            r#"
            [data_loader]
            server_port = 6959
            load_directory = "/srv/loads"

            [target_hardware]
            status_period_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.data_loader.server_port, 6959);
        assert_eq!(config.data_loader.load_directory, PathBuf::from("/srv/loads"));
        assert_eq!(config.data_loader.max_tries, 2);
        assert_eq!(config.target_hardware.status_period_ms, 250);
        assert_eq!(config.tftp, TftpConfig::default());
    }

    #[test]
    fn zero_values_are_rejected() {
        let err = parse_config("[tftp]\ntimeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, LoadAuthError::Config { .. }));
        assert!(err.to_string().contains("tftp.timeout_ms"));

        let err = parse_config("[target_hardware]\nmax_tries = 0\n").unwrap_err();
        assert!(err.to_string().contains("target_hardware.max_tries"));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tftp]\nretransmits = 7").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.tftp.retransmits, 7);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/load-auth.toml"))).unwrap_err();
        assert!(matches!(err, LoadAuthError::Config { .. }));
    }
}
