//! # Error handling tests

use crate::error::{CodecError, ConfigError, Context, LoadAuthError, TftpError};
use std::error::Error;
use std::time::Duration;

#[test]
fn test_config_error_creation() {
    let err: LoadAuthError = ConfigError::Invalid {
        field: "server_port",
        reason: "must not be 0".to_string(),
    }
    .into();
    assert!(matches!(err, LoadAuthError::Config { .. }));
    assert_eq!(
        err.to_string(),
        "Configuration error: Invalid configuration value server_port: must not be 0"
    );
}

#[test]
fn test_config_error_with_source() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let err = LoadAuthError::config_with_source("failed to load config", io_err);

    assert!(matches!(err, LoadAuthError::Config { .. }));
    assert!(err.to_string().contains("failed to load config"));
    assert!(err.source().is_some());
}

#[test]
fn test_codec_error_conversion_keeps_detail() {
    let err: LoadAuthError = CodecError::Truncated {
        field: "fileLength",
        needed: 4,
        available: 2,
    }
    .into();

    assert!(matches!(err, LoadAuthError::Codec { .. }));
    assert!(err.to_string().contains("fileLength"));
    assert!(err.source().is_some());
}

#[test]
fn test_tftp_io_error_maps_to_network() {
    let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
    let err: LoadAuthError = TftpError::Io(io_err).into();
    assert!(matches!(err, LoadAuthError::Network { .. }));

    let err: LoadAuthError = TftpError::UnknownOpcode(9).into();
    assert!(matches!(err, LoadAuthError::Tftp { .. }));
}

#[test]
fn test_context_wraps_and_exposes_remote_message() {
    let result: std::result::Result<(), LoadAuthError> =
        Err(LoadAuthError::remote_transfer(0, "WAIT:3"));

    let err = result.context("fetching CERT.BIN").unwrap_err();
    assert!(matches!(err, LoadAuthError::Context { .. }));
    assert!(err.to_string().starts_with("fetching CERT.BIN"));
    assert_eq!(err.remote_message(), Some((0, "WAIT:3")));
}

#[test]
fn test_auto_conversion_from_toml_error() {
    let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
    let err: LoadAuthError = toml_err.into();
    assert!(err.to_string().contains("TOML parse failed"));

    let toml_err = toml::from_str::<toml::Value>("x = = 1").unwrap_err();
    let err: LoadAuthError = ConfigError::Parse(toml_err).into();
    assert!(matches!(err, LoadAuthError::Config { .. }));
}

#[test]
fn test_timeout_and_transient_classification() {
    let err = LoadAuthError::timeout("waiting for status", Duration::from_millis(1500));
    assert_eq!(err.to_string(), "Timeout after 1500ms: waiting for status");
    assert!(err.is_transient());
    assert!(!LoadAuthError::business("empty load list").is_transient());
}

#[test]
fn test_status_errors_render_hex_codes() {
    let err = LoadAuthError::Aborted {
        status_code: 0x1004,
    };
    assert_eq!(err.to_string(), "Authentication aborted with status 0x1004");

    let err = LoadAuthError::InitializationRefused {
        status_code: 0x1000,
    };
    assert!(err.to_string().ends_with("0x1000"));
}

#[test]
fn test_ensure_macros_return_early() {
    fn check(value: u16) -> crate::error::Result<u16> {
        crate::ensure_business!(value != 0, "value must be non-zero");
        crate::ensure_state!(value < 10, "value {} out of range", value);
        Ok(value)
    }

    assert!(check(3).is_ok());
    assert!(matches!(check(0), Err(LoadAuthError::Business { .. })));
    assert!(matches!(check(12), Err(LoadAuthError::InvalidState { .. })));
}
