//! # Error type definitions

use thiserror::Error;

/// Main error type of the crate
#[derive(Debug, Error)]
pub enum LoadAuthError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Binary or JSON file format errors
    #[error("File codec error: {message}")]
    Codec {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Socket level errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// TFTP protocol errors raised locally
    #[error("TFTP error: {message}")]
    Tftp {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// ERROR packet received from the remote TFTP peer
    #[error("Remote transfer error {code}: {message}")]
    RemoteTransfer { code: u16, message: String },

    /// A transfer or a protocol phase ran out of time
    #[error("Timeout after {timeout_ms}ms: {message}")]
    Timeout { message: String, timeout_ms: u64 },

    /// The target hardware refused the initialization
    #[error("Initialization refused with status 0x{status_code:04x}")]
    InitializationRefused { status_code: u16 },

    /// The authentication ended with an abort status
    #[error("Authentication aborted with status 0x{status_code:04x}")]
    Aborted { status_code: u16 },

    /// Operation requested in a state that does not allow it
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Invalid input or business rule violation
    #[error("Business error: {message}")]
    Business { message: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Error wrapped with extra context
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<LoadAuthError>,
    },
}

impl LoadAuthError {
    /// Create a configuration error with a source
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a codec error with a source
    pub fn codec_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Codec {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a network error
    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with a source
    pub fn network_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a TFTP protocol error with a source
    pub fn tftp_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Tftp {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a remote transfer error from an ERROR packet
    pub fn remote_transfer<T: Into<String>>(code: u16, message: T) -> Self {
        Self::RemoteTransfer {
            code,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<T: Into<String>>(message: T, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            message: message.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state<T: Into<String>>(message: T) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a business error
    pub fn business<T: Into<String>>(message: T) -> Self {
        Self::Business {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with a source
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Remote ERROR packet payload, looking through any context wrappers
    #[must_use]
    pub fn remote_message(&self) -> Option<(u16, &str)> {
        match self {
            Self::RemoteTransfer { code, message } => Some((*code, message.as_str())),
            Self::Context { source, .. } => source.remote_message(),
            _ => None,
        }
    }

    /// Whether retrying the same operation may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network { .. } | Self::RemoteTransfer { .. }
        )
    }
}

// Automatic conversions for common error types
impl From<std::io::Error> for LoadAuthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "File operation failed".to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for LoadAuthError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML parse failed", err)
    }
}

impl From<serde_json::Error> for LoadAuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON processing failed".to_string(),
            source: err.into(),
        }
    }
}

impl From<hex::FromHexError> for LoadAuthError {
    fn from(err: hex::FromHexError) -> Self {
        Self::codec_with_source("Invalid hex string", err)
    }
}
