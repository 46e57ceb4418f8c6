//! # Configuration structures

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// TFTP transport settings
    pub tftp: TftpConfig,
    /// Data loader side
    pub data_loader: DataLoaderConfig,
    /// Target hardware side
    pub target_hardware: TargetHardwareConfig,
}

/// TFTP transport settings shared by both sides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TftpConfig {
    /// Per packet timeout (milliseconds)
    pub timeout_ms: u64,
    /// Retransmissions before a transfer gives up
    pub retransmits: u32,
    /// Largest accepted transfer (bytes)
    pub max_transfer_size: usize,
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            retransmits: 3,
            max_transfer_size: 10 * 1024,
        }
    }
}

impl TftpConfig {
    /// Per-packet wait before retransmitting
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == 0 {
            return Err(invalid("tftp.timeout_ms", "must be greater than 0"));
        }
        if self.max_transfer_size == 0 {
            return Err(invalid("tftp.max_transfer_size", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Data loader settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataLoaderConfig {
    /// Local TFTP server port (0 picks an ephemeral port)
    pub server_port: u16,
    /// TFTP server port of the target hardware
    pub target_port: u16,
    /// Directory certificates are served from
    pub load_directory: PathBuf,
    /// Inactivity timeout (milliseconds)
    pub dlp_timeout_ms: u64,
    /// Wait time announced when a certificate is missing (seconds)
    pub default_wait_seconds: u16,
    /// Attempts for LAI fetch and LAR upload
    pub max_tries: u32,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            server_port: 59,
            target_port: 59,
            load_directory: PathBuf::from("."),
            dlp_timeout_ms: 13_000,
            default_wait_seconds: 1,
            max_tries: 2,
        }
    }
}

impl DataLoaderConfig {
    /// Longest silence tolerated from the target
    #[must_use]
    pub const fn dlp_timeout(&self) -> Duration {
        Duration::from_millis(self.dlp_timeout_ms)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_port == 0 {
            return Err(invalid("data_loader.target_port", "must be greater than 0"));
        }
        if self.dlp_timeout_ms == 0 {
            return Err(invalid("data_loader.dlp_timeout_ms", "must be greater than 0"));
        }
        if self.max_tries == 0 {
            return Err(invalid("data_loader.max_tries", "must be greater than 0"));
        }
        if self.load_directory.as_os_str().is_empty() {
            return Err(invalid("data_loader.load_directory", "must not be empty"));
        }
        Ok(())
    }
}

/// Target hardware settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetHardwareConfig {
    /// Local TFTP server port (0 picks an ephemeral port)
    pub server_port: u16,
    /// Data loader address, status files and certificate reads go there
    pub data_loader_ip: IpAddr,
    /// TFTP server port of the data loader
    pub data_loader_port: u16,
    /// Interval between status uploads (milliseconds)
    pub status_period_ms: u64,
    /// Consecutive failures tolerated for status uploads and certificate reads
    pub max_tries: u32,
    /// Largest accepted certificate or request file (bytes)
    pub max_certificate_size: usize,
}

impl Default for TargetHardwareConfig {
    fn default() -> Self {
        Self {
            server_port: 59,
            data_loader_ip: IpAddr::from([127, 0, 0, 1]),
            data_loader_port: 59,
            status_period_ms: 1000,
            max_tries: 2,
            max_certificate_size: 10 * 1024,
        }
    }
}

impl TargetHardwareConfig {
    /// Interval between two status uploads
    #[must_use]
    pub const fn status_period(&self) -> Duration {
        Duration::from_millis(self.status_period_ms)
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_loader_port == 0 {
            return Err(invalid(
                "target_hardware.data_loader_port",
                "must be greater than 0",
            ));
        }
        if self.status_period_ms == 0 {
            return Err(invalid(
                "target_hardware.status_period_ms",
                "must be greater than 0",
            ));
        }
        if self.max_tries == 0 {
            return Err(invalid("target_hardware.max_tries", "must be greater than 0"));
        }
        if self.max_certificate_size == 0 {
            return Err(invalid(
                "target_hardware.max_certificate_size",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl AuthConfig {
    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.tftp.validate()?;
        self.data_loader.validate()?;
        self.target_hardware.validate()
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
