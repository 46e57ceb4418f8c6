//! # Authentication operations
//!
//! The two parties of a load authentication:
//!
//! - [`DataLoader`] runs a TFTP server for certificates and status files and
//!   drives the exchange from the ground side.
//! - [`TargetHardware`] answers the initialization, fetches the certificates
//!   and reports progress through `.LAS` files.
//!
//! Both sides share the constants, abort sources and the control messages
//! carried in TFTP ERROR packets.

mod data_loader;
mod target_hardware;
mod target_server;

pub use data_loader::{DataLoader, DataLoaderHooks, DefaultDataLoaderHooks, LoadEntry};
pub use target_hardware::{
    DefaultTargetHardwareHooks, HeaderSnapshot, TargetHardware, TargetHardwareHooks, TargetSnapshot,
    TargetState,
};
pub use target_server::TargetServer;

use crate::error::prelude::*;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Extension of the initialization file
pub const INITIALIZATION_FILE_EXTENSION: &str = ".LAI";
/// Extension of the request file
pub const REQUEST_FILE_EXTENSION: &str = ".LAR";
/// Extension of the status file
pub const STATUS_FILE_EXTENSION: &str = ".LAS";

/// Well-known port of the target hardware TFTP server
pub const DEFAULT_TFTP_PORT: u16 = 59;
/// Per-packet TFTP timeout
pub const DEFAULT_TFTP_TIMEOUT: Duration = Duration::from_secs(2);
/// Longest silence the data loader accepts from the target
pub const DEFAULT_DLP_TIMEOUT: Duration = Duration::from_secs(13);
/// Seconds a target is told to wait for a missing certificate
pub const DEFAULT_WAIT_TIME: u16 = 1;
/// Attempts per transfer before giving up
pub const MAX_DLP_TRIES: u8 = 2;
/// Largest certificate or request accepted, in bytes
pub const MAX_CERTIFICATE_BUFFER_SIZE: usize = 10 * 1024;
/// Interval between two status uploads
pub const STATUS_PERIOD: Duration = Duration::from_millis(1000);

const ABORT_PREFIX: &str = "ABORT";
const WAIT_PREFIX: &str = "WAIT";
const DELIMITER: char = ':';

/// Who asked to stop an authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortSource {
    TargetHardware,
    DataLoader,
    Operator,
}

impl AbortSource {
    /// Raw value; `0` is reserved for "no abort"
    pub const NONE: u16 = 0;

    /// Status code reported for this source
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::TargetHardware => 0x1003,
            Self::DataLoader => 0x1004,
            Self::Operator => 0x1005,
        }
    }

    /// `None` for anything but the three abort codes
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x1003 => Some(Self::TargetHardware),
            0x1004 => Some(Self::DataLoader),
            0x1005 => Some(Self::Operator),
            _ => None,
        }
    }
}

impl TryFrom<u16> for AbortSource {
    type Error = LoadAuthError;

    fn try_from(code: u16) -> Result<Self> {
        Self::from_code(code)
            .ok_or_else(|| LoadAuthError::business(format!("unknown abort source 0x{code:04x}")))
    }
}

impl fmt::Display for AbortSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TargetHardware => "target_hardware",
            Self::DataLoader => "data_loader",
            Self::Operator => "operator",
        };
        write!(f, "{name}")
    }
}

/// Side-channel message carried by a TFTP ERROR packet with code 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// `ABORT:<hex source>`
    Abort(u16),
    /// `WAIT:<seconds>`
    Wait(u16),
}

impl ControlMessage {
    /// Find a control message inside an ERROR packet text.
    ///
    /// The prefix may appear anywhere in the message; the value runs to the
    /// end of it.
    #[must_use]
    pub fn parse(message: &str) -> Option<Self> {
        let value_after = |prefix: &str| {
            let marker = format!("{prefix}{DELIMITER}");
            message
                .find(&marker)
                .map(|pos| message[pos + marker.len()..].trim())
        };

        if let Some(value) = value_after(ABORT_PREFIX) {
            return u16::from_str_radix(value, 16).ok().map(Self::Abort);
        }
        if let Some(value) = value_after(WAIT_PREFIX) {
            return value.parse().ok().map(Self::Wait);
        }
        None
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort(source) => write!(f, "{ABORT_PREFIX}{DELIMITER}{source:x}"),
            Self::Wait(seconds) => write!(f, "{WAIT_PREFIX}{DELIMITER}{seconds}"),
        }
    }
}

/// Events delivered by the transport to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierEvent {
    /// A TFTP write session finished and its data was handed over
    TftpSectionClosed,
    Unknown,
}

/// Common surface of both parties
#[async_trait]
pub trait AuthenticationBase: Send + Sync {
    /// Ask the running authentication to stop on behalf of `source`
    async fn abort(&self, source: u16) -> Result<()>;
}

/// Receives transport events
#[async_trait]
pub trait NotifierAuthentication: Send + Sync {
    async fn notify(&self, event: NotifierEvent) -> Result<()>;
}

/// Base name shared by all files of one authentication: the file name without
/// directories and without its extension
#[must_use]
pub fn base_file_name(file_name: &str) -> &str {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}
