//! # Load authentication
//!
//! Data loader and target hardware sides of an ARINC 615A-style load
//! authentication: `.LAI`/`.LAR`/`.LAS` file codecs, a TFTP transport and
//! the two protocol state machines.

pub mod config;
pub mod error;
pub mod files;
pub mod logging;
pub mod operations;
pub mod tftp;

#[doc(hidden)]
pub use tracing as __tracing;

// Re-export commonly used types
pub use config::AuthConfig;
pub use error::{LoadAuthError, Result};
pub use operations::{AbortSource, DataLoader, LoadEntry, TargetHardware, TargetServer, TargetState};
