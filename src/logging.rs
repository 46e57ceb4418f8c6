//! # Logging setup
//!
//! Subscriber initialization plus the structured `linfo!`-style macros used
//! across the crate. Every record carries the authentication session, the
//! protocol stage and the component that emitted it.

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Protocol stage a log record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Configuration,
    Initialization,
    Request,
    Status,
    Authentication,
    Transfer,
    Abort,
    Shutdown,
    Error,
}

impl LogStage {
    /// Name used in the `stage`/`component` log fields
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Configuration => "configuration",
            Self::Initialization => "initialization",
            Self::Request => "request",
            Self::Status => "status",
            Self::Authentication => "authentication",
            Self::Transfer => "transfer",
            Self::Abort => "abort",
            Self::Shutdown => "shutdown",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component that emitted a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    Config,
    TftpClient,
    TftpServer,
    DataLoader,
    TargetHardware,
}

impl LogComponent {
    /// Name used in the `stage`/`component` log fields
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::TftpClient => "tftp_client",
            Self::TftpServer => "tftp_server",
            Self::DataLoader => "data_loader",
            Self::TargetHardware => "target_hardware",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured info record: `linfo!(session, stage, component, operation, message, fields..)`
#[macro_export]
macro_rules! linfo {
    ($session:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::info!(
            session = %$session,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($field)*,)?
            "{}",
            $message
        )
    };
}

/// Structured debug record
#[macro_export]
macro_rules! ldebug {
    ($session:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::debug!(
            session = %$session,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($field)*,)?
            "{}",
            $message
        )
    };
}

/// Structured warning record
#[macro_export]
macro_rules! lwarn {
    ($session:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::warn!(
            session = %$session,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($field)*,)?
            "{}",
            $message
        )
    };
}

/// Structured error record
#[macro_export]
macro_rules! lerror {
    ($session:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        $crate::__tracing::error!(
            session = %$session,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($($field)*,)?
            "{}",
            $message
        )
    };
}

/// Default filter for a given base level
#[must_use]
pub fn default_filter(level: &str) -> String {
    format!("{level},load_authentication=debug")
}

/// Initialize the global subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", String::as_str);
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_includes_crate_directive() {
        assert_eq!(default_filter("warn"), "warn,load_authentication=debug");
    }

    #[test]
    fn stage_and_component_render_snake_case() {
        assert_eq!(LogStage::Initialization.to_string(), "initialization");
        assert_eq!(LogComponent::TargetHardware.to_string(), "target_hardware");
        assert_eq!(LogComponent::TftpServer.as_str(), "tftp_server");
    }
}
