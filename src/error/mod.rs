//! The unified error handling system for the crate.

// 1. Core Types
pub use types::LoadAuthError;

/// A unified `Result` type for the entire crate.
///
/// All functions that can fail should return this type.
pub type Result<T> = std::result::Result<T, LoadAuthError>;

// 2. Domain-specific Result aliases
/// Result of the file codecs
pub type CodecResult<T> = std::result::Result<T, CodecError>;
/// Result of configuration loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
/// Result of the TFTP packet layer
pub type TftpResult<T> = std::result::Result<T, TftpError>;

// 3. Module declarations
pub mod codec;
pub mod config;
pub mod macros;
pub mod prelude;
pub mod tftp;
pub mod types;

pub use codec::CodecError;
pub use config::ConfigError;
pub use tftp::TftpError;

// 4. Context Trait for adding context to errors.
/// Attach a message to an error on its way up
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<LoadAuthError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => {
                let context_message = context().to_string();
                Err(LoadAuthError::Context {
                    context: context_message,
                    source: Box::new(error.into()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests;
