//! A "prelude" for easily importing the most common error handling items.

pub use super::codec::CodecError;
pub use super::config::ConfigError;
pub use super::tftp::TftpError;
pub use super::{
    CodecResult, ConfigResult, Context, LoadAuthError, Result, TftpResult,
};

pub use crate::{business_error, ensure_business, ensure_state};
