use thiserror::Error;

use super::LoadAuthError;

/// Packet level TFTP failures
#[derive(Debug, Error)]
pub enum TftpError {
    #[error("Packet too short: {0} bytes")]
    ShortPacket(usize),

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u16),

    #[error("Malformed {0} packet")]
    Malformed(&'static str),

    #[error("Unsupported transfer mode: {0}")]
    UnsupportedMode(String),

    #[error("Unexpected {0} packet")]
    Unexpected(&'static str),

    #[error("Transfer exceeds {limit} bytes")]
    SizeExceeded { limit: usize },

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TftpError> for LoadAuthError {
    fn from(err: TftpError) -> Self {
        match err {
            TftpError::Io(source) => Self::network_with_source("TFTP socket failure", source),
            other => Self::tftp_with_source(other.to_string(), other),
        }
    }
}
