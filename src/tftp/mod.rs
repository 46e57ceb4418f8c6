//! # TFTP transport
//!
//! RFC 1350 in octet mode over `tokio` UDP sockets. Packets go through
//! [`TftpCodec`] and `tokio_util::udp::UdpFramed`.

mod client;
mod packet;
mod server;
mod transfer;

pub use client::TftpClient;
pub use packet::{BLOCK_SIZE, OCTET_MODE, Packet, TftpCodec, TftpErrorCode, ensure_octet_mode};
pub use server::{
    SessionOutcome, TftpServer, TftpServerHandle, TransferDirection, TransferHandler,
    TransferRejection, TransferSession,
};
