//! TFTP client used for `.LAI`/`.LAR` exchanges and certificate fetches.

use super::packet::Packet;
use super::transfer::Transfer;
use crate::config::TftpConfig;
use crate::error::{LoadAuthError, Result};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Octet mode client bound to one remote server
#[derive(Debug, Clone)]
pub struct TftpClient {
    server: SocketAddr,
    config: TftpConfig,
}

impl TftpClient {
    /// Client for the server at `server`
    #[must_use]
    pub const fn new(server: SocketAddr, config: TftpConfig) -> Self {
        Self { server, config }
    }

    /// Address requests are sent to
    #[must_use]
    pub const fn server(&self) -> SocketAddr {
        self.server
    }

    async fn open(&self, file_name: &str) -> Result<Transfer> {
        let local: SocketAddr = if self.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| LoadAuthError::network_with_source("cannot bind TFTP client socket", e))?;
        Ok(Transfer::new(
            socket,
            None,
            self.config.clone(),
            file_name,
            LogComponent::TftpClient,
        ))
    }

    /// Read `file_name` from the server, at most `tftp.max_transfer_size` bytes
    pub async fn fetch(&self, file_name: &str) -> Result<Bytes> {
        self.fetch_limited(file_name, self.config.max_transfer_size)
            .await
    }

    /// Read `file_name` with an explicit size limit
    pub async fn fetch_limited(&self, file_name: &str, limit: usize) -> Result<Bytes> {
        let mut transfer = self.open(file_name).await?;
        let request = Packet::read_request(file_name);
        transfer.send_packet(request.clone(), self.server).await?;

        let data = transfer.receive_blocks((request, self.server), limit).await?;
        ldebug!(
            file_name,
            LogStage::Transfer,
            LogComponent::TftpClient,
            "fetch",
            "File received",
            server = %self.server,
            size = data.len()
        );
        Ok(data)
    }

    /// Write `data` to the server as `file_name`
    pub async fn send(&self, file_name: &str, data: &[u8]) -> Result<()> {
        let mut transfer = self.open(file_name).await?;
        let request = Packet::write_request(file_name);
        transfer.send_packet(request.clone(), self.server).await?;

        transfer.await_ack(0, (request, self.server)).await?;
        transfer.send_blocks(data).await?;
        ldebug!(
            file_name,
            LogStage::Transfer,
            LogComponent::TftpClient,
            "send",
            "File sent",
            server = %self.server,
            size = data.len()
        );
        Ok(())
    }
}
