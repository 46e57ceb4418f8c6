//! Lock-step block exchange shared by the client and the server sessions.

use super::packet::{BLOCK_SIZE, Packet, TftpCodec, TftpErrorCode};
use crate::config::TftpConfig;
use crate::error::{LoadAuthError, Result, TftpError};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::udp::UdpFramed;

/// Packet to repeat when the peer stays silent
type Resend = (Packet, SocketAddr);

pub(crate) struct Transfer {
    framed: UdpFramed<TftpCodec>,
    peer: Option<SocketAddr>,
    config: TftpConfig,
    label: String,
    component: LogComponent,
}

impl Transfer {
    pub(crate) fn new(
        socket: UdpSocket,
        peer: Option<SocketAddr>,
        config: TftpConfig,
        label: impl Into<String>,
        component: LogComponent,
    ) -> Self {
        Self {
            framed: UdpFramed::new(socket, TftpCodec),
            peer,
            config,
            label: label.into(),
            component,
        }
    }

    pub(crate) fn peer(&self) -> Result<SocketAddr> {
        self.peer
            .ok_or_else(|| LoadAuthError::internal("transfer peer not established"))
    }

    pub(crate) async fn send_packet(&mut self, packet: Packet, to: SocketAddr) -> Result<()> {
        self.framed.send((packet, to)).await?;
        Ok(())
    }

    /// Tell the peer why the transfer stops; delivery is best effort
    pub(crate) async fn send_error(&mut self, code: TftpErrorCode, message: &str) {
        if let Some(peer) = self.peer {
            if let Err(e) = self.send_packet(Packet::error(code, message), peer).await {
                ldebug!(
                    self.label,
                    LogStage::Transfer,
                    self.component,
                    "send_error",
                    "Failed to deliver ERROR packet",
                    error = %e
                );
            }
        }
    }

    /// Next packet from the peer, retransmitting `resend` on every timeout.
    ///
    /// The first packet fixes the peer TID. ERROR packets become
    /// `LoadAuthError::RemoteTransfer`.
    async fn next_from_peer(&mut self, resend: &Resend) -> Result<Packet> {
        let mut retransmits = 0;
        loop {
            let received = match timeout(self.config.timeout(), self.framed.next()).await {
                Err(_) => {
                    retransmits += 1;
                    if retransmits > self.config.retransmits {
                        return Err(LoadAuthError::timeout(
                            format!("no answer to {} for {}", resend.0.kind(), self.label),
                            self.config.timeout(),
                        ));
                    }
                    self.send_packet(resend.0.clone(), resend.1).await?;
                    continue;
                }
                Ok(None) => return Err(LoadAuthError::network("TFTP socket closed")),
                Ok(Some(Err(TftpError::Io(e)))) => return Err(TftpError::Io(e).into()),
                Ok(Some(Err(e))) => {
                    ldebug!(
                        self.label,
                        LogStage::Transfer,
                        self.component,
                        "decode",
                        "Dropping malformed datagram",
                        error = %e
                    );
                    continue;
                }
                Ok(Some(Ok(received))) => received,
            };

            let (packet, from) = received;
            match self.peer {
                Some(peer) if peer != from => {
                    self.send_packet(
                        Packet::error(TftpErrorCode::UnknownTransferId, "Unknown transfer ID"),
                        from,
                    )
                    .await?;
                    continue;
                }
                None => self.peer = Some(from),
                Some(_) => {}
            }

            if let Packet::Error { code, message } = packet {
                return Err(LoadAuthError::remote_transfer(code, message));
            }
            return Ok(packet);
        }
    }

    async fn illegal(&mut self, packet: &Packet) -> LoadAuthError {
        self.send_error(TftpErrorCode::IllegalOperation, "Illegal TFTP operation")
            .await;
        TftpError::Unexpected(packet.kind()).into()
    }

    /// Wait for `ACK(block)`, ignoring duplicates of earlier blocks
    pub(crate) async fn await_ack(&mut self, block: u16, resend: Resend) -> Result<()> {
        loop {
            match self.next_from_peer(&resend).await? {
                Packet::Ack { block: acked } if acked == block => return Ok(()),
                Packet::Ack { .. } => {}
                other => return Err(self.illegal(&other).await),
            }
        }
    }

    /// Receive DATA blocks until a short one arrives, acknowledging each
    pub(crate) async fn receive_blocks(&mut self, first: Resend, limit: usize) -> Result<Bytes> {
        let mut received = BytesMut::new();
        let mut expected: u16 = 1;
        let mut resend = first;

        loop {
            match self.next_from_peer(&resend).await? {
                Packet::Data { block, data } if block == expected => {
                    if received.len() + data.len() > limit {
                        self.send_error(TftpErrorCode::DiskFull, "Transfer size limit exceeded")
                            .await;
                        return Err(TftpError::SizeExceeded { limit }.into());
                    }
                    received.extend_from_slice(&data);

                    let peer = self.peer()?;
                    let ack = Packet::Ack { block };
                    self.send_packet(ack.clone(), peer).await?;
                    resend = (ack, peer);
                    expected = expected.wrapping_add(1);

                    if data.len() < BLOCK_SIZE {
                        return Ok(received.freeze());
                    }
                }
                Packet::Data { block, .. } if expected > 1 && block == expected - 1 => {
                    // our ACK got lost
                    self.send_packet(resend.0.clone(), resend.1).await?;
                }
                Packet::Data { .. } => {}
                other => return Err(self.illegal(&other).await),
            }
        }
    }

    /// Send `data` as DATA blocks starting at block 1
    pub(crate) async fn send_blocks(&mut self, data: &[u8]) -> Result<()> {
        let peer = self.peer()?;
        let mut block: u16 = 1;
        let mut offset = 0;

        loop {
            let end = (offset + BLOCK_SIZE).min(data.len());
            let packet = Packet::Data {
                block,
                data: Bytes::copy_from_slice(&data[offset..end]),
            };
            self.send_packet(packet.clone(), peer).await?;
            self.await_ack(block, (packet, peer)).await?;

            if end - offset < BLOCK_SIZE {
                return Ok(());
            }
            offset = end;
            block = block.wrapping_add(1);
        }
    }
}
