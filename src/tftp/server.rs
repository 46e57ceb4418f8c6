//! # TFTP server
//!
//! Listens on one port and runs every request in its own session task on a
//! fresh socket. What to serve and what to accept is decided by a
//! [`TransferHandler`].

use super::packet::{Packet, TftpCodec, TftpErrorCode, ensure_octet_mode};
use super::transfer::Transfer;
use crate::config::TftpConfig;
use crate::error::{LoadAuthError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::udp::UdpFramed;

/// Whether the peer reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Remote peer reads from us
    Read,
    /// Remote peer writes to us
    Write,
}

/// One accepted request
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub id: u64,
    pub peer: SocketAddr,
    pub file_name: String,
    pub direction: TransferDirection,
}

impl fmt::Display for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tftp-{}:{}", self.id, self.file_name)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Rejected,
    Failed(String),
}

/// ERROR packet sent instead of serving or accepting a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRejection {
    pub code: u16,
    pub message: String,
}

impl TransferRejection {
    /// Rejection with an explicit code
    #[must_use]
    pub fn new(code: TftpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    /// FILE NOT FOUND for `file_name`
    #[must_use]
    pub fn not_found(file_name: &str) -> Self {
        Self::new(TftpErrorCode::FileNotFound, format!("File not found: {file_name}"))
    }

    /// ACCESS VIOLATION with a message
    #[must_use]
    pub fn access_violation(message: impl Into<String>) -> Self {
        Self::new(TftpErrorCode::AccessViolation, message)
    }

    /// Code 0 carrying a protocol control message such as `WAIT:1`
    #[must_use]
    pub fn control(message: impl Into<String>) -> Self {
        Self::new(TftpErrorCode::NotDefined, message)
    }
}

/// Server side hooks
#[async_trait]
pub trait TransferHandler: Send + Sync + 'static {
    async fn session_started(&self, _session: &TransferSession) {}

    /// Contents to serve, or the rejection to send
    async fn open_read(&self, session: &TransferSession) -> std::result::Result<Bytes, TransferRejection>;

    /// Accept or reject an incoming file
    async fn open_write(&self, session: &TransferSession) -> std::result::Result<(), TransferRejection>;

    /// Whole file received and acknowledged
    async fn write_completed(&self, session: &TransferSession, data: Bytes) -> Result<()>;

    async fn session_finished(&self, _session: &TransferSession, _outcome: &SessionOutcome) {}
}

/// Entry point for binding a server
pub struct TftpServer;

impl TftpServer {
    /// Bind `addr` (port 0 picks an ephemeral port) and start serving
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn TransferHandler>,
        config: TftpConfig,
    ) -> Result<TftpServerHandle> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            LoadAuthError::network_with_source(format!("cannot bind TFTP server on {addr}"), e)
        })?;
        let local_addr = socket.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(accept_loop(socket, handler, config, shutdown_rx));

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::TftpServer,
            "bind",
            "TFTP server listening",
            local_addr = %local_addr
        );

        Ok(TftpServerHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Running server; dropping it stops the accept loop
pub struct TftpServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TftpServerHandle {
    /// Bound address
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, cancel running sessions and wait for the loop to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                lwarn!(
                    "system",
                    LogStage::Shutdown,
                    LogComponent::TftpServer,
                    "shutdown",
                    "TFTP accept loop ended abnormally",
                    error = %e
                );
            }
        }
    }
}

impl Drop for TftpServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn accept_loop(
    socket: UdpSocket,
    handler: Arc<dyn TransferHandler>,
    config: TftpConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let local_ip = socket.local_addr().map(|addr| addr.ip()).ok();
    let mut framed = UdpFramed::new(socket, TftpCodec);
    let mut sessions = JoinSet::new();
    let next_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            received = framed.next() => {
                let (packet, peer) = match received {
                    Some(Ok(received)) => received,
                    Some(Err(e)) => {
                        ldebug!(
                            "system",
                            LogStage::Transfer,
                            LogComponent::TftpServer,
                            "accept",
                            "Dropping malformed request",
                            error = %e
                        );
                        continue;
                    }
                    None => break,
                };

                let (file_name, mode, direction) = match packet {
                    Packet::Rrq { file_name, mode } => (file_name, mode, TransferDirection::Read),
                    Packet::Wrq { file_name, mode } => (file_name, mode, TransferDirection::Write),
                    other => {
                        let reply = Packet::error(TftpErrorCode::IllegalOperation, format!("Unexpected {}", other.kind()));
                        let _ = framed.send((reply, peer)).await;
                        continue;
                    }
                };

                let session = TransferSession {
                    id: next_id.fetch_add(1, Ordering::Relaxed),
                    peer,
                    file_name,
                    direction,
                };
                let handler = Arc::clone(&handler);
                let config = config.clone();
                sessions.spawn(async move {
                    run_session(session, mode, local_ip, handler, config).await;
                });
            }
        }
    }

    sessions.abort_all();
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::TftpServer,
        "accept_loop",
        "TFTP server stopped"
    );
}

async fn run_session(
    session: TransferSession,
    mode: String,
    local_ip: Option<std::net::IpAddr>,
    handler: Arc<dyn TransferHandler>,
    config: TftpConfig,
) {
    let bind_ip = local_ip.unwrap_or_else(|| match session.peer {
        SocketAddr::V4(_) => std::net::Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => std::net::Ipv6Addr::UNSPECIFIED.into(),
    });
    let socket = match UdpSocket::bind((bind_ip, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            lwarn!(
                session,
                LogStage::Transfer,
                LogComponent::TftpServer,
                "session",
                "Cannot open session socket",
                error = %e
            );
            return;
        }
    };
    let mut transfer = Transfer::new(
        socket,
        Some(session.peer),
        config.clone(),
        session.to_string(),
        LogComponent::TftpServer,
    );

    handler.session_started(&session).await;
    let outcome = match ensure_octet_mode(&mode) {
        Ok(()) => match session.direction {
            TransferDirection::Read => serve_read(&session, &mut transfer, handler.as_ref()).await,
            TransferDirection::Write => {
                serve_write(&session, &mut transfer, handler.as_ref(), config.max_transfer_size).await
            }
        },
        Err(e) => {
            transfer
                .send_error(TftpErrorCode::IllegalOperation, &e.to_string())
                .await;
            SessionOutcome::Rejected
        }
    };

    ldebug!(
        session,
        LogStage::Transfer,
        LogComponent::TftpServer,
        "session",
        "Session finished",
        peer = %session.peer,
        outcome = ?outcome
    );
    handler.session_finished(&session, &outcome).await;
}

async fn serve_read(
    session: &TransferSession,
    transfer: &mut Transfer,
    handler: &dyn TransferHandler,
) -> SessionOutcome {
    let data = match handler.open_read(session).await {
        Ok(data) => data,
        Err(rejection) => {
            send_rejection(transfer, session, &rejection).await;
            return SessionOutcome::Rejected;
        }
    };
    match transfer.send_blocks(&data).await {
        Ok(()) => SessionOutcome::Completed,
        Err(e) => SessionOutcome::Failed(e.to_string()),
    }
}

async fn serve_write(
    session: &TransferSession,
    transfer: &mut Transfer,
    handler: &dyn TransferHandler,
    limit: usize,
) -> SessionOutcome {
    if let Err(rejection) = handler.open_write(session).await {
        send_rejection(transfer, session, &rejection).await;
        return SessionOutcome::Rejected;
    }

    let ack = Packet::Ack { block: 0 };
    if let Err(e) = transfer.send_packet(ack.clone(), session.peer).await {
        return SessionOutcome::Failed(e.to_string());
    }
    let data = match transfer.receive_blocks((ack, session.peer), limit).await {
        Ok(data) => data,
        Err(e) => return SessionOutcome::Failed(e.to_string()),
    };

    match handler.write_completed(session, data).await {
        Ok(()) => SessionOutcome::Completed,
        Err(e) => {
            lwarn!(
                session,
                LogStage::Transfer,
                LogComponent::TftpServer,
                "write_completed",
                "Received file was not processed",
                error = %e
            );
            SessionOutcome::Failed(e.to_string())
        }
    }
}

async fn send_rejection(
    transfer: &mut Transfer,
    session: &TransferSession,
    rejection: &TransferRejection,
) {
    ldebug!(
        session,
        LogStage::Transfer,
        LogComponent::TftpServer,
        "reject",
        "Request rejected",
        code = rejection.code,
        message = %rejection.message
    );
    if let Err(e) = transfer
        .send_packet(
            Packet::Error {
                code: rejection.code,
                message: rejection.message.clone(),
            },
            session.peer,
        )
        .await
    {
        lwarn!(
            session,
            LogStage::Transfer,
            LogComponent::TftpServer,
            "reject",
            "Cannot deliver rejection",
            error = %e
        );
    }
}
