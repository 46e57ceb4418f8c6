//! TFTP client and server talking over loopback.

use async_trait::async_trait;
use bytes::Bytes;
use load_authentication::config::TftpConfig;
use load_authentication::tftp::{
    SessionOutcome, TftpClient, TftpErrorCode, TftpServer, TftpServerHandle, TransferHandler,
    TransferRejection, TransferSession,
};
use load_authentication::{LoadAuthError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Serves a fixed set of files and records every upload
struct MemoryHandler {
    files: HashMap<String, Bytes>,
    uploads: Mutex<Vec<(String, Bytes)>>,
    outcomes: mpsc::UnboundedSender<SessionOutcome>,
}

#[async_trait]
impl TransferHandler for MemoryHandler {
    async fn open_read(&self, session: &TransferSession) -> std::result::Result<Bytes, TransferRejection> {
        if session.file_name == "busy.bin" {
            return Err(TransferRejection::control("WAIT:2"));
        }
        self.files
            .get(&session.file_name)
            .cloned()
            .ok_or_else(|| TransferRejection::not_found(&session.file_name))
    }

    async fn open_write(&self, session: &TransferSession) -> std::result::Result<(), TransferRejection> {
        if session.file_name.ends_with(".RO") {
            return Err(TransferRejection::access_violation("read only"));
        }
        Ok(())
    }

    async fn write_completed(&self, session: &TransferSession, data: Bytes) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((session.file_name.clone(), data));
        Ok(())
    }

    async fn session_finished(&self, _session: &TransferSession, outcome: &SessionOutcome) {
        let _ = self.outcomes.send(outcome.clone());
    }
}

fn config() -> TftpConfig {
    TftpConfig {
        timeout_ms: 300,
        retransmits: 2,
        ..TftpConfig::default()
    }
}

fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
}

async fn start(
    files: &[(&str, Bytes)],
) -> (
    TftpServerHandle,
    TftpClient,
    Arc<MemoryHandler>,
    mpsc::UnboundedReceiver<SessionOutcome>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Arc::new(MemoryHandler {
        files: files
            .iter()
            .map(|(name, data)| ((*name).to_string(), data.clone()))
            .collect(),
        uploads: Mutex::new(Vec::new()),
        outcomes: tx,
    });
    let server = TftpServer::bind("127.0.0.1:0".parse().unwrap(), handler.clone(), config())
        .await
        .unwrap();
    let client = TftpClient::new(server.local_addr(), config());
    (server, client, handler, rx)
}

#[tokio::test]
async fn fetch_spans_multiple_blocks() {
    let data = payload(1500);
    let (server, client, _handler, _rx) = start(&[("cert.bin", data.clone())]).await;

    assert_eq!(client.fetch("cert.bin").await.unwrap(), data);
    server.shutdown().await;
}

#[tokio::test]
async fn exact_block_multiple_ends_with_empty_block() {
    let data = payload(1024);
    let empty = Bytes::new();
    let (server, client, _handler, _rx) =
        start(&[("two_blocks.bin", data.clone()), ("empty.bin", empty)]).await;

    assert_eq!(client.fetch("two_blocks.bin").await.unwrap(), data);
    assert!(client.fetch("empty.bin").await.unwrap().is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn upload_reaches_the_handler() {
    let (server, client, handler, mut rx) = start(&[]).await;
    let data = payload(700);

    client.send("TH_1.LAS", &data).await.unwrap();
    assert_eq!(rx.recv().await, Some(SessionOutcome::Completed));

    let uploads = handler.uploads.lock().unwrap().clone();
    assert_eq!(uploads, vec![("TH_1.LAS".to_string(), data)]);
    server.shutdown().await;
}

#[tokio::test]
async fn rejections_carry_code_and_message() {
    let (server, client, _handler, mut rx) = start(&[]).await;

    let err = client.fetch("missing.bin").await.unwrap_err();
    assert_eq!(
        err.remote_message(),
        Some((TftpErrorCode::FileNotFound.code(), "File not found: missing.bin"))
    );
    assert_eq!(rx.recv().await, Some(SessionOutcome::Rejected));

    let err = client.fetch("busy.bin").await.unwrap_err();
    assert_eq!(err.remote_message(), Some((0, "WAIT:2")));

    let err = client.send("config.RO", b"data").await.unwrap_err();
    assert!(matches!(err, LoadAuthError::RemoteTransfer { code: 2, .. }));
    server.shutdown().await;
}

#[tokio::test]
async fn fetch_limit_is_enforced() {
    let (server, client, _handler, _rx) = start(&[("big.bin", payload(4096))]).await;

    let err = client.fetch_limited("big.bin", 1000).await.unwrap_err();
    assert!(matches!(err, LoadAuthError::Tftp { .. }));
    server.shutdown().await;
}

#[tokio::test]
async fn netascii_requests_are_refused() {
    let (server, _client, _handler, mut rx) = start(&[("cert.bin", payload(10))]).await;
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"\x00\x01cert.bin\x00netascii\x00", server.local_addr())
        .await
        .unwrap();

    let mut buf = [0u8; 600];
    let (len, _) = tokio::time::timeout(std::time::Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..4], &[0x00, 0x05, 0x00, 0x04]);
    let message = String::from_utf8_lossy(&buf[4..len]);
    assert!(message.contains("Unsupported transfer mode: netascii"));
    assert_eq!(rx.recv().await, Some(SessionOutcome::Rejected));
    server.shutdown().await;
}

#[tokio::test]
async fn silent_server_times_out() {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client = TftpClient::new(socket.local_addr().unwrap(), config());

    let err = client.fetch("anything").await.unwrap_err();
    assert!(matches!(err, LoadAuthError::Timeout { .. }));
    assert!(err.is_transient());
}
