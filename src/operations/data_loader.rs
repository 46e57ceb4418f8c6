//! # Data loader
//!
//! Ground side of a load authentication. The data loader:
//!
//! 1. reads `<id>_<position>.LAI` from the target hardware,
//! 2. serves certificates and collects `.LAS` status files on its own TFTP
//!    server,
//! 3. uploads `<id>_<position>.LAR` once the target reported ACCEPTED,
//! 4. waits for COMPLETED, an abort, or the DLP inactivity timeout.

use super::{
    AbortSource, AuthenticationBase, ControlMessage, INITIALIZATION_FILE_EXTENSION,
    REQUEST_FILE_EXTENSION, STATUS_FILE_EXTENSION,
};
use crate::config::{DataLoaderConfig, TftpConfig};
use crate::error::prelude::*;
use crate::files::{
    AuthenticationStatus, DEFAULT_PROTOCOL_VERSION, InitializationAuthenticationFile,
    InitializationStatus, LoadAuthenticationRequestFile, LoadAuthenticationRequestHeaderFile,
    LoadAuthenticationStatusFile, SerializableAuthentication,
};
use crate::logging::{LogComponent, LogStage};
use crate::tftp::{
    SessionOutcome, TftpClient, TftpServer, TransferDirection, TransferHandler, TransferRejection,
    TransferSession,
};
use crate::{ldebug, linfo, lwarn};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

/// One load to authenticate: the certificate file and its part number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEntry {
    pub file_name: String,
    pub part_number: String,
}

impl LoadEntry {
    /// Certificate file and its part number
    #[must_use]
    pub fn new(file_name: impl Into<String>, part_number: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            part_number: part_number.into(),
        }
    }
}

/// Application hooks called during an authentication
#[async_trait]
pub trait DataLoaderHooks: Send + Sync + 'static {
    /// JSON of the `.LAI` returned by the target hardware
    async fn authentication_initialization_response(&self, _json: &str) {}

    /// JSON of every `.LAS` received
    async fn authentication_information_status(&self, _json: &str) {}

    /// Last chance to transform a file before it is served
    async fn load_prepare(&self, _file_name: &str, contents: Bytes) -> Bytes {
        contents
    }

    /// Seconds the target should wait before asking again for a missing file
    async fn certificate_not_available(&self, _file_name: &str) -> Option<u16> {
        None
    }
}

/// Hooks that only log
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDataLoaderHooks;

impl DataLoaderHooks for DefaultDataLoaderHooks {}

#[derive(Debug, Default)]
struct AbortState {
    source: Option<AbortSource>,
    /// Flipped by every `.LAS` write while an abort is pending
    reject_next_status: bool,
}

/// What the server sessions report to the running authentication
#[derive(Debug)]
enum ServerEvent {
    SessionStarted,
    SessionFinished,
    Status(Box<LoadAuthenticationStatusFile>),
}

/// Ground side of a load authentication
pub struct DataLoader {
    config: DataLoaderConfig,
    tftp: TftpConfig,
    target_hardware_id: String,
    target_hardware_position: String,
    target_hardware_ip: Option<IpAddr>,
    load_list: Vec<LoadEntry>,
    hooks: Arc<dyn DataLoaderHooks>,
    abort: Arc<Mutex<AbortState>>,
}

impl DataLoader {
    /// Data loader with the default hooks
    #[must_use]
    pub fn new(config: DataLoaderConfig, tftp: TftpConfig) -> Self {
        Self {
            config,
            tftp,
            target_hardware_id: String::new(),
            target_hardware_position: String::new(),
            target_hardware_ip: None,
            load_list: Vec::new(),
            hooks: Arc::new(DefaultDataLoaderHooks),
            abort: Arc::new(Mutex::new(AbortState::default())),
        }
    }

    /// Replace the hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn DataLoaderHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Target identifier, first part of the base file name
    pub fn set_target_hardware_id(&mut self, id: impl Into<String>) {
        self.target_hardware_id = id.into();
    }

    /// Target position, second part of the base file name
    pub fn set_target_hardware_position(&mut self, position: impl Into<String>) {
        self.target_hardware_position = position.into();
    }

    /// Address of the target hardware
    pub fn set_target_hardware_ip(&mut self, ip: IpAddr) {
        self.target_hardware_ip = Some(ip);
    }

    /// Port of the local TFTP server the target hardware talks to
    pub fn set_data_loader_port(&mut self, port: u16) {
        self.config.server_port = port;
    }

    /// Port of the target hardware TFTP server
    pub fn set_target_hardware_port(&mut self, port: u16) {
        self.config.target_port = port;
    }

    /// Loads to authenticate; exactly one certificate per authentication
    pub fn set_load_list(&mut self, loads: Vec<LoadEntry>) -> Result<()> {
        ensure_business!(!loads.is_empty(), "load list must not be empty");
        ensure_business!(
            loads.len() == 1,
            "only one load per authentication is supported, got {}",
            loads.len()
        );
        for load in &loads {
            ensure_business!(
                !load.file_name.is_empty() && !load.part_number.is_empty(),
                "load entries need a file name and a part number"
            );
        }
        self.load_list = loads;
        Ok(())
    }

    /// Loads set for the next authentication
    #[must_use]
    pub fn load_list(&self) -> &[LoadEntry] {
        &self.load_list
    }

    /// Source of the pending abort, if any
    pub async fn abort_source(&self) -> Option<AbortSource> {
        self.abort.lock().await.source
    }

    fn base_file_name(&self) -> String {
        format!(
            "{}_{}",
            self.target_hardware_id, self.target_hardware_position
        )
    }

    /// Run one authentication against the configured target hardware.
    ///
    /// Returns `Ok(())` only when the target reports COMPLETED.
    pub async fn authenticate(&self) -> Result<()> {
        ensure_business!(
            !self.target_hardware_id.is_empty(),
            "target hardware id is not set"
        );
        ensure_business!(
            !self.target_hardware_position.is_empty(),
            "target hardware position is not set"
        );
        let Some(target_ip) = self.target_hardware_ip else {
            return Err(LoadAuthError::business("target hardware IP is not set"));
        };
        ensure_business!(!self.load_list.is_empty(), "load list is not set");

        *self.abort.lock().await = AbortState::default();

        let base = self.base_file_name();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(DataLoaderHandler {
            load_directory: self.config.load_directory.clone(),
            default_wait: self.config.default_wait_seconds,
            hooks: Arc::clone(&self.hooks),
            abort: Arc::clone(&self.abort),
            events: events_tx,
        });

        let bind_ip: IpAddr = if target_ip.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let server = TftpServer::bind(
            SocketAddr::new(bind_ip, self.config.server_port),
            handler,
            self.tftp.clone(),
        )
        .await?;

        linfo!(
            base,
            LogStage::Startup,
            LogComponent::DataLoader,
            "authenticate",
            "Authentication started",
            target = %target_ip,
            target_port = self.config.target_port,
            local_addr = %server.local_addr(),
            loads = self.load_list.len()
        );

        let client = TftpClient::new(
            SocketAddr::new(target_ip, self.config.target_port),
            self.tftp.clone(),
        );
        let result = self.exchange(&base, &client, &mut events_rx).await;
        server.shutdown().await;

        match &result {
            Ok(()) => linfo!(
                base,
                LogStage::Authentication,
                LogComponent::DataLoader,
                "authenticate",
                "Authentication completed"
            ),
            Err(e) => lwarn!(
                base,
                LogStage::Authentication,
                LogComponent::DataLoader,
                "authenticate",
                "Authentication failed",
                error = %e
            ),
        }
        result
    }

    async fn exchange(
        &self,
        base: &str,
        client: &TftpClient,
        events: &mut mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Result<()> {
        self.initialize(base, client).await?;

        let mut tracker = StatusTracker::default();
        loop {
            let status = self.next_status(base, events, &mut tracker).await?;
            match status {
                Some(AuthenticationStatus::Accepted) => break,
                Some(AuthenticationStatus::Completed) => {
                    return Err(LoadAuthError::invalid_state(
                        "target reported COMPLETED before accepting the authentication",
                    ));
                }
                Some(status) if status.is_abort() => {
                    return Err(LoadAuthError::Aborted {
                        status_code: status.code(),
                    });
                }
                _ => {}
            }
        }

        self.send_request(base, client).await?;

        loop {
            match self.next_status(base, events, &mut tracker).await? {
                Some(AuthenticationStatus::Completed) => return Ok(()),
                Some(status) if status.is_abort() => {
                    return Err(LoadAuthError::Aborted {
                        status_code: status.code(),
                    });
                }
                _ => {}
            }
        }
    }

    async fn initialize(&self, base: &str, client: &TftpClient) -> Result<()> {
        let file_name = format!("{base}{INITIALIZATION_FILE_EXTENSION}");
        let data = self
            .with_tries(base, "fetch_initialization", || client.fetch(&file_name))
            .await?;

        let response = InitializationAuthenticationFile::deserialize(&data)
            .with_context(|| format!("decoding {file_name}"))?;
        let json = response.serialize_json()?;
        self.hooks.authentication_initialization_response(&json).await;

        let status_code = response.operation_acceptance_status_code();
        linfo!(
            base,
            LogStage::Initialization,
            LogComponent::DataLoader,
            "initialize",
            "Initialization answered",
            status_code = status_code,
            key_length = response.cryptographic_key_length()
        );
        if InitializationStatus::from_code(status_code) != Some(InitializationStatus::Accepted) {
            return Err(LoadAuthError::InitializationRefused { status_code });
        }
        Ok(())
    }

    async fn send_request(&self, base: &str, client: &TftpClient) -> Result<()> {
        let file_name = format!("{base}{REQUEST_FILE_EXTENSION}");
        let mut request = LoadAuthenticationRequestFile::new(&file_name, DEFAULT_PROTOCOL_VERSION);
        for load in &self.load_list {
            request.add_header_file(LoadAuthenticationRequestHeaderFile::new(
                &load.file_name,
                &load.part_number,
            )?)?;
        }
        let data = request.to_bytes()?;

        self.with_tries(base, "send_request", || client.send(&file_name, &data))
            .await?;
        linfo!(
            base,
            LogStage::Request,
            LogComponent::DataLoader,
            "send_request",
            "Load authentication request sent",
            headers = request.number_of_header_files()
        );
        Ok(())
    }

    async fn with_tries<T, F, Fut>(&self, base: &str, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let tries = self.config.max_tries.max(1);
        let mut tried = 0;
        loop {
            tried += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if tried < tries && e.is_transient() => {
                    lwarn!(
                        base,
                        LogStage::Transfer,
                        LogComponent::DataLoader,
                        operation,
                        "Transfer failed, retrying",
                        attempt = tried,
                        error = %e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait for the next status file.
    ///
    /// `Ok(None)` is a status whose code is not a known one. Fails when the
    /// server stays idle for the whole DLP timeout.
    async fn next_status(
        &self,
        base: &str,
        events: &mut mpsc::UnboundedReceiver<ServerEvent>,
        tracker: &mut StatusTracker,
    ) -> Result<Option<AuthenticationStatus>> {
        let dlp_timeout = self.config.dlp_timeout();
        loop {
            let event = match timeout(dlp_timeout, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(LoadAuthError::internal("TFTP server stopped unexpectedly")),
                Err(_) if tracker.active_sessions > 0 => continue,
                Err(_) => {
                    return Err(LoadAuthError::timeout(
                        format!("no activity from target hardware for {base}"),
                        dlp_timeout,
                    ));
                }
            };

            match event {
                ServerEvent::SessionStarted => tracker.active_sessions += 1,
                ServerEvent::SessionFinished => {
                    tracker.active_sessions = tracker.active_sessions.saturating_sub(1);
                }
                ServerEvent::Status(status) => {
                    let json = status.serialize_json()?;
                    self.hooks.authentication_information_status(&json).await;

                    let code = status.authentication_operation_status_code();
                    ldebug!(
                        base,
                        LogStage::Status,
                        LogComponent::DataLoader,
                        "next_status",
                        "Status received",
                        status_code = code,
                        counter = status.counter(),
                        load_list_ratio = status.load_list_ratio()
                    );
                    return Ok(AuthenticationStatus::from_code(code));
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct StatusTracker {
    active_sessions: usize,
}

#[async_trait]
impl AuthenticationBase for DataLoader {
    async fn abort(&self, source: u16) -> Result<()> {
        let source = AbortSource::try_from(source)?;
        let mut state = self.abort.lock().await;
        state.source = Some(source);
        state.reject_next_status = true;
        linfo!(
            self.base_file_name(),
            LogStage::Abort,
            LogComponent::DataLoader,
            "abort",
            "Abort requested",
            source = %source
        );
        Ok(())
    }
}

/// Server side of the data loader
struct DataLoaderHandler {
    load_directory: PathBuf,
    default_wait: u16,
    hooks: Arc<dyn DataLoaderHooks>,
    abort: Arc<Mutex<AbortState>>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl DataLoaderHandler {
    /// Returns `Some(rejection)` while an abort is pending
    async fn abort_rejection(&self, session: &TransferSession) -> Option<TransferRejection> {
        let mut state = self.abort.lock().await;
        let source = state.source?;

        let is_status_upload = session.direction == TransferDirection::Write
            && session.file_name.contains(STATUS_FILE_EXTENSION);
        if !is_status_upload {
            return Some(TransferRejection::access_violation("Authentication aborted"));
        }

        state.reject_next_status = !state.reject_next_status;
        state
            .reject_next_status
            .then(|| TransferRejection::control(ControlMessage::Abort(source.code()).to_string()))
    }

    /// Path under the load directory, `None` when the name tries to leave it
    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let relative = Path::new(file_name);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.load_directory.join(relative))
    }

    fn emit(&self, event: ServerEvent) {
        // receiver gone means the authentication already ended
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl TransferHandler for DataLoaderHandler {
    async fn session_started(&self, _session: &TransferSession) {
        self.emit(ServerEvent::SessionStarted);
    }

    async fn open_read(&self, session: &TransferSession) -> std::result::Result<Bytes, TransferRejection> {
        if let Some(rejection) = self.abort_rejection(session).await {
            return Err(rejection);
        }

        let contents = match self.resolve(&session.file_name) {
            Some(path) => tokio::fs::read(&path).await.ok(),
            None => None,
        };
        let Some(contents) = contents else {
            let wait = self
                .hooks
                .certificate_not_available(&session.file_name)
                .await
                .unwrap_or(self.default_wait);
            linfo!(
                session,
                LogStage::Transfer,
                LogComponent::DataLoader,
                "open_read",
                "Certificate not available",
                wait_seconds = wait
            );
            return Err(TransferRejection::control(ControlMessage::Wait(wait).to_string()));
        };

        Ok(self
            .hooks
            .load_prepare(&session.file_name, Bytes::from(contents))
            .await)
    }

    async fn open_write(&self, session: &TransferSession) -> std::result::Result<(), TransferRejection> {
        match self.abort_rejection(session).await {
            Some(rejection) => Err(rejection),
            None => Ok(()),
        }
    }

    async fn write_completed(&self, session: &TransferSession, data: Bytes) -> Result<()> {
        if !session.file_name.ends_with(STATUS_FILE_EXTENSION) || data.is_empty() {
            ldebug!(
                session,
                LogStage::Transfer,
                LogComponent::DataLoader,
                "write_completed",
                "Ignoring upload",
                size = data.len()
            );
            return Ok(());
        }
        let status = LoadAuthenticationStatusFile::deserialize(&data)?;
        self.emit(ServerEvent::Status(Box::new(status)));
        Ok(())
    }

    async fn session_finished(&self, _session: &TransferSession, _outcome: &SessionOutcome) {
        self.emit(ServerEvent::SessionFinished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn loader() -> DataLoader {
        DataLoader::new(DataLoaderConfig::default(), TftpConfig::default())
    }

    fn handler(dir: &Path) -> (DataLoaderHandler, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = DataLoaderHandler {
            load_directory: dir.to_path_buf(),
            default_wait: 1,
            hooks: Arc::new(DefaultDataLoaderHooks),
            abort: Arc::new(Mutex::new(AbortState::default())),
            events: tx,
        };
        (handler, rx)
    }

    fn session(file_name: &str, direction: TransferDirection) -> TransferSession {
        TransferSession {
            id: 1,
            peer: "127.0.0.1:40000".parse().unwrap(),
            file_name: file_name.to_string(),
            direction,
        }
    }

    #[test]
    fn load_list_must_hold_exactly_one_load() {
        let mut dl = loader();
        assert!(dl.set_load_list(Vec::new()).is_err());
        assert!(
            dl.set_load_list(vec![LoadEntry::new("a.bin", "PN1"), LoadEntry::new("b.bin", "PN2")])
                .is_err()
        );
        assert!(dl.set_load_list(vec![LoadEntry::new("", "PN1")]).is_err());
        dl.set_load_list(vec![LoadEntry::new("cert.bin", "PN-001")]).unwrap();
        assert_eq!(dl.load_list().len(), 1);
    }

    #[tokio::test]
    async fn authenticate_requires_identity() {
        let mut dl = loader();
        assert!(matches!(dl.authenticate().await, Err(LoadAuthError::Business { .. })));

        dl.set_target_hardware_id("TH");
        dl.set_target_hardware_position("1");
        assert!(dl.authenticate().await.is_err());

        dl.set_target_hardware_ip(IpAddr::from([127, 0, 0, 1]));
        let err = dl.authenticate().await.unwrap_err();
        assert!(err.to_string().contains("load list"));
    }

    #[tokio::test]
    async fn only_transient_failures_are_retried() {
        let dl = loader();
        let attempts = AtomicUsize::new(0);
        let err = dl
            .with_tries("TH_1", "fetch", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LoadAuthError::timeout("no answer", Duration::from_millis(10)))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LoadAuthError::Timeout { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        attempts.store(0, Ordering::SeqCst);
        let err = dl
            .with_tries("TH_1", "fetch", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), LoadAuthError>(TftpError::SizeExceeded { limit: 10_240 }.into())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LoadAuthError::Tftp { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_abort_source_is_rejected() {
        let dl = loader();
        assert!(dl.abort(0x42).await.is_err());
        assert_eq!(dl.abort_source().await, None);

        dl.abort(AbortSource::Operator.code()).await.unwrap();
        assert_eq!(dl.abort_source().await, Some(AbortSource::Operator));
    }

    #[tokio::test]
    async fn missing_certificate_answers_wait() {
        let dir = TempDir::new().unwrap();
        let (handler, _rx) = handler(dir.path());
        let rejection = handler
            .open_read(&session("missing.bin", TransferDirection::Read))
            .await
            .unwrap_err();
        assert_eq!(rejection, TransferRejection::control("WAIT:1"));
    }

    #[tokio::test]
    async fn paths_outside_the_load_directory_are_not_served() {
        let dir = TempDir::new().unwrap();
        let (handler, _rx) = handler(dir.path());
        for name in ["../secret", "/etc/passwd"] {
            let rejection = handler
                .open_read(&session(name, TransferDirection::Read))
                .await
                .unwrap_err();
            assert_eq!(rejection.code, 0);
        }
    }

    #[tokio::test]
    async fn certificate_is_served_from_load_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cert.bin"), b"certificate").unwrap();
        let (handler, _rx) = handler(dir.path());
        let data = handler
            .open_read(&session("cert.bin", TransferDirection::Read))
            .await
            .unwrap();
        assert_eq!(&data[..], b"certificate");
    }

    #[tokio::test]
    async fn pending_abort_alternates_status_uploads() {
        let dir = TempDir::new().unwrap();
        let (handler, _rx) = handler(dir.path());
        {
            let mut state = handler.abort.lock().await;
            state.source = Some(AbortSource::DataLoader);
            state.reject_next_status = true;
        }

        let las = session("TH_1.LAS", TransferDirection::Write);
        assert!(handler.open_write(&las).await.is_ok());
        assert_eq!(
            handler.open_write(&las).await.unwrap_err(),
            TransferRejection::control("ABORT:1004")
        );
        assert!(handler.open_write(&las).await.is_ok());

        let other = session("TH_1.LAR", TransferDirection::Write);
        assert_eq!(handler.open_write(&other).await.unwrap_err().code, 2);
        let read = session("cert.bin", TransferDirection::Read);
        assert!(handler.open_read(&read).await.is_err());
    }

    #[tokio::test]
    async fn only_status_uploads_are_decoded() {
        let dir = TempDir::new().unwrap();
        let (handler, mut rx) = handler(dir.path());

        handler
            .write_completed(&session("notes.txt", TransferDirection::Write), Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        let status = LoadAuthenticationStatusFile::new("TH_1.LAS", DEFAULT_PROTOCOL_VERSION);
        handler
            .write_completed(&session("TH_1.LAS", TransferDirection::Write), status.to_bytes().unwrap())
            .await
            .unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Status(_))));

        let garbage = handler
            .write_completed(&session("TH_1.LAS", TransferDirection::Write), Bytes::from_static(b"\x00\x01"))
            .await;
        assert!(garbage.is_err());
    }
}
