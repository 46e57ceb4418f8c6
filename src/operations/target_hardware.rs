//! # Target hardware
//!
//! Avionics side of a load authentication. The target answers the `.LAI`
//! read, receives the `.LAR`, then runs two tasks:
//!
//! - the status task uploads `<base>.LAS` every status period, reporting
//!   `next_state`, and promotes it to `current_state` once delivered;
//! - the authentication task fetches every certificate named in the request
//!   and hands it to [`TargetHardwareHooks::check_certificate`].
//!
//! Control messages (`ABORT:`/`WAIT:`) returned by the data loader in TFTP
//! ERROR packets feed back into both tasks.

use super::{
    AbortSource, AuthenticationBase, ControlMessage, NotifierAuthentication, NotifierEvent,
    STATUS_FILE_EXTENSION, base_file_name,
};
use crate::config::{TargetHardwareConfig, TftpConfig};
use crate::error::prelude::*;
use crate::files::{
    AuthenticationStatus, DEFAULT_PROTOCOL_VERSION, InitializationAuthenticationFile,
    InitializationStatus, LoadAuthenticationRequestFile, LoadAuthenticationStatusFile,
    LoadAuthenticationStatusHeaderFile, SerializableAuthentication,
};
use crate::logging::{LogComponent, LogStage};
use crate::tftp::TftpClient;
use crate::{ldebug, linfo, lwarn};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

/// Progress of the target side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    Created,
    Accepted,
    Denied,
    InProgress,
    InProgressWithDescription,
    AbortedByTarget,
    AbortedByDataloader,
    AbortedByOperator,
    Completed,
    Error,
    Finished,
}

impl TargetState {
    /// No further status file will be sent
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Error | Self::Finished)
    }

    /// Sent exactly once, then the status task stops
    const fn is_final_report(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::AbortedByTarget | Self::AbortedByDataloader | Self::AbortedByOperator
        )
    }

    /// Overall `.LAS` code reported for this state
    #[must_use]
    pub const fn status(self) -> AuthenticationStatus {
        match self {
            Self::Accepted => AuthenticationStatus::Accepted,
            Self::InProgress => AuthenticationStatus::InProgress,
            Self::InProgressWithDescription => AuthenticationStatus::InProgressWithDescription,
            Self::Completed => AuthenticationStatus::Completed,
            Self::AbortedByDataloader => AuthenticationStatus::AbortedInTheTargetDlRequest,
            Self::AbortedByOperator => AuthenticationStatus::AbortedInTheTargetOpRequest,
            Self::AbortedByTarget
            | Self::Created
            | Self::Denied
            | Self::Error
            | Self::Finished => AuthenticationStatus::AbortedByTheTargetHardware,
        }
    }
}

/// Application hooks of the target hardware
#[async_trait]
pub trait TargetHardwareHooks: Send + Sync + 'static {
    /// Whether an authentication may start now
    async fn check_authentication_conditions(&self, _base_file_name: &str) -> bool {
        true
    }

    /// Key returned in the `.LAI`
    async fn generate_cryptographic_key(&self, _base_file_name: &str) -> Vec<u8> {
        Vec::new()
    }

    /// Verify a received certificate; `Err` carries the report
    async fn check_certificate(&self, _file_name: &str, _data: &[u8]) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Accept everything with an empty key
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTargetHardwareHooks;

impl TargetHardwareHooks for DefaultTargetHardwareHooks {}

/// Point-in-time view of the target, suitable for printing as JSON
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub base_file_name: String,
    pub current_state: TargetState,
    pub next_state: TargetState,
    pub status_code: u16,
    pub description: String,
    pub load_list_ratio: u32,
    pub counter: u16,
    pub headers: Vec<HeaderSnapshot>,
    pub updated_at: DateTime<Utc>,
}

/// One certificate entry of a [`TargetSnapshot`]
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSnapshot {
    pub file_name: String,
    pub part_number: String,
    pub status: u16,
    pub ratio: u32,
    pub description: String,
}

#[derive(Debug)]
struct Progress {
    base_file_name: String,
    next_state: TargetState,
    description: String,
    last_status_code: u16,
    headers: Vec<LoadAuthenticationStatusHeaderFile>,
    load_list_ratio: u32,
    counter: u16,
    updated_at: DateTime<Utc>,
}

impl Progress {
    fn new() -> Self {
        Self {
            base_file_name: String::new(),
            next_state: TargetState::Created,
            description: String::new(),
            last_status_code: AuthenticationStatus::Accepted.code(),
            headers: Vec::new(),
            load_list_ratio: 0,
            counter: 0,
            updated_at: Utc::now(),
        }
    }

    fn set_next(&mut self, state: TargetState) {
        self.next_state = state;
        self.updated_at = Utc::now();
    }

    fn header_mut(&mut self, index: usize) -> Option<&mut LoadAuthenticationStatusHeaderFile> {
        self.updated_at = Utc::now();
        self.headers.get_mut(index)
    }
}

struct Inner {
    config: TargetHardwareConfig,
    tftp: TftpConfig,
    hooks: Arc<dyn TargetHardwareHooks>,
    current: watch::Sender<TargetState>,
    progress: RwLock<Progress>,
    request_buffer: Mutex<BytesMut>,
    wait_seconds: AtomicU16,
    aborted: AtomicBool,
    stopping: AtomicBool,
    status_started: AtomicBool,
    authentication_started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Target hardware side of one authentication; clones share the same state
#[derive(Clone)]
pub struct TargetHardware {
    inner: Arc<Inner>,
}

impl TargetHardware {
    /// Target with the default hooks
    #[must_use]
    pub fn new(config: TargetHardwareConfig, tftp: TftpConfig) -> Self {
        Self::with_hooks(config, tftp, Arc::new(DefaultTargetHardwareHooks))
    }

    /// Target calling into `hooks`
    #[must_use]
    pub fn with_hooks(
        config: TargetHardwareConfig,
        tftp: TftpConfig,
        hooks: Arc<dyn TargetHardwareHooks>,
    ) -> Self {
        let (current, _) = watch::channel(TargetState::Created);
        Self {
            inner: Arc::new(Inner {
                config,
                tftp,
                hooks,
                current,
                progress: RwLock::new(Progress::new()),
                request_buffer: Mutex::new(BytesMut::new()),
                wait_seconds: AtomicU16::new(0),
                aborted: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                status_started: AtomicBool::new(false),
                authentication_started: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &TargetHardwareConfig {
        &self.inner.config
    }

    /// Last state delivered to the data loader
    #[must_use]
    pub fn state(&self) -> TargetState {
        *self.inner.current.borrow()
    }

    /// Wait until the target reaches `DENIED`, `ERROR` or `FINISHED`
    pub async fn wait_finished(&self) -> TargetState {
        let mut rx = self.inner.current.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Copy of the current progress
    pub async fn snapshot(&self) -> TargetSnapshot {
        let progress = self.inner.progress.read().await;
        TargetSnapshot {
            base_file_name: progress.base_file_name.clone(),
            current_state: self.state(),
            next_state: progress.next_state,
            status_code: progress.last_status_code,
            description: progress.description.clone(),
            load_list_ratio: progress.load_list_ratio,
            counter: progress.counter,
            headers: progress
                .headers
                .iter()
                .map(|header| HeaderSnapshot {
                    file_name: header.header_file_name(),
                    part_number: header.load_part_number_name(),
                    status: header.load_status(),
                    ratio: header.load_ratio(),
                    description: header.load_status_description(),
                })
                .collect(),
            updated_at: progress.updated_at,
        }
    }

    /// Answer the data loader's `.LAI` read.
    ///
    /// Only valid in `CREATED`. Starts the status task when accepted.
    pub async fn load_authentication_initialization(&self, file_name: &str) -> Result<Bytes> {
        ensure_state!(
            self.state() == TargetState::Created,
            "initialization requested in state {:?}",
            self.state()
        );
        let base = base_file_name(file_name).to_string();

        let mut response = InitializationAuthenticationFile::new(file_name, DEFAULT_PROTOCOL_VERSION);
        let accepted = self.inner.hooks.check_authentication_conditions(&base).await;
        if accepted {
            response.set_operation_acceptance_status_code(InitializationStatus::Accepted.code());
            let key = self.inner.hooks.generate_cryptographic_key(&base).await;
            response.set_cryptographic_key(&key)?;
        } else {
            response.set_operation_acceptance_status_code(InitializationStatus::Denied.code());
        }
        let data = response.to_bytes()?;

        {
            let mut progress = self.inner.progress.write().await;
            progress.base_file_name.clone_from(&base);
            if accepted {
                progress.set_next(TargetState::Accepted);
            } else {
                progress.set_next(TargetState::Denied);
            }
        }

        linfo!(
            base,
            LogStage::Initialization,
            LogComponent::TargetHardware,
            "load_authentication_initialization",
            "Initialization answered",
            accepted = accepted,
            key_length = response.cryptographic_key_length()
        );

        if accepted {
            if !self.inner.status_started.swap(true, Ordering::SeqCst) {
                let task = tokio::spawn(Arc::clone(&self.inner).status_loop());
                self.inner.tasks.lock().await.push(task);
            }
        } else {
            self.inner.current.send_replace(TargetState::Denied);
        }
        Ok(data)
    }

    /// Prepare for the data loader's `.LAR` upload
    pub async fn load_authentication_request(&self, file_name: &str) -> Result<()> {
        self.inner.ensure_accepted().await?;
        self.inner.request_buffer.lock().await.clear();
        ldebug!(
            file_name,
            LogStage::Request,
            LogComponent::TargetHardware,
            "load_authentication_request",
            "Request upload accepted"
        );
        Ok(())
    }

    /// Append received request bytes, bounded by `max_certificate_size`
    pub async fn write_request_data(&self, data: &[u8]) -> Result<()> {
        let limit = self.inner.config.max_certificate_size;
        let mut buffer = self.inner.request_buffer.lock().await;
        if buffer.len() + data.len() > limit {
            return Err(LoadAuthError::business(format!(
                "request file exceeds {limit} bytes"
            )));
        }
        buffer.extend_from_slice(data);
        Ok(())
    }

    /// Stop both tasks without reporting anything further
    pub async fn shutdown(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        let tasks: Vec<_> = self.inner.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl AuthenticationBase for TargetHardware {
    async fn abort(&self, source: u16) -> Result<()> {
        self.inner.abort(source).await
    }
}

#[async_trait]
impl NotifierAuthentication for TargetHardware {
    async fn notify(&self, event: NotifierEvent) -> Result<()> {
        match event {
            NotifierEvent::TftpSectionClosed => {
                self.inner.ensure_accepted().await?;

                let data = self.inner.request_buffer.lock().await.split().freeze();
                let request = LoadAuthenticationRequestFile::deserialize(&data)?;
                let mut headers = Vec::with_capacity(request.header_files().len());
                for entry in request.header_files() {
                    let mut header = LoadAuthenticationStatusHeaderFile::new(
                        &entry.header_file_name(),
                        &entry.load_part_number_name(),
                    )?;
                    header.set_load_ratio(0);
                    header.set_load_status(AuthenticationStatus::Accepted.code());
                    headers.push(header);
                }

                {
                    let mut progress = self.inner.progress.write().await;
                    linfo!(
                        progress.base_file_name,
                        LogStage::Request,
                        LogComponent::TargetHardware,
                        "notify",
                        "Load authentication request received",
                        headers = headers.len()
                    );
                    progress.headers = headers;
                    progress.set_next(TargetState::InProgress);
                }

                if !self.inner.authentication_started.swap(true, Ordering::SeqCst) {
                    let task = tokio::spawn(Arc::clone(&self.inner).authentication_loop());
                    self.inner.tasks.lock().await.push(task);
                }
                Ok(())
            }
            NotifierEvent::Unknown => Err(LoadAuthError::business("unsupported notifier event")),
        }
    }
}

enum FetchOutcome {
    Received(Bytes),
    WaitRequested,
    Failed(LoadAuthError),
}

impl Inner {
    fn data_loader(&self) -> TftpClient {
        TftpClient::new(
            SocketAddr::new(self.config.data_loader_ip, self.config.data_loader_port),
            self.tftp.clone(),
        )
    }

    fn keep_running(&self) -> bool {
        !self.stopping.load(Ordering::SeqCst) && !self.aborted.load(Ordering::SeqCst)
    }

    async fn ensure_accepted(&self) -> Result<()> {
        let next = self.progress.read().await.next_state;
        let current = *self.current.borrow();
        ensure_state!(
            current == TargetState::Accepted || next == TargetState::Accepted,
            "request not expected in state {current:?}"
        );
        Ok(())
    }

    async fn abort(&self, source: u16) -> Result<()> {
        let source = AbortSource::try_from(source)?;
        if self.aborted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (state, description) = match source {
            AbortSource::TargetHardware => (
                TargetState::AbortedByTarget,
                "Authentication aborted by the target hardware.",
            ),
            AbortSource::DataLoader => (
                TargetState::AbortedByDataloader,
                "Authentication aborted by the data loader.",
            ),
            AbortSource::Operator => (
                TargetState::AbortedByOperator,
                "Authentication aborted by the operator.",
            ),
        };

        let mut progress = self.progress.write().await;
        progress.description = description.to_string();
        progress.set_next(state);
        linfo!(
            progress.base_file_name,
            LogStage::Abort,
            LogComponent::TargetHardware,
            "abort",
            "Authentication aborted",
            source = %source
        );
        Ok(())
    }

    /// Act on an `ABORT:`/`WAIT:` carried by a failed transfer
    async fn handle_transfer_error(&self, error: &LoadAuthError) {
        let Some((0, message)) = error.remote_message() else {
            return;
        };
        match ControlMessage::parse(message) {
            Some(ControlMessage::Abort(source)) => {
                if let Err(e) = self.abort(source).await {
                    lwarn!(
                        "target",
                        LogStage::Abort,
                        LogComponent::TargetHardware,
                        "handle_transfer_error",
                        "Ignoring abort request",
                        error = %e
                    );
                }
            }
            Some(ControlMessage::Wait(seconds)) => {
                self.wait_seconds.store(seconds, Ordering::SeqCst);
            }
            None => {}
        }
    }

    async fn build_status(&self, file_name: &str) -> Result<(TargetState, LoadAuthenticationStatusFile)> {
        let mut progress = self.progress.write().await;
        let state = progress.next_state;
        let status = state.status();

        let mut file = LoadAuthenticationStatusFile::new(file_name, DEFAULT_PROTOCOL_VERSION);
        file.set_authentication_operation_status_code(status.code());
        if matches!(
            status,
            AuthenticationStatus::InProgressWithDescription
                | AuthenticationStatus::AbortedByTheTargetHardware
        ) {
            file.set_authentication_status_description(&progress.description);
        }
        progress.counter = progress.counter.wrapping_add(1);
        file.set_counter(progress.counter);
        file.set_exception_timer(0);
        let estimated = if matches!(
            status,
            AuthenticationStatus::InProgress | AuthenticationStatus::InProgressWithDescription
        ) {
            0xFFFF
        } else {
            0
        };
        file.set_estimated_time(estimated);
        file.set_load_list_ratio(progress.load_list_ratio);
        for header in &progress.headers {
            file.add_header_file(header.clone())?;
        }
        progress.last_status_code = status.code();
        Ok((state, file))
    }

    async fn status_loop(self: Arc<Self>) {
        let client = self.data_loader();
        let base = self.progress.read().await.base_file_name.clone();
        let file_name = format!("{base}{STATUS_FILE_EXTENSION}");
        let max_tries = self.config.max_tries.max(1);
        let mut tries_left = max_tries;

        while !self.stopping.load(Ordering::SeqCst) {
            let sent = match self.build_status(&file_name).await {
                Ok((state, file)) => match file.to_bytes() {
                    Ok(data) => client
                        .send(&file_name, &data)
                        .await
                        .map(|()| state),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match sent {
                Ok(state) => {
                    tries_left = max_tries;
                    self.current.send_replace(state);
                    ldebug!(
                        base,
                        LogStage::Status,
                        LogComponent::TargetHardware,
                        "status_loop",
                        "Status delivered",
                        state = ?state
                    );
                    if state.is_final_report() {
                        break;
                    }
                }
                Err(e) => {
                    tries_left -= 1;
                    lwarn!(
                        base,
                        LogStage::Status,
                        LogComponent::TargetHardware,
                        "status_loop",
                        "Status upload failed",
                        tries_left = tries_left,
                        error = %e
                    );
                    self.handle_transfer_error(&e).await;
                    if tries_left == 0 {
                        break;
                    }
                }
            }

            tokio::time::sleep(self.config.status_period()).await;
        }

        let last = if tries_left == 0 {
            TargetState::Error
        } else {
            TargetState::Finished
        };
        self.progress.write().await.set_next(last);
        self.current.send_replace(last);
        linfo!(
            base,
            LogStage::Shutdown,
            LogComponent::TargetHardware,
            "status_loop",
            "Status reporting finished",
            state = ?last
        );
    }

    async fn fetch_certificate(&self, client: &TftpClient, file_name: &str) -> FetchOutcome {
        let max_tries = self.config.max_tries.max(1);
        let mut tried = 0;
        loop {
            tried += 1;
            match client
                .fetch_limited(file_name, self.config.max_certificate_size)
                .await
            {
                Ok(data) => return FetchOutcome::Received(data),
                Err(e) => {
                    self.handle_transfer_error(&e).await;
                    if self.wait_seconds.load(Ordering::SeqCst) > 0 {
                        return FetchOutcome::WaitRequested;
                    }
                    if tried >= max_tries || !e.is_transient() || !self.keep_running() {
                        return FetchOutcome::Failed(e);
                    }
                }
            }
        }
    }

    async fn authentication_loop(self: Arc<Self>) {
        let client = self.data_loader();
        let (base, files) = {
            let progress = self.progress.read().await;
            let files: Vec<String> = progress
                .headers
                .iter()
                .map(LoadAuthenticationStatusHeaderFile::header_file_name)
                .collect();
            (progress.base_file_name.clone(), files)
        };
        let total = files.len();
        let mut completed: usize = 0;
        let mut index = 0;
        let mut failed = false;

        while index < total && self.keep_running() {
            let file_name = &files[index];

            let wait = self.wait_seconds.load(Ordering::SeqCst);
            if wait > 0 {
                {
                    let mut progress = self.progress.write().await;
                    if let Some(header) = progress.header_mut(index) {
                        header.set_load_status(AuthenticationStatus::InProgressWithDescription.code());
                        header.set_load_ratio(0);
                        header.set_load_status_description(&format!(
                            "Waiting {wait} seconds before authentication..."
                        ));
                    }
                    progress.description = format!("Waiting file {file_name} to be available...");
                    progress.set_next(TargetState::InProgressWithDescription);
                }
                tokio::time::sleep(Duration::from_secs(u64::from(wait))).await;
                self.wait_seconds.store(0, Ordering::SeqCst);
            }

            {
                let mut progress = self.progress.write().await;
                if let Some(header) = progress.header_mut(index) {
                    header.set_load_status(AuthenticationStatus::InProgress.code());
                    header.set_load_ratio(0);
                }
                if !self.aborted.load(Ordering::SeqCst) {
                    progress.set_next(TargetState::InProgressWithDescription);
                }
            }

            let data = match self.fetch_certificate(&client, file_name).await {
                FetchOutcome::Received(data) => data,
                FetchOutcome::WaitRequested => continue,
                FetchOutcome::Failed(e) => {
                    lwarn!(
                        base,
                        LogStage::Authentication,
                        LogComponent::TargetHardware,
                        "authentication_loop",
                        "Certificate fetch failed",
                        file = %file_name,
                        error = %e
                    );
                    if let Some(header) = self.progress.write().await.header_mut(index) {
                        header.set_load_status(AuthenticationStatus::HeaderFileFailed.code());
                        header.set_load_status_description("Failed to fetch header file");
                    }
                    failed = true;
                    break;
                }
            };

            if let Some(header) = self.progress.write().await.header_mut(index) {
                header.set_load_status(AuthenticationStatus::InProgressWithDescription.code());
                header.set_load_ratio(50);
                header.set_load_status_description("Checking received file...");
            }

            if let Err(report) = self.hooks.check_certificate(file_name, &data).await {
                lwarn!(
                    base,
                    LogStage::Authentication,
                    LogComponent::TargetHardware,
                    "authentication_loop",
                    "Certificate rejected",
                    file = %file_name,
                    report = %report
                );
                if let Some(header) = self.progress.write().await.header_mut(index) {
                    header.set_load_status(AuthenticationStatus::HeaderFileFailed.code());
                    header.set_load_status_description(&report);
                }
                failed = true;
                break;
            }
            // an abort during the check leaves this header with the abort status
            if !self.keep_running() {
                break;
            }

            completed += 1;
            {
                let mut progress = self.progress.write().await;
                if let Some(header) = progress.header_mut(index) {
                    header.set_load_status(AuthenticationStatus::Completed.code());
                    header.set_load_ratio(100);
                }
                progress.load_list_ratio = u32::try_from(completed * 100 / total).unwrap_or(100);
            }
            ldebug!(
                base,
                LogStage::Authentication,
                LogComponent::TargetHardware,
                "authentication_loop",
                "Certificate accepted",
                file = %file_name,
                size = data.len()
            );
            index += 1;
        }

        if failed {
            if let Err(e) = self.abort(AbortSource::TargetHardware.code()).await {
                lwarn!(
                    base,
                    LogStage::Abort,
                    LogComponent::TargetHardware,
                    "authentication_loop",
                    "Abort failed",
                    error = %e
                );
            }
            index += 1;
        }

        let mut progress = self.progress.write().await;
        if index < total {
            // once reporting is over, keep what the data loader last saw
            let code = match progress.next_state {
                TargetState::Finished | TargetState::Error => progress.last_status_code,
                state => state.status().code(),
            };
            let description = progress.description.clone();
            for header in progress.headers.iter_mut().skip(index) {
                header.set_load_status(code);
                header.set_load_status_description(&description);
            }
        }
        if !failed && completed == total && !self.aborted.load(Ordering::SeqCst) {
            progress.set_next(TargetState::Completed);
            linfo!(
                base,
                LogStage::Authentication,
                LogComponent::TargetHardware,
                "authentication_loop",
                "All certificates accepted",
                files = total
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::LoadAuthenticationRequestHeaderFile;
    use tokio_test::{assert_err, assert_ok};

    fn target() -> TargetHardware {
        target_with(Arc::new(DefaultTargetHardwareHooks))
    }

    fn target_with(hooks: Arc<dyn TargetHardwareHooks>) -> TargetHardware {
        let config = TargetHardwareConfig {
            // nothing listens here; status uploads fail fast
            data_loader_port: 9,
            status_period_ms: 50,
            ..TargetHardwareConfig::default()
        };
        let tftp = TftpConfig {
            timeout_ms: 50,
            retransmits: 0,
            ..TftpConfig::default()
        };
        TargetHardware::with_hooks(config, tftp, hooks)
    }

    struct Refuse;

    #[async_trait]
    impl TargetHardwareHooks for Refuse {
        async fn check_authentication_conditions(&self, _base: &str) -> bool {
            false
        }
    }

    struct FixedKey;

    #[async_trait]
    impl TargetHardwareHooks for FixedKey {
        async fn generate_cryptographic_key(&self, base: &str) -> Vec<u8> {
            base.as_bytes().to_vec()
        }
    }

    fn request_bytes() -> Bytes {
        let mut request = LoadAuthenticationRequestFile::new("TH_1.LAR", DEFAULT_PROTOCOL_VERSION);
        request
            .add_header_file(LoadAuthenticationRequestHeaderFile::new("cert.bin", "PN-001").unwrap())
            .unwrap();
        request.to_bytes().unwrap()
    }

    #[test]
    fn unmapped_states_report_target_abort() {
        assert_eq!(TargetState::Created.status().code(), 0x1003);
        assert_eq!(TargetState::Error.status().code(), 0x1003);
        assert_eq!(TargetState::AbortedByOperator.status().code(), 0x1005);
        assert_eq!(TargetState::InProgress.status().code(), 2);
    }

    #[tokio::test]
    async fn initialization_accepts_with_generated_key() {
        let th = target_with(Arc::new(FixedKey));
        let data = th
            .load_authentication_initialization("/load/TH_1.LAI")
            .await
            .unwrap();
        let response = InitializationAuthenticationFile::deserialize(&data).unwrap();
        assert_eq!(response.operation_acceptance_status_code(), 1);
        assert_eq!(response.cryptographic_key(), b"TH_1");
        assert_eq!(th.snapshot().await.base_file_name, "TH_1");

        // only once
        assert!(th.load_authentication_initialization("TH_1.LAI").await.is_err());
        th.shutdown().await;
    }

    #[tokio::test]
    async fn refused_conditions_deny() {
        let th = target_with(Arc::new(Refuse));
        let data = th.load_authentication_initialization("TH_1.LAI").await.unwrap();
        let response = InitializationAuthenticationFile::deserialize(&data).unwrap();
        assert_eq!(response.operation_acceptance_status_code(), 0x1000);
        assert_eq!(th.state(), TargetState::Denied);
        assert_eq!(th.wait_finished().await, TargetState::Denied);
    }

    #[tokio::test]
    async fn request_needs_accepted_state() {
        let th = target();
        assert_err!(th.load_authentication_request("TH_1.LAR").await);
        assert_err!(th.notify(NotifierEvent::TftpSectionClosed).await);
    }

    #[tokio::test]
    async fn request_builds_status_headers() {
        let th = target();
        th.load_authentication_initialization("TH_1.LAI").await.unwrap();
        th.load_authentication_request("TH_1.LAR").await.unwrap();
        th.write_request_data(&request_bytes()).await.unwrap();
        th.notify(NotifierEvent::TftpSectionClosed).await.unwrap();

        let snapshot = th.snapshot().await;
        assert_eq!(snapshot.headers.len(), 1);
        assert_eq!(snapshot.headers[0].file_name, "cert.bin");
        assert_eq!(snapshot.headers[0].part_number, "PN-001");
        th.shutdown().await;
    }

    #[tokio::test]
    async fn oversized_request_is_refused() {
        let th = target();
        let chunk = vec![0u8; th.config().max_certificate_size];
        assert_ok!(th.write_request_data(&chunk).await);
        assert_err!(th.write_request_data(&[0]).await);
    }

    #[tokio::test]
    async fn unknown_event_is_an_error() {
        let th = target();
        assert_err!(th.notify(NotifierEvent::Unknown).await);
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_validated() {
        let th = target();
        assert!(th.abort(0x0042).await.is_err());
        assert_eq!(th.snapshot().await.next_state, TargetState::Created);

        th.abort(AbortSource::Operator.code()).await.unwrap();
        th.abort(AbortSource::DataLoader.code()).await.unwrap();
        let snapshot = th.snapshot().await;
        assert_eq!(snapshot.next_state, TargetState::AbortedByOperator);
        assert_eq!(snapshot.description, "Authentication aborted by the operator.");
    }

    #[tokio::test]
    async fn unreachable_data_loader_ends_in_error() {
        let th = target();
        th.load_authentication_initialization("TH_1.LAI").await.unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), th.wait_finished())
            .await
            .unwrap();
        assert_eq!(state, TargetState::Error);
    }
}
