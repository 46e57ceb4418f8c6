//! Exposes a [`TargetHardware`] on a TFTP server.

use super::{
    INITIALIZATION_FILE_EXTENSION, NotifierAuthentication, NotifierEvent, REQUEST_FILE_EXTENSION,
    TargetHardware,
};
use crate::config::TftpConfig;
use crate::error::prelude::*;
use crate::lwarn;
use crate::logging::{LogComponent, LogStage};
use crate::tftp::{TftpServer, TftpServerHandle, TransferHandler, TransferRejection, TransferSession};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// `.LAI` reads and `.LAR` writes go to the target; anything else is not found
pub struct TargetServer {
    target: TargetHardware,
}

impl TargetServer {
    /// Serve `target`
    #[must_use]
    pub const fn new(target: TargetHardware) -> Self {
        Self { target }
    }

    /// Serve `target` on `target_hardware.server_port` of every interface
    pub async fn start(target: TargetHardware, tftp: TftpConfig) -> Result<TftpServerHandle> {
        let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), target.config().server_port);
        Self::bind(addr, target, tftp).await
    }

    /// Start serving on `addr`
    pub async fn bind(
        addr: SocketAddr,
        target: TargetHardware,
        tftp: TftpConfig,
    ) -> Result<TftpServerHandle> {
        TftpServer::bind(addr, Arc::new(Self::new(target)), tftp).await
    }
}

fn rejected(session: &TransferSession, error: &crate::error::LoadAuthError) -> TransferRejection {
    lwarn!(
        session,
        LogStage::Transfer,
        LogComponent::TargetHardware,
        "open",
        "Request refused",
        error = %error
    );
    TransferRejection::access_violation(error.to_string())
}

#[async_trait]
impl TransferHandler for TargetServer {
    async fn open_read(&self, session: &TransferSession) -> std::result::Result<Bytes, TransferRejection> {
        if !session.file_name.ends_with(INITIALIZATION_FILE_EXTENSION) {
            return Err(TransferRejection::not_found(&session.file_name));
        }
        self.target
            .load_authentication_initialization(&session.file_name)
            .await
            .map_err(|e| rejected(session, &e))
    }

    async fn open_write(&self, session: &TransferSession) -> std::result::Result<(), TransferRejection> {
        if !session.file_name.ends_with(REQUEST_FILE_EXTENSION) {
            return Err(TransferRejection::not_found(&session.file_name));
        }
        self.target
            .load_authentication_request(&session.file_name)
            .await
            .map_err(|e| rejected(session, &e))
    }

    async fn write_completed(&self, _session: &TransferSession, data: Bytes) -> Result<()> {
        self.target.write_request_data(&data).await?;
        self.target.notify(NotifierEvent::TftpSectionClosed).await
    }
}
