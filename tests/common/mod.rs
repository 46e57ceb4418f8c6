//! Helpers shared by the integration tests.

#![allow(dead_code)]

use load_authentication::config::{DataLoaderConfig, TargetHardwareConfig, TftpConfig};
use std::net::UdpSocket;
use std::path::Path;

/// A UDP port that was free a moment ago
pub fn free_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

pub fn tftp_config() -> TftpConfig {
    TftpConfig {
        timeout_ms: 200,
        retransmits: 2,
        ..TftpConfig::default()
    }
}

pub fn data_loader_config(server_port: u16, target_port: u16, load_directory: &Path) -> DataLoaderConfig {
    DataLoaderConfig {
        server_port,
        target_port,
        load_directory: load_directory.to_path_buf(),
        dlp_timeout_ms: 3000,
        default_wait_seconds: 1,
        max_tries: 2,
    }
}

pub fn target_config(data_loader_port: u16) -> TargetHardwareConfig {
    TargetHardwareConfig {
        server_port: 0,
        data_loader_port,
        status_period_ms: 100,
        ..TargetHardwareConfig::default()
    }
}
