//! Shared types for the FTP engine.

use crate::ftp::error::{FtpError, FtpResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ─── Connection / Session ────────────────────────────────────────────

/// Where the data connection comes from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DataChannelMode {
    /// PORT: client listens, server connects back.
    Active,
    /// PASV: server listens, client connects.
    #[default]
    Passive,
}

/// Server address and credentials. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_port() -> u16 {
    21
}
fn default_username() -> String {
    "anonymous".into()
}
fn default_password() -> String {
    "anonymous@".into()
}

impl ServerInfo {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FtpEngineConfig {
    /// Connect and per-read timeout on the control connection.
    #[serde(default = "default_control_timeout")]
    pub control_timeout_sec: u64,
    /// Connect/accept and per-read/write timeout on data connections.
    #[serde(default = "default_data_timeout")]
    pub data_timeout_sec: u64,
    /// Bytes moved per transfer iteration.
    #[serde(default = "default_chunk")]
    pub chunk_size: usize,
    /// Pending commands the session worker will buffer.
    #[serde(default = "default_queue_capacity")]
    pub command_queue_capacity: usize,
}

fn default_control_timeout() -> u64 {
    10
}
fn default_data_timeout() -> u64 {
    30
}
fn default_chunk() -> usize {
    8192
}
fn default_queue_capacity() -> usize {
    64
}

impl Default for FtpEngineConfig {
    fn default() -> Self {
        Self {
            control_timeout_sec: default_control_timeout(),
            data_timeout_sec: default_data_timeout(),
            chunk_size: default_chunk(),
            command_queue_capacity: default_queue_capacity(),
        }
    }
}

impl FtpEngineConfig {
    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_sec)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_sec)
    }
}

/// Lifecycle of a session worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No control connection yet.
    Idle,
    Connecting,
    Ready,
    Transferring,
    /// Control connection dropped after a fatal error.
    Broken,
    /// Shut down by request.
    Closed,
}

// ─── FTP Response ────────────────────────────────────────────────────

/// One parsed control reply. `code` is -1 when nothing matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FtpResponse {
    pub code: i32,
    pub detail: String,
}

impl FtpResponse {
    pub fn unparsable() -> Self {
        Self {
            code: -1,
            detail: String::new(),
        }
    }

    /// `"<code> <detail>"`, the form used for info events.
    pub fn summary(&self) -> String {
        format!("{} {}", self.code, self.detail)
    }
}

// ─── Transfer ────────────────────────────────────────────────────────

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// A single requested transfer. `offset` bytes are already in place on
/// the receiving side; `total_size` comes from the caller and is only
/// used for progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpec {
    pub direction: TransferDirection,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub total_size: u64,
    pub offset: u64,
}

impl TransferSpec {
    pub fn new(
        direction: TransferDirection,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        total_size: u64,
        offset: u64,
    ) -> FtpResult<Self> {
        if offset > total_size {
            return Err(FtpError::transfer_io(format!(
                "resume offset {} exceeds total size {}",
                offset, total_size
            )));
        }
        Ok(Self {
            direction,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            total_size,
            offset,
        })
    }

    pub fn download(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        total_size: u64,
        offset: u64,
    ) -> FtpResult<Self> {
        Self::new(TransferDirection::Download, local_path, remote_path, total_size, offset)
    }

    pub fn upload(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        total_size: u64,
        offset: u64,
    ) -> FtpResult<Self> {
        Self::new(TransferDirection::Upload, local_path, remote_path, total_size, offset)
    }

    pub fn is_resume(&self) -> bool {
        self.offset > 0
    }
}

/// How a transfer loop ended when it did not fail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferOutcome {
    Completed,
    Cancelled,
}

// ─── Cancellation ────────────────────────────────────────────────────

/// Shared cancel request for the transfer loop.
///
/// The flag is polled at chunk boundaries; the notifier lets a loop that
/// is parked on the data socket wake up and poll early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    requested: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Clear a pending request, returning whether one was set.
    pub fn take(&self) -> bool {
        self.inner.requested.swap(false, Ordering::SeqCst)
    }

    /// Resolves after `cancel()`. May also resolve for a request that was
    /// already taken, so callers re-check with `take()`.
    pub async fn notified(&self) {
        self.inner.notify.notified().await
    }
}
