//! Events produced by a session for its collaborator.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Outbound notification from the session worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FtpEvent {
    /// A command failed. Exactly one per failed command.
    Error { code: i32, detail: String },
    /// Human-readable status, usually `"<code> <detail>"` of a completion reply.
    Info { message: String },
    /// Every accepted control reply, for a wire-level audit trail.
    Debug { code: i32, detail: String },
    RemoteDirChanged { path: String },
    /// Raw LIST lines, uninterpreted.
    RemoteListingChanged { lines: Vec<String> },
    /// Fraction in `[0, 1]`, non-decreasing within one transfer.
    TransferProgress { fraction: f64 },
    TransferFinished,
}

/// Sending side of the event channel.
///
/// Sends never block; if the collaborator has gone away events are dropped.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<FtpEvent>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<FtpEvent>) -> Self {
        Self { tx }
    }

    /// Emitter plus its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FtpEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: FtpEvent) {
        let _ = self.tx.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(FtpEvent::Info {
            message: message.into(),
        });
    }

    pub fn debug(&self, code: i32, detail: impl Into<String>) {
        self.emit(FtpEvent::Debug {
            code,
            detail: detail.into(),
        });
    }

    pub fn remote_dir_changed(&self, path: impl Into<String>) {
        self.emit(FtpEvent::RemoteDirChanged { path: path.into() });
    }

    pub fn remote_listing_changed(&self, lines: Vec<String>) {
        self.emit(FtpEvent::RemoteListingChanged { lines });
    }

    pub fn progress(&self, fraction: f64) {
        self.emit(FtpEvent::TransferProgress { fraction });
    }

    pub fn transfer_finished(&self) {
        self.emit(FtpEvent::TransferFinished);
    }
}
