//! FTP engine error type.

use crate::ftp::events::FtpEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised FTP error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// Reply code that triggered the error, if any (-1 for an unparsable reply).
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// Socket-level failure: refused, reset, DNS, timeout. Always fatal.
    ConnectionFault,
    /// Reply code outside the expected set. Fatal only for 0 and 421.
    ProtocolError,
    /// Local file failure while streaming. The session survives.
    TransferIo,
    /// Anything else. Fatal.
    Unexpected,
}

pub type FtpResult<T> = Result<T, FtpError>;

/// Event code for errors without a reply code.
const NO_REPLY_CODE: i32 = -1;
/// Event code for local file failures.
const LOCAL_IO_CODE: i32 = -2;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection_fault(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFault, msg)
    }

    pub fn not_connected() -> Self {
        Self::connection_fault("not connected")
    }

    /// Reply `code` with its `detail` did not match the expected set.
    pub fn protocol(code: i32, detail: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ProtocolError, detail).with_code(code)
    }

    pub fn transfer_io(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TransferIo, msg)
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Unexpected, msg)
    }

    /// Wrap a local filesystem error.
    pub fn local_io(e: std::io::Error) -> Self {
        Self::transfer_io(e.to_string())
    }

    /// Whether the control connection must be dropped.
    pub fn is_fatal(&self) -> bool {
        match self.kind {
            FtpErrorKind::ConnectionFault | FtpErrorKind::Unexpected => true,
            FtpErrorKind::ProtocolError => matches!(self.code, Some(0) | Some(421)),
            FtpErrorKind::TransferIo => false,
        }
    }

    /// The numeric code reported to the collaborator.
    pub fn event_code(&self) -> i32 {
        match self.kind {
            FtpErrorKind::ProtocolError => self.code.unwrap_or(NO_REPLY_CODE),
            FtpErrorKind::TransferIo => LOCAL_IO_CODE,
            FtpErrorKind::ConnectionFault | FtpErrorKind::Unexpected => NO_REPLY_CODE,
        }
    }

    /// Translate into the single error event a command boundary emits.
    pub fn to_event(&self) -> FtpEvent {
        let detail = match self.kind {
            FtpErrorKind::Unexpected => format!("unexpected: {}", self.message),
            _ => self.message.clone(),
        };
        FtpEvent::Error {
            code: self.event_code(),
            detail,
        }
    }

    /// Merge an operation result with the result of a trailing cleanup step
    /// so that only one error surfaces.
    ///
    /// A fatal cleanup error wins (the connection must still be dropped);
    /// otherwise the primary error wins. The loser is logged.
    pub fn combine<T>(primary: FtpResult<T>, cleanup: FtpResult<()>) -> FtpResult<T> {
        match (primary, cleanup) {
            (Ok(v), Ok(())) => Ok(v),
            (Ok(_), Err(c)) => Err(c),
            (Err(p), Ok(())) => Err(p),
            (Err(p), Err(c)) => {
                if c.is_fatal() && !p.is_fatal() {
                    log::warn!("superseded by fatal cleanup error: {}", p);
                    Err(c)
                } else {
                    log::warn!("cleanup also failed: {}", c);
                    Err(p)
                }
            }
        }
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

/// Socket errors. Local file errors go through [`FtpError::local_io`].
impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::connection_fault(format!("timed out: {}", e))
        } else {
            Self::connection_fault(e.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for FtpError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::connection_fault("timed out")
    }
}
