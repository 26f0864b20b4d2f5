//! # sorng-ftp-engine, FTP client engine
//!
//! One control connection per session, driven by a single worker task.
//! Implements the RFC 959 subset needed for browsing and resumable
//! binary transfers over active (PORT) or passive (PASV) data channels.
//!
//! Architecture:
//! - `types`: config, transfer specs, lifecycle state
//! - `error`: error taxonomy and its mapping to events
//! - `events`: collaborator-facing events and the emitter
//! - `protocol`: reply parsing and the control-channel codec
//! - `connection`: TCP connect with timeout
//! - `client`: control channel: login, command helpers, QUIT
//! - `transfer`: data channel establishment (PORT / PASV)
//! - `parser`: LIST body splitting and `ls -l` line parsing
//! - `directory`: listing, CWD resync, DELE/MKD/RMD/RNFR+RNTO
//! - `file_ops`: streaming download/upload with resume and progress
//! - `session`: the session worker and its command handle

pub mod types;
pub mod error;
pub mod events;
pub mod protocol;
pub mod connection;
pub mod client;
pub mod transfer;
pub mod parser;
pub mod directory;
pub mod file_ops;
pub mod session;

pub use types::*;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use events::{EventEmitter, FtpEvent};
pub use parser::{FtpEntry, FtpEntryKind};
pub use session::{FtpSession, FtpSessionHandle, SessionCommand};
