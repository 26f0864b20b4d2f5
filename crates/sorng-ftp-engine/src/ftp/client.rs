//! Control channel: owns the control connection and issues commands.
//!
//! Lifecycle: `connect()` → `login()` → command helpers → `quit()`.
//!
//! Every helper sends one line and accepts a fixed set of reply codes.
//! Accepted replies are echoed as debug events; a code outside the set
//! becomes a `ProtocolError` and emits nothing.

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::events::EventEmitter;
use crate::ftp::protocol::{self, FtpCodec};
use crate::ftp::types::*;
use std::net::SocketAddr;

/// Replies that open a data transfer.
pub const PRELIMINARY: &[i32] = &[125, 150];
/// Reply closing a data transfer.
pub const TRANSFER_COMPLETE: &[i32] = &[226];

/// A connected FTP control channel.
pub struct FtpClient {
    pub id: String,
    codec: FtpCodec,
    pub(crate) events: EventEmitter,
    pub(crate) config: FtpEngineConfig,
    pub mode: DataChannelMode,
    /// Last directory reported by PWD.
    pub current_directory: String,
}

impl FtpClient {
    /// Open the control connection. Nothing is read or sent yet.
    pub async fn connect(
        id: impl Into<String>,
        server: &ServerInfo,
        mode: DataChannelMode,
        config: FtpEngineConfig,
        events: EventEmitter,
    ) -> FtpResult<Self> {
        let codec = connection::connect(server, config.control_timeout()).await?;
        Ok(Self {
            id: id.into(),
            codec,
            events,
            config,
            mode,
            current_directory: "/".into(),
        })
    }

    /// Banner (220), USER (331), PASS (230).
    pub async fn login(&mut self, server: &ServerInfo) -> FtpResult<()> {
        self.read_reply(&[220]).await?;
        self.command(&format!("USER {}", server.username), &[331]).await?;
        self.command(&format!("PASS {}", server.password), &[230]).await?;
        log::info!("[ftp:{}] logged in as {}", self.id, server.username);
        Ok(())
    }

    // ─── Exchange primitives ─────────────────────────────────────

    /// Parse `raw` and check it against `expected` (empty accepts anything).
    /// Accepted replies are emitted as debug events.
    pub fn unwrap(&self, raw: &[u8], expected: &[i32]) -> FtpResult<FtpResponse> {
        let resp = protocol::check_reply(protocol::parse_response(raw), expected)?;
        self.events.debug(resp.code, resp.detail.clone());
        Ok(resp)
    }

    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        self.codec.send_command(cmd).await
    }

    /// Receive the next reply and unwrap it.
    pub async fn read_reply(&mut self, expected: &[i32]) -> FtpResult<FtpResponse> {
        let raw = self.codec.read_reply().await?;
        self.unwrap(&raw, expected)
    }

    /// Send `cmd` and unwrap its reply.
    pub async fn command(&mut self, cmd: &str, expected: &[i32]) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_reply(expected).await
    }

    /// Read a reply the server owes us after a transfer stopped early,
    /// whatever its code. Failures are logged, not returned.
    pub async fn drain_reply(&mut self) {
        if let Err(e) = self.read_reply(&[]).await {
            log::warn!("[ftp:{}] could not drain pending reply: {}", self.id, e);
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.codec.local_addr()
    }

    // ─── Command helpers ─────────────────────────────────────────

    pub async fn syst(&mut self) -> FtpResult<FtpResponse> {
        self.command("SYST", &[215]).await
    }

    pub async fn type_image(&mut self) -> FtpResult<FtpResponse> {
        self.command("TYPE I", &[200]).await
    }

    /// PWD, returning the quoted directory.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        let resp = self.command("PWD", &[257]).await?;
        parse_pwd(&resp.detail)
    }

    pub async fn cwd(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("CWD {}", path), &[250]).await
    }

    pub async fn list(&mut self) -> FtpResult<FtpResponse> {
        self.command("LIST", PRELIMINARY).await
    }

    pub async fn retr(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("RETR {}", path), PRELIMINARY).await
    }

    pub async fn stor(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("STOR {}", path), PRELIMINARY).await
    }

    pub async fn appe(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("APPE {}", path), PRELIMINARY).await
    }

    pub async fn rest(&mut self, offset: u64) -> FtpResult<FtpResponse> {
        self.command(&format!("REST {}", offset), &[350]).await
    }

    pub async fn dele(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("DELE {}", path), &[250]).await
    }

    pub async fn mkd(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("MKD {}", path), &[257]).await
    }

    pub async fn rmd(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("RMD {}", path), &[250]).await
    }

    pub async fn rnfr(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("RNFR {}", path), &[350]).await
    }

    pub async fn rnto(&mut self, path: &str) -> FtpResult<FtpResponse> {
        self.command(&format!("RNTO {}", path), &[250]).await
    }

    // ─── QUIT ────────────────────────────────────────────────────

    /// Best-effort QUIT, then close. Never fails.
    pub async fn quit(mut self) {
        if let Err(e) = self.codec.send_command("QUIT").await {
            log::warn!("[ftp:{}] QUIT not delivered: {}", self.id, e);
        }
        self.codec.shutdown().await;
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Extract the path from a PWD detail such as `"/pub" is current directory`.
/// A doubled quote inside the path stands for one quote (RFC 959).
pub fn parse_pwd(detail: &str) -> FtpResult<String> {
    let bad = || FtpError::protocol(257, format!("cannot parse PWD reply: {}", detail));
    let rest = detail.strip_prefix('"').ok_or_else(bad)?;
    let mut path = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                path.push('"');
                continue;
            }
            return Ok(path);
        }
        path.push(c);
    }
    Err(bad())
}
