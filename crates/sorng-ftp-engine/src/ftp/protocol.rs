//! Control-channel codec and reply parsing (RFC 959 §4.2).
//!
//! A reply is scanned line by line (CRLF separated) for the first line that
//! is three digits followed by end-of-line or a space. Continuation lines
//! (`220-...`) never match, so a multi-line reply resolves to its final line.
//! A single trailing LF on a line is tolerated; some servers end replies
//! with a bare `\n`.
//!
//! The codec buffers the control stream: a receive that ends mid-reply is
//! topped up, and bytes belonging to the next reply stay buffered.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::FtpResponse;
use lazy_static::lazy_static;
use regex::Regex;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Size of a single control-channel receive.
pub const RECV_BUFFER: usize = 8192;

lazy_static! {
    static ref REPLY_LINE: Regex = Regex::new(r"^([0-9]{3})(?:$| (.*)$)").unwrap();
}

// ─── Parsing ─────────────────────────────────────────────────────────

/// Parse raw reply bytes. Never fails: undecodable or unmatched input
/// yields code -1 with an empty detail.
pub fn parse_response(raw: &[u8]) -> FtpResponse {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(_) => return FtpResponse::unparsable(),
    };
    for line in text.split("\r\n") {
        let line = line.strip_suffix('\n').unwrap_or(line);
        if let Some(caps) = REPLY_LINE.captures(line) {
            let code = caps[1].parse::<i32>().unwrap_or(-1);
            let detail = caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            return FtpResponse { code, detail };
        }
    }
    FtpResponse::unparsable()
}

/// Accept `resp` if `expected` is empty or contains its code.
pub fn check_reply(resp: FtpResponse, expected: &[i32]) -> FtpResult<FtpResponse> {
    if !expected.is_empty() && !expected.contains(&resp.code) {
        return Err(FtpError::protocol(resp.code, resp.detail));
    }
    Ok(resp)
}

/// Whether a line (without CRLF) terminates a reply.
fn is_reply_line(line: &[u8]) -> bool {
    line.len() >= 3
        && line[..3].iter().all(u8::is_ascii_digit)
        && (line.len() == 3 || line[3] == b' ')
}

/// Offset just past the line terminator (CRLF or bare LF) of the first
/// terminating line in `buf`.
pub fn reply_end(buf: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(pos) = buf[start..].iter().position(|&b| b == b'\n') {
        let end = start + pos + 1;
        let line = &buf[start..start + pos];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if is_reply_line(line) {
            return Some(end);
        }
        start = end;
    }
    None
}

/// Hide credentials in trace output.
fn loggable(cmd: &str) -> &str {
    if cmd.starts_with("PASS ") {
        "PASS ****"
    } else {
        cmd
    }
}

// ─── Codec ───────────────────────────────────────────────────────────

/// The FTP command/response codec operating on split halves.
pub struct FtpCodec {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    pending: Vec<u8>,
    local_addr: SocketAddr,
    timeout: Duration,
}

impl FtpCodec {
    /// Wrap a connected control socket. `timeout` bounds every read and write.
    pub fn from_tcp(stream: TcpStream, timeout: Duration) -> FtpResult<Self> {
        let local_addr = stream.local_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            pending: Vec::new(),
            local_addr,
            timeout,
        })
    }

    /// Local end of the control connection (the address PORT advertises).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one command line; CRLF is appended here.
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let line = format!("{}\r\n", cmd);
        timeout(self.timeout, self.writer.write_all(line.as_bytes())).await??;
        log::trace!(">>> {}", loggable(cmd));
        Ok(())
    }

    /// Read the raw bytes of the next complete reply.
    pub async fn read_reply(&mut self) -> FtpResult<Vec<u8>> {
        let mut buf = [0u8; RECV_BUFFER];
        loop {
            if let Some(end) = reply_end(&self.pending) {
                let raw: Vec<u8> = self.pending.drain(..end).collect();
                log::trace!("<<< {}", String::from_utf8_lossy(&raw).trim_end());
                return Ok(raw);
            }
            let n = timeout(self.timeout, self.reader.read(&mut buf)).await??;
            if n == 0 {
                if self.pending.is_empty() {
                    return Err(FtpError::connection_fault("server closed the control connection"));
                }
                // Parse whatever the server left behind before hanging up.
                return Ok(std::mem::take(&mut self.pending));
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Read and parse the next reply.
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let raw = self.read_reply().await?;
        Ok(parse_response(&raw))
    }

    /// Half-close the write side. Errors are ignored.
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}
