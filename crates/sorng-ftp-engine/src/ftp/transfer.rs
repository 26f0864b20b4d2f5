//! Data-channel establishment for FTP transfers.
//!
//! - **PORT**: client opens a port, tells the server, accepts its connection
//! - **PASV**: server opens a port, client connects
//!
//! Either way the triggering command (LIST/RETR/STOR/APPE) has been sent and
//! its preliminary reply accepted by the time the socket is returned. The
//! completion reply is left for the caller.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::{DataChannelMode, FtpResponse};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;

lazy_static! {
    static ref PASV_ADDR: Regex =
        Regex::new(r"([0-9]+),([0-9]+),([0-9]+),([0-9]+),([0-9]+),([0-9]+)").unwrap();
}

/// The command that makes the server use the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataCommand {
    List,
    Retr(String),
    Stor(String),
    Appe(String),
}

impl DataCommand {
    async fn issue(&self, client: &mut FtpClient) -> FtpResult<FtpResponse> {
        match self {
            DataCommand::List => client.list().await,
            DataCommand::Retr(path) => client.retr(path).await,
            DataCommand::Stor(path) => client.stor(path).await,
            DataCommand::Appe(path) => client.appe(path).await,
        }
    }
}

impl FtpClient {
    /// Open a data channel with the session's mode and send `trigger`.
    pub async fn open_data_channel(&mut self, trigger: &DataCommand) -> FtpResult<TcpStream> {
        log::debug!("[ftp:{}] data channel ({:?}) for {:?}", self.id, self.mode, trigger);
        match self.mode {
            DataChannelMode::Active => open_port(self, trigger).await,
            DataChannelMode::Passive => open_pasv(self, trigger).await,
        }
    }
}

// ─── PASV ────────────────────────────────────────────────────────────

/// Issue `PASV`, connect to the advertised address, then send `trigger`.
async fn open_pasv(client: &mut FtpClient, trigger: &DataCommand) -> FtpResult<TcpStream> {
    let resp = client.command("PASV", &[227]).await?;
    let addr = parse_pasv(&resp.detail).ok_or_else(|| {
        FtpError::unexpected(format!("malformed PASV reply: {}", resp.detail))
    })?;

    let tcp = timeout(client.config.data_timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::connection_fault(format!("PASV connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection_fault(format!("PASV connect to {}: {}", addr, e)))?;

    trigger.issue(client).await?;
    Ok(tcp)
}

/// Pull `h1,h2,h3,h4,p1,p2` out of a 227 detail.
pub fn parse_pasv(detail: &str) -> Option<SocketAddrV4> {
    let caps = PASV_ADDR.captures(detail)?;
    let mut nums = [0u8; 6];
    for (i, slot) in nums.iter_mut().enumerate() {
        *slot = caps[i + 1].parse::<u8>().ok()?;
    }
    let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Some(SocketAddrV4::new(ip, port))
}

// ─── PORT ────────────────────────────────────────────────────────────

/// Listen on an ephemeral port, advertise it with `PORT`, send `trigger`,
/// then accept the server's connection.
async fn open_port(client: &mut FtpClient, trigger: &DataCommand) -> FtpResult<TcpStream> {
    let socket = TcpSocket::new_v4()?;
    socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    let listener = socket
        .listen(1)
        .map_err(|e| FtpError::connection_fault(format!("PORT listen: {}", e)))?;
    let port = listener.local_addr()?.port();

    let ip = match client.local_addr().ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .ok_or_else(|| FtpError::connection_fault("PORT requires an IPv4 control connection"))?,
    };

    client.command(&format_port(ip, port), &[200]).await?;
    trigger.issue(client).await?;

    let (tcp, peer) = timeout(client.config.data_timeout(), listener.accept())
        .await
        .map_err(|_| FtpError::connection_fault("PORT accept timed out"))?
        .map_err(|e| FtpError::connection_fault(format!("PORT accept: {}", e)))?;
    log::debug!("[ftp:{}] data connection from {}", client.id, peer);
    Ok(tcp)
}

/// `PORT h1,h2,h3,h4,p1,p2`.
pub fn format_port(ip: Ipv4Addr, port: u16) -> String {
    let o = ip.octets();
    format!(
        "PORT {},{},{},{},{},{}",
        o[0],
        o[1],
        o[2],
        o[3],
        port / 256,
        port % 256
    )
}
