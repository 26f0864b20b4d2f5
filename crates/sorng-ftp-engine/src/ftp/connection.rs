//! TCP transport: establishes the FTP control connection.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::ServerInfo;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Open the control connection and wrap it in a codec.
///
/// The welcome banner is left unread; login consumes it.
pub async fn connect(server: &ServerInfo, limit: Duration) -> FtpResult<FtpCodec> {
    if server.host.is_empty() {
        return Err(FtpError::connection_fault("host must not be empty"));
    }
    let addr = server.address();

    let tcp = timeout(limit, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::connection_fault(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection_fault(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();
    FtpCodec::from_tcp(tcp, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftp::error::FtpErrorKind;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn refused_connection_is_a_connection_fault() {
        // Grab a free port, then close it again.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let server = ServerInfo::new("127.0.0.1", port, "u", "p");
        let err = connect(&server, Duration::from_secs(2)).await.err().unwrap();
        assert_eq!(err.kind, FtpErrorKind::ConnectionFault);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn empty_host_is_rejected() {
        let server = ServerInfo::new("", 21, "u", "p");
        let err = connect(&server, Duration::from_secs(1)).await.err().unwrap();
        assert_eq!(err.message, "host must not be empty");
    }
}
