//! Directory operations: LIST, CWD with resync, DELE, MKD, RMD, rename.

use crate::ftp::client::{FtpClient, TRANSFER_COMPLETE};
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::parser::split_listing;
use crate::ftp::protocol::RECV_BUFFER;
use crate::ftp::transfer::DataCommand;
use crate::ftp::types::FtpResponse;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

impl FtpClient {
    // ─── LIST ────────────────────────────────────────────────────

    /// LIST the current directory and return its raw lines.
    pub async fn list_directory(&mut self) -> FtpResult<Vec<String>> {
        let mut data = self.open_data_channel(&DataCommand::List).await?;
        let mut body = Vec::new();
        let mut buf = [0u8; RECV_BUFFER];
        loop {
            let n = timeout(self.config.data_timeout(), data.read(&mut buf)).await??;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }
        drop(data);

        let lines = split_listing(&body);
        self.read_reply(TRANSFER_COMPLETE).await?;
        log::debug!("[ftp:{}] LIST returned {} lines", self.id, lines.len());
        Ok(lines)
    }

    /// LIST and publish the result.
    pub async fn refresh_listing(&mut self) -> FtpResult<()> {
        let lines = self.list_directory().await?;
        self.events.remote_listing_changed(lines);
        Ok(())
    }

    /// Ask the server where we are, publish it, then publish its listing.
    pub async fn resync_directory(&mut self) -> FtpResult<()> {
        let path = self.pwd().await?;
        self.current_directory = path.clone();
        self.events.remote_dir_changed(path);
        self.refresh_listing().await
    }

    // ─── CWD ─────────────────────────────────────────────────────

    /// CWD to `path`. The view is resynchronised with the server whether or
    /// not the CWD was accepted, unless the connection is gone.
    pub async fn change_directory(&mut self, path: &str) -> FtpResult<()> {
        let cwd = self.cwd(path).await.map(|resp| {
            self.events.info(resp.summary());
        });
        if let Err(e) = &cwd {
            if e.is_fatal() {
                return cwd;
            }
        }
        let resync = self.resync_directory().await;
        FtpError::combine(cwd, resync)
    }

    // ─── Mutations ───────────────────────────────────────────────

    pub async fn delete(&mut self, path: &str) -> FtpResult<()> {
        let resp = self.dele(path).await?;
        self.after_mutation(resp).await
    }

    pub async fn make_directory(&mut self, path: &str) -> FtpResult<()> {
        let resp = self.mkd(path).await?;
        self.after_mutation(resp).await
    }

    pub async fn remove_directory(&mut self, path: &str) -> FtpResult<()> {
        let resp = self.rmd(path).await?;
        self.after_mutation(resp).await
    }

    /// RNFR then RNTO.
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.rnfr(from).await?;
        let resp = self.rnto(to).await?;
        self.after_mutation(resp).await
    }

    async fn after_mutation(&mut self, resp: FtpResponse) -> FtpResult<()> {
        self.events.info(resp.summary());
        self.refresh_listing().await
    }
}
