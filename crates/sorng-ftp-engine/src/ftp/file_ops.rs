//! Streaming transfers: RETR/STOR/APPE with resume, progress and
//! cooperative cancellation.
//!
//! Whatever happens, a transfer ends with a progress event of exactly 1.0
//! followed by a finished event. Uploads then refresh the remote listing.

use crate::ftp::client::{FtpClient, TRANSFER_COMPLETE};
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::events::EventEmitter;
use crate::ftp::transfer::DataCommand;
use crate::ftp::types::*;
use std::io::SeekFrom;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Emits progress fractions for one transfer.
struct ProgressTracker {
    events: EventEmitter,
    total: u64,
    done: u64,
    last: f64,
}

impl ProgressTracker {
    fn new(events: EventEmitter, total: u64, offset: u64) -> Self {
        Self {
            events,
            total,
            done: offset,
            last: 0.0,
        }
    }

    fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.done as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    fn report(&mut self) {
        self.last = self.fraction().max(self.last);
        self.events.progress(self.last);
    }

    fn advance(&mut self, n: usize) {
        self.done += n as u64;
        self.report();
    }

    fn finish(&mut self) {
        self.last = 1.0;
        self.events.progress(1.0);
        self.events.transfer_finished();
    }
}

impl FtpClient {
    // ─── DOWNLOAD (RETR) ─────────────────────────────────────────

    /// Download `spec.remote_path` into `spec.local_path`, resuming at
    /// `spec.offset` via REST when it is non-zero.
    pub async fn download(
        &mut self,
        spec: &TransferSpec,
        cancel: &CancelToken,
    ) -> FtpResult<TransferOutcome> {
        let mut progress = ProgressTracker::new(self.events.clone(), spec.total_size, spec.offset);
        let result = self.download_inner(spec, cancel, &mut progress).await;
        progress.finish();
        if let Ok(outcome) = &result {
            log::info!(
                "[ftp:{}] download {} {:?} ({} bytes)",
                self.id,
                spec.remote_path,
                outcome,
                progress.done - spec.offset
            );
        }
        result
    }

    async fn download_inner(
        &mut self,
        spec: &TransferSpec,
        cancel: &CancelToken,
        progress: &mut ProgressTracker,
    ) -> FtpResult<TransferOutcome> {
        if spec.is_resume() {
            self.rest(spec.offset).await?;
        }
        let mut data = self
            .open_data_channel(&DataCommand::Retr(spec.remote_path.clone()))
            .await?;

        let opened = if spec.is_resume() {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&spec.local_path)
                .await
        } else {
            fs::File::create(&spec.local_path).await
        };
        let mut file = match opened {
            Ok(f) => f,
            Err(e) => {
                drop(data);
                self.drain_reply().await;
                return Err(FtpError::local_io(e));
            }
        };

        progress.report();
        let streamed = self.receive(&mut data, &mut file, cancel, progress).await;
        drop(data);
        let flushed = file.flush().await.map_err(FtpError::local_io);
        drop(file);

        self.finish_stream(streamed.and_then(|o| flushed.map(|_| o))).await
    }

    async fn receive(
        &self,
        data: &mut TcpStream,
        file: &mut fs::File,
        cancel: &CancelToken,
        progress: &mut ProgressTracker,
    ) -> FtpResult<TransferOutcome> {
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let limit = self.config.data_timeout();
        loop {
            if cancel.take() {
                return Ok(TransferOutcome::Cancelled);
            }
            let n = tokio::select! {
                biased;
                _ = cancel.notified() => continue,
                read = timeout(limit, data.read(&mut buf)) => read??,
            };
            if n == 0 {
                return Ok(TransferOutcome::Completed);
            }
            file.write_all(&buf[..n]).await.map_err(FtpError::local_io)?;
            progress.advance(n);
        }
    }

    // ─── UPLOAD (STOR / APPE) ────────────────────────────────────

    /// Upload `spec.local_path`. A non-zero offset skips that many local
    /// bytes and appends the rest with APPE.
    pub async fn upload(
        &mut self,
        spec: &TransferSpec,
        cancel: &CancelToken,
    ) -> FtpResult<TransferOutcome> {
        let mut progress = ProgressTracker::new(self.events.clone(), spec.total_size, spec.offset);
        let result = self.upload_inner(spec, cancel, &mut progress).await;
        progress.finish();
        if let Ok(outcome) = &result {
            log::info!(
                "[ftp:{}] upload {} {:?} ({} bytes)",
                self.id,
                spec.remote_path,
                outcome,
                progress.done - spec.offset
            );
        }

        let refresh = match &result {
            Err(e) if e.is_fatal() => Ok(()),
            _ => self.refresh_listing().await,
        };
        FtpError::combine(result, refresh)
    }

    async fn upload_inner(
        &mut self,
        spec: &TransferSpec,
        cancel: &CancelToken,
        progress: &mut ProgressTracker,
    ) -> FtpResult<TransferOutcome> {
        let mut file = fs::File::open(&spec.local_path)
            .await
            .map_err(FtpError::local_io)?;
        if spec.is_resume() {
            file.seek(SeekFrom::Start(spec.offset))
                .await
                .map_err(FtpError::local_io)?;
        }

        let trigger = if spec.is_resume() {
            DataCommand::Appe(spec.remote_path.clone())
        } else {
            DataCommand::Stor(spec.remote_path.clone())
        };
        let mut data = self.open_data_channel(&trigger).await?;

        progress.report();
        let streamed = self.send(&mut data, &mut file, cancel, progress).await;
        let _ = timeout(self.config.data_timeout(), data.shutdown()).await;
        drop(data);
        drop(file);

        self.finish_stream(streamed).await
    }

    async fn send(
        &self,
        data: &mut TcpStream,
        file: &mut fs::File,
        cancel: &CancelToken,
        progress: &mut ProgressTracker,
    ) -> FtpResult<TransferOutcome> {
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let limit = self.config.data_timeout();
        loop {
            if cancel.take() {
                return Ok(TransferOutcome::Cancelled);
            }
            let n = file.read(&mut buf).await.map_err(FtpError::local_io)?;
            if n == 0 {
                return Ok(TransferOutcome::Completed);
            }
            timeout(limit, data.write_all(&buf[..n])).await??;
            progress.advance(n);
        }
    }

    // ─── Completion ──────────────────────────────────────────────

    /// Read the completion reply after the data socket has been closed.
    /// Early stops still drain whatever the server replies so the next
    /// command sees its own reply.
    async fn finish_stream(
        &mut self,
        streamed: FtpResult<TransferOutcome>,
    ) -> FtpResult<TransferOutcome> {
        match streamed {
            Ok(TransferOutcome::Completed) => {
                let resp = self.read_reply(TRANSFER_COMPLETE).await?;
                self.events.info(resp.summary());
                Ok(TransferOutcome::Completed)
            }
            Ok(TransferOutcome::Cancelled) => {
                log::info!("[ftp:{}] transfer cancelled", self.id);
                self.drain_reply().await;
                Ok(TransferOutcome::Cancelled)
            }
            Err(e) => {
                if !e.is_fatal() {
                    self.drain_reply().await;
                }
                Err(e)
            }
        }
    }
}
