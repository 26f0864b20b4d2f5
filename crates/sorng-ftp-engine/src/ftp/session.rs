//! Session worker: one task owns the control connection and executes
//! commands strictly one at a time.
//!
//! ```text
//!  FtpSessionHandle ──(bounded mpsc)──► FtpSession::run ──► FtpClient
//!        ▲                                   │
//!        └──────(unbounded mpsc, FtpEvent)───┘
//! ```
//!
//! Every command ends in at most one error event. A fatal error drops the
//! control connection on the spot (no QUIT) and leaves the session
//! `Broken` until the next `Connect`.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::events::{EventEmitter, FtpEvent};
use crate::ftp::types::*;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Commands sent *to* the session worker.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Connect {
        server: ServerInfo,
        mode: DataChannelMode,
    },
    ChangeDirectory(String),
    Download(TransferSpec),
    Upload(TransferSpec),
    Delete(String),
    MakeDirectory(String),
    RemoveDirectory(String),
    Rename {
        from: String,
        to: String,
    },
    Disconnect,
}

// ─── Worker ──────────────────────────────────────────────────────────

/// State owned by the worker task.
pub struct FtpSession {
    id: String,
    config: FtpEngineConfig,
    client: Option<FtpClient>,
    events: EventEmitter,
    cancel: CancelToken,
    state: SessionState,
}

impl FtpSession {
    pub fn new(
        id: impl Into<String>,
        config: FtpEngineConfig,
        events: EventEmitter,
        cancel: CancelToken,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            client: None,
            events,
            cancel,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Drain the command queue until every sender is gone, then shut down.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        log::debug!("[ftp:{}] worker started", self.id);
        while let Some(cmd) = cmd_rx.recv().await {
            self.execute(cmd).await;
        }
        self.shutdown().await;
        log::debug!("[ftp:{}] worker stopped", self.id);
    }

    /// Run one command and report its failure, if any.
    pub async fn execute(&mut self, cmd: SessionCommand) {
        if let Err(e) = self.dispatch(cmd).await {
            self.report(e);
        }
        if self.client.is_some() {
            self.state = SessionState::Ready;
        }
    }

    async fn dispatch(&mut self, cmd: SessionCommand) -> FtpResult<()> {
        match cmd {
            SessionCommand::Connect { server, mode } => return self.initialize(&server, mode).await,
            SessionCommand::Disconnect => {
                self.shutdown().await;
                return Ok(());
            }
            SessionCommand::Download(_) | SessionCommand::Upload(_) if self.client.is_some() => {
                self.state = SessionState::Transferring;
            }
            _ => {}
        }

        let cancel = self.cancel.clone();
        let client = self.client.as_mut().ok_or_else(FtpError::not_connected)?;
        match cmd {
            SessionCommand::ChangeDirectory(path) => client.change_directory(&path).await,
            SessionCommand::Download(spec) => client.download(&spec, &cancel).await.map(|_| ()),
            SessionCommand::Upload(spec) => client.upload(&spec, &cancel).await.map(|_| ()),
            SessionCommand::Delete(path) => client.delete(&path).await,
            SessionCommand::MakeDirectory(path) => client.make_directory(&path).await,
            SessionCommand::RemoveDirectory(path) => client.remove_directory(&path).await,
            SessionCommand::Rename { from, to } => client.rename(&from, &to).await,
            SessionCommand::Connect { .. } | SessionCommand::Disconnect => Ok(()),
        }
    }

    /// Connect, log in, switch to binary and show the root directory.
    /// An existing connection is shut down first.
    pub async fn initialize(&mut self, server: &ServerInfo, mode: DataChannelMode) -> FtpResult<()> {
        if self.client.is_some() {
            self.shutdown().await;
        }
        self.state = SessionState::Connecting;
        log::info!("[ftp:{}] connecting to {} ({:?})", self.id, server.address(), mode);

        let client = FtpClient::connect(
            self.id.clone(),
            server,
            mode,
            self.config.clone(),
            self.events.clone(),
        )
        .await?;
        let client = self.client.insert(client);

        client.login(server).await?;
        client.syst().await?;
        client.type_image().await?;
        client.change_directory("/").await?;
        log::info!("[ftp:{}] ready at {}", self.id, client.current_directory);
        Ok(())
    }

    /// Translate a failed command into its single error event. Fatal errors
    /// drop the control connection; a session without one keeps its state
    /// unless a connect attempt was under way.
    fn report(&mut self, err: FtpError) {
        if err.is_fatal() {
            log::error!("[ftp:{}] {}; closing control connection", self.id, err);
            let dropped = self.client.take().is_some();
            if dropped || self.state == SessionState::Connecting {
                self.state = SessionState::Broken;
            }
        } else {
            log::warn!("[ftp:{}] {}", self.id, err);
        }
        self.events.emit(err.to_event());
    }

    /// QUIT (best effort) and close. Safe to call repeatedly or on a
    /// broken session.
    pub async fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(client) = self.client.take() {
            client.quit().await;
        }
        // A cancel raised by disconnect() must not outlive the session.
        self.cancel.take();
        self.state = SessionState::Closed;
        self.events.info("Disconnected from server.");
        log::info!("[ftp:{}] disconnected", self.id);
    }
}

// ─── Handle ──────────────────────────────────────────────────────────

/// Collaborator-side handle to a running session worker.
///
/// Commands are queued and return as soon as the worker has accepted them;
/// outcomes arrive as [`FtpEvent`]s. Dropping the handle shuts the
/// session down.
pub struct FtpSessionHandle {
    /// Unique session id.
    pub id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
    cancel: CancelToken,
    task: JoinHandle<()>,
}

impl FtpSessionHandle {
    /// Spawn a worker on the current tokio runtime.
    pub fn spawn(config: FtpEngineConfig) -> (Self, mpsc::UnboundedReceiver<FtpEvent>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (events, event_rx) = EventEmitter::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue_capacity.max(1));
        let cancel = CancelToken::new();

        let session = FtpSession::new(id.clone(), config, events, cancel.clone());
        let task = tokio::spawn(session.run(cmd_rx));
        log::debug!("[ftp:{}] session spawned", id);

        (
            Self {
                id,
                cmd_tx,
                cancel,
                task,
            },
            event_rx,
        )
    }

    async fn submit(&self, cmd: SessionCommand) -> FtpResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| FtpError::connection_fault("session worker has stopped"))
    }

    pub async fn connect(&self, server: ServerInfo, mode: DataChannelMode) -> FtpResult<()> {
        self.submit(SessionCommand::Connect { server, mode }).await
    }

    pub async fn change_directory(&self, path: impl Into<String>) -> FtpResult<()> {
        self.submit(SessionCommand::ChangeDirectory(path.into())).await
    }

    pub async fn download(
        &self,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
        size: u64,
    ) -> FtpResult<()> {
        self.resume_download(local, remote, size, 0).await
    }

    /// Download continuing after the `offset` bytes already on disk.
    pub async fn resume_download(
        &self,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
        size: u64,
        offset: u64,
    ) -> FtpResult<()> {
        let spec = TransferSpec::download(local, remote, size, offset)?;
        self.submit(SessionCommand::Download(spec)).await
    }

    pub async fn upload(
        &self,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
        size: u64,
    ) -> FtpResult<()> {
        self.resume_upload(local, remote, size, 0).await
    }

    /// Upload the local bytes from `offset` on, appending to the remote file.
    pub async fn resume_upload(
        &self,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
        size: u64,
        offset: u64,
    ) -> FtpResult<()> {
        let spec = TransferSpec::upload(local, remote, size, offset)?;
        self.submit(SessionCommand::Upload(spec)).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> FtpResult<()> {
        self.submit(SessionCommand::Delete(path.into())).await
    }

    pub async fn make_directory(&self, path: impl Into<String>) -> FtpResult<()> {
        self.submit(SessionCommand::MakeDirectory(path.into())).await
    }

    pub async fn remove_directory(&self, path: impl Into<String>) -> FtpResult<()> {
        self.submit(SessionCommand::RemoveDirectory(path.into())).await
    }

    pub async fn rename(&self, from: impl Into<String>, to: impl Into<String>) -> FtpResult<()> {
        self.submit(SessionCommand::Rename {
            from: from.into(),
            to: to.into(),
        })
        .await
    }

    /// Ask the running transfer to stop at its next chunk boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop any transfer, then close the session once queued commands ran.
    pub async fn disconnect(&self) -> FtpResult<()> {
        self.cancel.cancel();
        self.submit(SessionCommand::Disconnect).await
    }

    /// Close the command queue and wait for the worker to finish.
    pub async fn join(self) -> FtpResult<()> {
        let Self { cmd_tx, task, .. } = self;
        drop(cmd_tx);
        task.await
            .map_err(|e| FtpError::unexpected(format!("session worker panicked: {}", e)))
    }
}
