//! In-process FTP server for driving sessions end to end.

#![allow(dead_code)]

use sorng_ftp_engine::*;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

/// Server content and behaviour knobs. Shared with every connection.
#[derive(Default)]
pub struct MockState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: Vec<String>,
    pub password: String,
    /// RETR sends this many bytes, then waits for the client to close the
    /// data socket and answers 426.
    pub hold_after: Option<usize>,
    /// Verb -> raw reply line, answered instead of the normal behaviour.
    pub overrides: HashMap<String, String>,
    pub commands: Vec<String>,
}

impl MockState {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.into(),
            dirs: vec!["/".into(), "/pub".into()],
            ..Default::default()
        }
    }

    pub fn with_file(mut self, name: &str, body: Vec<u8>) -> Self {
        self.files.insert(name.into(), body);
        self
    }

    pub fn with_override(mut self, verb: &str, reply: &str) -> Self {
        self.overrides.insert(verb.into(), reply.into());
        self
    }

    pub fn holding_after(mut self, n: usize) -> Self {
        self.hold_after = Some(n);
        self
    }
}

pub struct MockServer {
    pub port: u16,
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub async fn start(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(state));
        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                tokio::spawn(serve(sock, shared.clone()));
            }
        });
        Self { port, state }
    }

    pub fn server_info(&self, password: &str) -> ServerInfo {
        ServerInfo::new("127.0.0.1", self.port, "alice", password)
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(name).cloned()
    }
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// The client may already have dropped the control connection.
async fn reply(wr: &mut OwnedWriteHalf, line: &str) {
    let _ = wr.write_all(format!("{}\r\n", line).as_bytes()).await;
}

#[derive(Default)]
struct DataSetup {
    passive: Option<TcpListener>,
    active: Option<SocketAddr>,
}

impl DataSetup {
    async fn open(&mut self) -> TcpStream {
        if let Some(listener) = self.passive.take() {
            return listener.accept().await.unwrap().0;
        }
        let addr = self.active.take().expect("no PASV or PORT before transfer");
        TcpStream::connect(addr).await.unwrap()
    }
}

fn parse_port(arg: &str) -> SocketAddr {
    let n: Vec<u16> = arg.split(',').map(|p| p.trim().parse().unwrap()).collect();
    let ip = format!("{}.{}.{}.{}", n[0], n[1], n[2], n[3]);
    SocketAddr::new(ip.parse().unwrap(), n[4] * 256 + n[5])
}

async fn serve(sock: TcpStream, state: Arc<Mutex<MockState>>) {
    let (rd, mut wr) = sock.into_split();
    let mut lines = BufReader::new(rd).lines();
    let mut cwd = "/".to_string();
    let mut rest = 0usize;
    let mut data = DataSetup::default();

    // Multi-line banner exercises continuation handling.
    wr.write_all(b"220-Mock FTP\r\n220 Ready\r\n").await.unwrap();

    while let Ok(Some(line)) = lines.next_line().await {
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_string(), a.to_string()),
            None => (line.clone(), String::new()),
        };
        let overridden = {
            let mut st = state.lock().unwrap();
            st.commands.push(line.clone());
            st.overrides.get(&verb).cloned()
        };
        if let Some(r) = overridden {
            reply(&mut wr, &r).await;
            if r.starts_with("421") {
                return;
            }
            continue;
        }

        match verb.as_str() {
            "USER" => reply(&mut wr, "331 Please specify the password.").await,
            "PASS" => {
                let ok = state.lock().unwrap().password == arg;
                if ok {
                    reply(&mut wr, "230 Login successful.").await;
                } else {
                    reply(&mut wr, "530 Login incorrect.").await;
                }
            }
            "SYST" => reply(&mut wr, "215 UNIX Type: L8").await,
            "TYPE" => reply(&mut wr, "200 Switching to Binary mode.").await,
            "PWD" => reply(&mut wr, &format!("257 \"{}\" is the current directory", cwd)).await,
            "CWD" => {
                let known = state.lock().unwrap().dirs.contains(&arg);
                if known {
                    cwd = arg;
                    reply(&mut wr, "250 Directory successfully changed.").await;
                } else {
                    reply(&mut wr, "550 Failed to change directory.").await;
                }
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let p = listener.local_addr().unwrap().port();
                data.passive = Some(listener);
                reply(
                    &mut wr,
                    &format!("227 Entering Passive Mode (127,0,0,1,{},{}).", p / 256, p % 256),
                )
                .await;
            }
            "PORT" => {
                data.active = Some(parse_port(&arg));
                reply(&mut wr, "200 PORT command successful.").await;
            }
            "REST" => {
                rest = arg.parse().unwrap();
                reply(&mut wr, &format!("350 Restart position accepted ({}).", rest)).await;
            }
            "LIST" => {
                let listing: String = state
                    .lock()
                    .unwrap()
                    .files
                    .iter()
                    .map(|(name, body)| {
                        format!("-rw-r--r--    1 ftp      ftp  {:>8} Jan 01 12:00 {}\r\n", body.len(), name)
                    })
                    .collect();
                let mut sock = data.open().await;
                reply(&mut wr, "150 Here comes the directory listing.").await;
                sock.write_all(listing.as_bytes()).await.unwrap();
                drop(sock);
                reply(&mut wr, "226 Directory send OK.").await;
            }
            "RETR" => {
                let (body, hold) = {
                    let st = state.lock().unwrap();
                    (st.files.get(&arg).cloned(), st.hold_after)
                };
                let body = match body {
                    Some(b) => b,
                    None => {
                        data = DataSetup::default();
                        reply(&mut wr, "550 Failed to open file.").await;
                        continue;
                    }
                };
                let start = std::mem::take(&mut rest).min(body.len());
                let mut sock = data.open().await;
                reply(&mut wr, "150 Opening BINARY mode data connection.").await;
                let end = hold.map_or(body.len(), |n| (start + n).min(body.len()));
                for chunk in body[start..end].chunks(300) {
                    let _ = sock.write_all(chunk).await;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                if hold.is_some() {
                    let mut scratch = [0u8; 64];
                    let _ = sock.read(&mut scratch).await;
                    drop(sock);
                    reply(&mut wr, "426 Failure writing network stream.").await;
                } else {
                    drop(sock);
                    reply(&mut wr, "226 Transfer complete.").await;
                }
            }
            "STOR" | "APPE" => {
                let mut sock = data.open().await;
                reply(&mut wr, "150 Ok to send data.").await;
                let mut received = Vec::new();
                let _ = sock.read_to_end(&mut received).await;
                {
                    let mut st = state.lock().unwrap();
                    let file = st.files.entry(arg).or_default();
                    if verb == "STOR" {
                        file.clear();
                    }
                    file.extend_from_slice(&received);
                }
                reply(&mut wr, "226 Transfer complete.").await;
            }
            "DELE" => {
                let removed = state.lock().unwrap().files.remove(&arg).is_some();
                if removed {
                    reply(&mut wr, "250 Delete operation successful.").await;
                } else {
                    reply(&mut wr, "550 Delete operation failed.").await;
                }
            }
            "MKD" => {
                state.lock().unwrap().dirs.push(arg.clone());
                reply(&mut wr, &format!("257 \"{}\" created", arg)).await;
            }
            "RMD" => reply(&mut wr, "250 Remove directory operation successful.").await,
            "RNFR" => reply(&mut wr, "350 Ready for RNTO.").await,
            "RNTO" => reply(&mut wr, "250 Rename successful.").await,
            "QUIT" => {
                reply(&mut wr, "221 Goodbye.").await;
                return;
            }
            _ => reply(&mut wr, "502 Command not implemented.").await,
        }
    }
}

// ─── Event helpers ───────────────────────────────────────────────────

/// Collect events up to and including the first one matching `done`.
pub async fn collect_until<F>(rx: &mut UnboundedReceiver<FtpEvent>, done: F) -> Vec<FtpEvent>
where
    F: Fn(&FtpEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let ev = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for event; got {:?}", seen))
            .expect("event channel closed");
        let stop = done(&ev);
        seen.push(ev);
        if stop {
            return seen;
        }
    }
}

pub fn is_listing(ev: &FtpEvent) -> bool {
    matches!(ev, FtpEvent::RemoteListingChanged { .. })
}

pub fn is_finished(ev: &FtpEvent) -> bool {
    matches!(ev, FtpEvent::TransferFinished)
}

pub fn is_error(ev: &FtpEvent) -> bool {
    matches!(ev, FtpEvent::Error { .. })
}

pub fn progress_of(events: &[FtpEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            FtpEvent::TransferProgress { fraction } => Some(*fraction),
            _ => None,
        })
        .collect()
}

/// Spawn a session, connect it and wait for the initial listing.
pub async fn connected_session(
    server: &MockServer,
    mode: DataChannelMode,
    chunk_size: usize,
) -> (FtpSessionHandle, UnboundedReceiver<FtpEvent>, Vec<FtpEvent>) {
    let config = FtpEngineConfig {
        chunk_size,
        ..Default::default()
    };
    connected_session_with(server, mode, config).await
}

pub async fn connected_session_with(
    server: &MockServer,
    mode: DataChannelMode,
    config: FtpEngineConfig,
) -> (FtpSessionHandle, UnboundedReceiver<FtpEvent>, Vec<FtpEvent>) {
    let (handle, mut rx) = FtpSessionHandle::spawn(config);
    handle.connect(server.server_info("secret"), mode).await.unwrap();
    let events = collect_until(&mut rx, is_listing).await;
    (handle, rx, events)
}
