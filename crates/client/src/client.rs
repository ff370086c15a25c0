//! Blocking battle client
//!
//! One background thread reads frames from the relay and publishes them into
//! a mutex-guarded shared block. The game loop polls that block once
//! per frame; it never blocks on the network except for its own writes.

use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::protocol::{
    recv_envelope, send_envelope, ControlSignal, Envelope, FramingError, StateSnapshot,
};
use crate::types::{CONNECT_TIMEOUT_MS, DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT, READ_TIMEOUT_MS};

/// Where and how to reach the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Silence longer than this ends the link. Keep it above the server's
    /// heartbeat interval.
    pub read_timeout: Duration,
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(READ_TIMEOUT_MS),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Create from environment variables
    ///
    /// - `TETRIS_BATTLE_SERVER` (default `127.0.0.1`)
    /// - `TETRIS_BATTLE_PORT` (default `5555`)
    /// - `TETRIS_BATTLE_CONNECT_TIMEOUT_MS` (default `30000`)
    /// - `TETRIS_BATTLE_READ_TIMEOUT_MS` (default `30000`)
    /// - `TETRIS_BATTLE_MAX_FRAME` (default 4 MiB)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        // Zero durations are rejected by the socket API.
        let millis = |key: &str| {
            value(key)
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
        };

        Self {
            host: value("TETRIS_BATTLE_SERVER").unwrap_or(defaults.host),
            port: value("TETRIS_BATTLE_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            connect_timeout: millis("TETRIS_BATTLE_CONNECT_TIMEOUT_MS")
                .unwrap_or(defaults.connect_timeout),
            read_timeout: millis("TETRIS_BATTLE_READ_TIMEOUT_MS").unwrap_or(defaults.read_timeout),
            max_frame_len: value("TETRIS_BATTLE_MAX_FRAME")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_frame_len),
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Why the initial connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("cannot resolve {target}: {reason}")]
    Resolve { target: String, reason: String },
    #[error("connection to {target} timed out")]
    Timeout { target: String },
    #[error("server at {target} refused the connection")]
    Refused { target: String },
    #[error("cannot connect to {target}: {reason}")]
    Other { target: String, reason: String },
}

impl ConnectError {
    fn from_io(target: &str, err: &io::Error) -> Self {
        let target = target.to_string();
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectError::Timeout { target },
            io::ErrorKind::ConnectionRefused => ConnectError::Refused { target },
            _ => ConnectError::Other {
                target,
                reason: err.to_string(),
            },
        }
    }
}

/// Why an established link ended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("server closed the connection")]
    PeerLost,
    #[error("no data from server for {0:?}")]
    Timeout(Duration),
    #[error("malformed data from server: {0}")]
    Framing(String),
    #[error("server already hosts a battle")]
    RosterFull,
    /// The relay went back to waiting after the battle had started.
    #[error("opponent left the battle")]
    OpponentLeft,
    #[error("network error: {0}")]
    Io(String),
}

impl LinkError {
    fn from_framing(err: FramingError, read_timeout: Duration) -> Self {
        if err.is_timeout() {
            return LinkError::Timeout(read_timeout);
        }
        match err {
            FramingError::Closed | FramingError::Incomplete { .. } => LinkError::PeerLost,
            FramingError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => LinkError::PeerLost,
                _ => LinkError::Io(e.to_string()),
            },
            other => LinkError::Framing(other.to_string()),
        }
    }
}

/// State shared between the receive thread and the game loop.
#[derive(Debug, Default)]
struct LinkShared {
    connected: bool,
    waiting: bool,
    started: bool,
    /// Latched by the first `WAITING` after `STARTED`.
    opponent_left: bool,
    remote: Option<StateSnapshot>,
    error: Option<LinkError>,
}

impl LinkShared {
    /// Enter the terminal state. The first recorded error wins.
    fn close(&mut self, error: Option<LinkError>) {
        self.connected = false;
        if self.error.is_none() {
            self.error = error;
        }
    }
}

fn lock(shared: &Mutex<LinkShared>) -> MutexGuard<'_, LinkShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection to the battle relay.
///
/// ```no_run
/// use tetris_battle_client::{BattleClient, ClientConfig};
///
/// let client = BattleClient::connect(ClientConfig::new("127.0.0.1", 5555));
/// if let Some(err) = client.connection_error() {
///     eprintln!("{err}");
/// }
/// ```
#[derive(Debug)]
pub struct BattleClient {
    config: ClientConfig,
    stream: Option<TcpStream>,
    shared: Arc<Mutex<LinkShared>>,
    closing: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
    connect_error: Option<ConnectError>,
}

impl BattleClient {
    /// Connect and start the receive thread. Never fails: check
    /// [`BattleClient::connection_error`] afterwards.
    pub fn connect(config: ClientConfig) -> Self {
        let mut client = Self {
            config,
            stream: None,
            shared: Arc::new(Mutex::new(LinkShared::default())),
            closing: Arc::new(AtomicBool::new(false)),
            receiver: None,
            connect_error: None,
        };

        let target = client.config.target();
        match open_stream(&client.config).and_then(|stream| client.attach(stream)) {
            Ok(()) => tracing::info!(%target, "connected to battle server"),
            Err(e) => {
                tracing::warn!(%target, error = %e, "battle connect failed");
                client.connect_error = Some(e);
            }
        }
        client
    }

    fn attach(&mut self, stream: TcpStream) -> Result<(), ConnectError> {
        let target = self.config.target();
        let setup = |e: io::Error| ConnectError::Other {
            target: target.clone(),
            reason: e.to_string(),
        };

        let _ = stream.set_nodelay(true);
        stream
            .set_read_timeout(Some(self.config.read_timeout))
            .map_err(setup)?;
        stream
            .set_write_timeout(Some(self.config.read_timeout))
            .map_err(setup)?;
        let reader = stream.try_clone().map_err(setup)?;

        lock(&self.shared).connected = true;
        let shared = Arc::clone(&self.shared);
        let closing = Arc::clone(&self.closing);
        let read_timeout = self.config.read_timeout;
        let max_len = self.config.max_frame_len;
        let handle = thread::Builder::new()
            .name("battle-recv".to_string())
            .spawn(move || receive_loop(reader, shared, closing, read_timeout, max_len));

        match handle {
            Ok(handle) => {
                self.receiver = Some(handle);
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                lock(&self.shared).connected = false;
                Err(setup(e))
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection_error(&self) -> Option<&ConnectError> {
        self.connect_error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    /// The server has told us we are alone on the roster.
    pub fn is_waiting(&self) -> bool {
        lock(&self.shared).waiting
    }

    pub fn is_started(&self) -> bool {
        lock(&self.shared).started
    }

    /// `WAITING` arrived after `STARTED`: the opponent disconnected. Stays
    /// set even if the relay has since paired us with someone new.
    pub fn opponent_left(&self) -> bool {
        lock(&self.shared).opponent_left
    }

    /// Why the link ended, if it ended on its own.
    pub fn link_error(&self) -> Option<LinkError> {
        lock(&self.shared).error.clone()
    }

    /// Take the newest opponent snapshot, if one arrived since the last call.
    pub fn take_remote_state(&self) -> Option<StateSnapshot> {
        lock(&self.shared).remote.take()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Send the local snapshot. No-op while disconnected; a write failure
    /// ends the link. Returns whether the frame was written.
    pub fn send(&mut self, snapshot: &StateSnapshot) -> bool {
        if !self.is_connected() {
            return false;
        }
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        let envelope = Envelope::State(snapshot.clone());
        match send_envelope(stream, &envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "battle send failed");
                let error = LinkError::from_framing(e, self.config.read_timeout);
                lock(&self.shared).close(Some(error));
                let _ = stream.shutdown(Shutdown::Both);
                false
            }
        }
    }

    /// Close the socket and join the receive thread. Idempotent.
    pub fn disconnect(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            // Unblocks the reader's pending read.
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                tracing::error!("battle receive thread panicked");
            }
        }
        lock(&self.shared).close(None);
    }
}

impl Drop for BattleClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn open_stream(config: &ClientConfig) -> Result<TcpStream, ConnectError> {
    let target = config.target();
    let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| ConnectError::Resolve {
            target: target.clone(),
            reason: e.to_string(),
        })?
        .collect();

    let mut last_err = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, config.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => ConnectError::from_io(&target, &e),
        None => ConnectError::Resolve {
            target,
            reason: "no addresses found".to_string(),
        },
    })
}

fn receive_loop(
    stream: TcpStream,
    shared: Arc<Mutex<LinkShared>>,
    closing: Arc<AtomicBool>,
    read_timeout: Duration,
    max_len: usize,
) {
    let mut reader = BufReader::new(stream);
    loop {
        match recv_envelope(&mut reader, max_len) {
            Ok(Envelope::Control { signal }) => {
                let mut link = lock(&shared);
                match signal {
                    ControlSignal::Waiting => {
                        if link.started && !link.opponent_left {
                            tracing::info!("opponent left the battle");
                            link.opponent_left = true;
                        }
                        link.waiting = true;
                    }
                    ControlSignal::Started => {
                        link.waiting = false;
                        link.started = true;
                    }
                    ControlSignal::RosterFull => {
                        link.close(Some(LinkError::RosterFull));
                        break;
                    }
                    ControlSignal::Heartbeat => {}
                }
            }
            Ok(Envelope::State(snapshot)) => {
                lock(&shared).remote = Some(snapshot);
            }
            Err(e) => {
                let error = if closing.load(Ordering::SeqCst) {
                    None
                } else {
                    tracing::info!(error = %e, "battle link ended");
                    Some(LinkError::from_framing(e, read_timeout))
                };
                lock(&shared).close(error);
                break;
            }
        }
    }
    let _ = reader.get_ref().shutdown(Shutdown::Both);
}
