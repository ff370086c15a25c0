//! Roster and pairing state machine.
//!
//! ```text
//! LISTENING -> PAIRING (0 or 1 players) -> RELAYING (2 players, STARTED sent)
//!                   ^                            |
//!                   +------- a player leaves ----+
//! ```
//!
//! All roster reads and writes go through one `std::sync::Mutex`. The lock is
//! never held across an `.await`: broadcasting only pushes pre-encoded frames
//! onto each member's unbounded outbound queue, and the member's writer task
//! does the socket I/O.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::protocol::{encode_envelope, encode_frame, ControlSignal, Envelope, FramingError};
use crate::types::ROSTER_CAPACITY;

/// A fully encoded frame (prefix + payload), shared between recipients.
pub type Frame = Arc<[u8]>;

/// Encode a control signal as a ready-to-write frame.
pub fn control_frame(signal: ControlSignal) -> Result<Frame, FramingError> {
    let payload = encode_envelope(&Envelope::control(signal))?;
    Ok(encode_frame(&payload)?.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fewer than two players; the waiting notifier runs while one is present.
    Pairing,
    /// Two players; frames are relayed and heartbeats run.
    Relaying,
}

/// One connected player.
#[derive(Debug)]
pub struct Member {
    pub id: u64,
    pub addr: SocketAddr,
    tx: mpsc::UnboundedSender<Frame>,
}

#[derive(Debug)]
struct Roster {
    members: Vec<Member>,
    phase: Phase,
    pairings: u64,
    notifier: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Roster {
    fn broadcast(&self, frame: &Frame, except: Option<u64>) -> usize {
        let mut sent = 0;
        for member in self.members.iter().filter(|m| Some(m.id) != except) {
            // A closed queue means the writer already failed; its connection
            // task removes the member.
            if member.tx.send(Arc::clone(frame)).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    fn addrs(&self) -> Vec<SocketAddr> {
        self.members.iter().map(|m| m.addr).collect()
    }

    fn stop_notifier(&mut self) {
        if let Some(task) = self.notifier.take() {
            task.abort();
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }
}

/// Shared relay state: configuration, roster and the periodic tasks.
#[derive(Debug)]
pub struct Relay {
    config: ServerConfig,
    roster: Mutex<Roster>,
    next_id: AtomicU64,
    waiting_frame: Frame,
    started_frame: Frame,
    heartbeat_frame: Frame,
}

impl Relay {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, FramingError> {
        Ok(Arc::new(Self {
            config,
            roster: Mutex::new(Roster {
                members: Vec::with_capacity(ROSTER_CAPACITY),
                phase: Phase::Pairing,
                pairings: 0,
                notifier: None,
                heartbeat: None,
            }),
            next_id: AtomicU64::new(1),
            waiting_frame: control_frame(ControlSignal::Waiting)?,
            started_frame: control_frame(ControlSignal::Started)?,
            heartbeat_frame: control_frame(ControlSignal::Heartbeat)?,
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of times the roster has reached two players (one STARTED each).
    pub fn pairings(&self) -> u64 {
        self.lock().pairings
    }

    /// Add a player. Returns `None` when the roster is full.
    ///
    /// Must be called inside a tokio runtime: reaching one player starts the
    /// waiting notifier, reaching two starts the heartbeat.
    pub fn join(
        self: &Arc<Self>,
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<Frame>,
    ) -> Option<u64> {
        let mut roster = self.lock();
        if roster.members.len() >= ROSTER_CAPACITY {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        roster.members.push(Member { id, addr, tx });
        tracing::info!(id, peer = %addr, roster = ?roster.addrs(), "player joined");

        match roster.members.len() {
            1 => self.enter_pairing(&mut roster),
            _ => self.enter_relaying(&mut roster),
        }
        Some(id)
    }

    /// Remove a player. Idempotent; returns whether it was present.
    pub fn leave(self: &Arc<Self>, id: u64) -> bool {
        let mut roster = self.lock();
        let before = roster.members.len();
        roster.members.retain(|m| m.id != id);
        if roster.members.len() == before {
            return false;
        }
        tracing::info!(id, roster = ?roster.addrs(), "player left");

        match roster.members.len() {
            0 => {
                roster.stop_notifier();
                roster.stop_heartbeat();
                roster.phase = Phase::Pairing;
            }
            _ => self.enter_pairing(&mut roster),
        }
        true
    }

    /// Forward a frame from `from` to every other player. Never echoes.
    pub fn relay_from(&self, from: u64, frame: &Frame) -> usize {
        self.lock().broadcast(frame, Some(from))
    }

    /// Drop every member and stop the periodic tasks.
    pub fn shutdown(&self) {
        let mut roster = self.lock();
        roster.stop_notifier();
        roster.stop_heartbeat();
        roster.members.clear();
        roster.phase = Phase::Pairing;
    }

    fn enter_pairing(self: &Arc<Self>, roster: &mut Roster) {
        roster.phase = Phase::Pairing;
        roster.stop_heartbeat();
        roster.stop_notifier();
        roster.notifier = Some(tokio::spawn(notify_waiting(Arc::clone(self))));
    }

    fn enter_relaying(self: &Arc<Self>, roster: &mut Roster) {
        roster.stop_notifier();
        roster.phase = Phase::Relaying;
        roster.pairings += 1;
        let sent = roster.broadcast(&self.started_frame, None);
        tracing::info!(pairing = roster.pairings, sent, "both players present, battle started");
        roster.stop_heartbeat();
        roster.heartbeat = Some(tokio::spawn(heartbeat(Arc::clone(self))));
    }
}

/// Resend WAITING until a second player arrives. The first tick fires at once.
async fn notify_waiting(relay: Arc<Relay>) {
    let mut ticker = tokio::time::interval(relay.config.wait_notify_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let sent = {
            let roster = relay.lock();
            if roster.phase != Phase::Pairing || roster.members.is_empty() {
                break;
            }
            roster.broadcast(&relay.waiting_frame, None)
        };
        tracing::debug!(sent, "sent waiting notice");
    }
}

/// Keepalive while relaying. Skips the immediate first tick.
async fn heartbeat(relay: Arc<Relay>) {
    let mut ticker = tokio::time::interval(relay.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let roster = relay.lock();
        if roster.phase != Phase::Relaying {
            break;
        }
        roster.broadcast(&relay.heartbeat_frame, None);
        drop(roster);
    }
}
