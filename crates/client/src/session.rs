//! Battle session controller
//!
//! Pairs one locally played [`Simulation`] with a mirror of the opponent and
//! drives both once per rendered frame:
//!
//! 1. apply the newest opponent snapshot (if any) to the mirror
//! 2. advance the local simulation one tick
//! 3. send the local snapshot
//! 4. render local at x = 0 and the mirror at [`SessionConfig::mirror_x_offset`]
//!
//! The mirror is a display buffer only; it is never ticked.
//!
//! Once the battle has started, the opponent disconnecting ends the session
//! just like losing the relay: the relay keeps this player and resumes
//! `WAITING`, which the session reports as [`LinkError::OpponentLeft`].

use crate::client::{BattleClient, ClientConfig, ConnectError, LinkError};
use crate::protocol::StateSnapshot;
use crate::types::GameAction;

/// Horizontal offset of the opponent's board.
pub const MIRROR_X_OFFSET: i32 = 650;

/// The game model the session drives. Implemented by the front end.
pub trait Simulation {
    /// Whatever the front end draws into.
    type Target;

    fn advance_one_tick(&mut self);
    fn apply_input(&mut self, action: GameAction);

    /// Grid, score, level, upcoming and held pieces.
    fn observable_state(&self) -> StateSnapshot;

    /// Replace the observable fields with a peer's snapshot.
    fn overwrite_observable(&mut self, state: &StateSnapshot);

    fn is_over(&self) -> bool;
    fn render(&self, target: &mut Self::Target, x_offset: i32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub client: ClientConfig,
    pub mirror_x_offset: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            mirror_x_offset: MIRROR_X_OFFSET,
        }
    }
}

impl SessionConfig {
    pub fn new(client: ClientConfig) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }
}

/// Result of one [`BattleSession::frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Never connected. Show the error and return to the menu.
    ConnectFailed(ConnectError),
    /// The link ended. Leave the battle loop.
    ConnectionLost(LinkError),
    /// Connected, opponent not there yet. Nothing was sent.
    Waiting,
    Running,
    /// Local game ended on this frame.
    GameOver { score: u32 },
}

impl FrameOutcome {
    /// True once the battle loop should stop calling `frame`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FrameOutcome::Waiting | FrameOutcome::Running)
    }
}

pub struct BattleSession<S: Simulation> {
    config: SessionConfig,
    client: BattleClient,
    local: S,
    mirror: S,
    lost: Option<LinkError>,
}

impl<S: Simulation> BattleSession<S> {
    /// Connect to the relay. Connection failures surface from the first
    /// [`BattleSession::frame`].
    pub fn start(config: SessionConfig, local: S, mirror: S) -> Self {
        let client = BattleClient::connect(config.client.clone());
        Self {
            config,
            client,
            local,
            mirror,
            lost: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client(&self) -> &BattleClient {
        &self.client
    }

    pub fn local(&self) -> &S {
        &self.local
    }

    pub fn mirror(&self) -> &S {
        &self.mirror
    }

    /// Forward player input to the local simulation.
    pub fn apply_input(&mut self, action: GameAction) {
        self.local.apply_input(action);
    }

    pub fn frame(&mut self, target: &mut S::Target) -> FrameOutcome {
        if let Some(err) = self.client.connection_error() {
            return FrameOutcome::ConnectFailed(err.clone());
        }
        if let Some(reason) = &self.lost {
            return FrameOutcome::ConnectionLost(reason.clone());
        }
        if !self.client.is_connected() {
            let reason = self.client.link_error().unwrap_or(LinkError::PeerLost);
            return FrameOutcome::ConnectionLost(reason);
        }
        if self.client.opponent_left() {
            tracing::info!("opponent left, ending battle");
            self.client.disconnect();
            self.lost = Some(LinkError::OpponentLeft);
            return FrameOutcome::ConnectionLost(LinkError::OpponentLeft);
        }
        if self.client.is_waiting() || !self.client.is_started() {
            return FrameOutcome::Waiting;
        }
        if self.local.is_over() {
            return FrameOutcome::GameOver {
                score: self.local.observable_state().score,
            };
        }

        if let Some(remote) = self.client.take_remote_state() {
            self.mirror.overwrite_observable(&remote);
        }

        self.local.advance_one_tick();
        let snapshot = self.local.observable_state();
        self.client.send(&snapshot);

        self.local.render(target, 0);
        self.mirror.render(target, self.config.mirror_x_offset);

        if self.local.is_over() {
            tracing::info!(score = snapshot.score, "battle over");
            FrameOutcome::GameOver {
                score: snapshot.score,
            }
        } else {
            FrameOutcome::Running
        }
    }

    /// Disconnect (the player pressed escape) and hand back both simulations.
    pub fn leave(mut self) -> (S, S) {
        self.client.disconnect();
        (self.local, self.mirror)
    }
}
