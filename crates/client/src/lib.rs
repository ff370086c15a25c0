//! Battle client and session controller
//!
//! [`BattleClient`] is a blocking TCP client with a background receive
//! thread, meant to be polled from a game loop. [`BattleSession`] builds the
//! per-frame battle cycle on top of it.

pub mod client;
pub mod session;

pub use tetris_battle_protocol as protocol;
pub use tetris_battle_types as types;

pub use client::{BattleClient, ClientConfig, ConnectError, LinkError};
pub use session::{BattleSession, FrameOutcome, SessionConfig, Simulation, MIRROR_X_OFFSET};
