//! Two-player battle relay
//!
//! The server keeps a roster of at most two players and never looks inside
//! their payloads:
//!
//! - one player connected: `WAITING` is resent every
//!   [`ServerConfig::wait_notify_interval`], starting immediately
//! - second player joins: the notifier stops and `STARTED` goes to both,
//!   exactly once per pairing
//! - while paired: every frame from one player is forwarded to the other
//!   (never echoed), and `HEARTBEAT` keeps idle links alive
//! - a player leaves: the survivor is back to receiving `WAITING`
//! - a third connector gets `ROSTER_FULL` and is closed
//!
//! ```no_run
//! use tetris_battle_server::{run_server, ServerConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! run_server(ServerConfig::from_env(), None).await
//! # }
//! ```

pub mod config;
pub mod relay;
pub mod server;

pub use tetris_battle_protocol as protocol;
pub use tetris_battle_types as types;

pub use config::ServerConfig;
pub use relay::{Phase, Relay};
pub use server::{run_server, run_server_until, serve};
