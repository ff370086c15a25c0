//! Tetris battle (workspace facade crate).
//!
//! Re-exports the battle crates under `crates/` as
//! `tetris_battle::{types, protocol, server, client}` and hosts the logging
//! setup shared by the binaries.

pub use tetris_battle_client as client;
pub use tetris_battle_protocol as protocol;
pub use tetris_battle_server as server;
pub use tetris_battle_types as types;

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
