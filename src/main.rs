//! Battle relay server (default binary).
//!
//! Configuration comes from `TETRIS_BATTLE_*` environment variables (see
//! [`ServerConfig::from_env`]); log verbosity from `RUST_LOG`.

use anyhow::Result;

use tetris_battle::server::{run_server_until, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tetris_battle::init_logging();

    let config = ServerConfig::from_env();
    tracing::info!(
        addr = %config.bind_addr(),
        wait_ms = config.wait_notify_interval.as_millis() as u64,
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        "starting battle server"
    );

    run_server_until(config, None, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!("battle server stopped");
    Ok(())
}
