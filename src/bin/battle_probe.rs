//! Headless battle client for poking at a relay.
//!
//! ```text
//! battle-probe [--host HOST] [--port PORT] [--send]
//! ```
//!
//! Logs control transitions and a one-line summary of every opponent
//! snapshot. With `--send` it also publishes an empty board once per second
//! while the battle runs, so two probes can stand in for two players.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use tetris_battle::client::{BattleClient, ClientConfig};
use tetris_battle::protocol::StateSnapshot;

const POLL: Duration = Duration::from_millis(50);
const SEND_EVERY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProbeConfig {
    client: ClientConfig,
    send: bool,
}

fn parse_probe_args(args: &[String], base: ClientConfig) -> Result<ProbeConfig> {
    let mut client = base;
    let mut send = false;
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| anyhow!("probe: missing value for --host"))?;
                client.host = v.clone();
            }
            "--port" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| anyhow!("probe: missing value for --port"))?;
                client.port = v
                    .parse::<u16>()
                    .map_err(|_| anyhow!("probe: invalid --port value: {}", v))?;
            }
            "--send" => send = true,
            other => {
                return Err(anyhow!("probe: unknown argument: {}", other));
            }
        }
        i += 1;
    }

    Ok(ProbeConfig { client, send })
}

fn summarize(snapshot: &StateSnapshot) -> String {
    let filled = snapshot
        .grid
        .iter()
        .flatten()
        .filter(|&&code| code != 0)
        .count();
    let next: String = snapshot.next.kinds().map(|k| k.as_str()).collect();
    let held = snapshot.held_kind().map(|k| k.as_str()).unwrap_or("-");
    format!(
        "score {} level {} filled {}/{} next [{}] held {}",
        snapshot.score,
        snapshot.level,
        filled,
        snapshot.width() * snapshot.height(),
        next,
        held
    )
}

fn main() -> Result<()> {
    tetris_battle::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = parse_probe_args(&args, ClientConfig::from_env())?;

    let mut client = BattleClient::connect(config.client.clone());
    if let Some(err) = client.connection_error() {
        return Err(anyhow!("{err}"));
    }

    let mut waiting = false;
    let mut started = false;
    let mut last_send: Option<Instant> = None;
    let board = StateSnapshot::standard();

    while client.is_connected() {
        if client.is_waiting() != waiting {
            waiting = client.is_waiting();
            if waiting {
                tracing::info!("waiting for second player");
            }
        }
        if client.is_started() && !started {
            started = true;
            tracing::info!("battle started");
        }

        if let Some(snapshot) = client.take_remote_state() {
            tracing::info!("opponent: {}", summarize(&snapshot));
        }

        let due = last_send.map_or(true, |t| t.elapsed() >= SEND_EVERY);
        if config.send && started && !waiting && due {
            client.send(&board);
            last_send = Some(Instant::now());
        }

        thread::sleep(POLL);
    }

    match client.link_error() {
        Some(err) => {
            tracing::warn!(error = %err, "connection lost");
            Err(anyhow!("{err}"))
        }
        None => Ok(()),
    }
}
