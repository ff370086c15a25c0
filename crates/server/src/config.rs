//! Relay configuration.

use std::time::Duration;

use crate::types::{
    DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT, HEARTBEAT_INTERVAL_MS, WAIT_NOTIFY_INTERVAL_MS,
};

/// Immutable relay settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Period of the "waiting for second player" resend while one player is connected.
    pub wait_notify_interval: Duration,
    /// Period of relay heartbeats while a battle is running.
    pub heartbeat_interval: Duration,
    /// Largest frame payload accepted from a player.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            wait_notify_interval: Duration::from_millis(WAIT_NOTIFY_INTERVAL_MS),
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    /// Create from environment variables, falling back to defaults.
    ///
    /// - `TETRIS_BATTLE_HOST` (default `0.0.0.0`)
    /// - `TETRIS_BATTLE_PORT` (default `5555`)
    /// - `TETRIS_BATTLE_WAIT_INTERVAL_MS` (default `5000`)
    /// - `TETRIS_BATTLE_HEARTBEAT_MS` (default `5000`)
    /// - `TETRIS_BATTLE_MAX_FRAME` (default 4 MiB)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let host = parse("TETRIS_BATTLE_HOST").unwrap_or(defaults.host);
        let port = parse("TETRIS_BATTLE_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);
        let wait_notify_interval = parse("TETRIS_BATTLE_WAIT_INTERVAL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.wait_notify_interval);
        let heartbeat_interval = parse("TETRIS_BATTLE_HEARTBEAT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.heartbeat_interval);
        let max_frame_len = parse("TETRIS_BATTLE_MAX_FRAME")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_frame_len);

        Self {
            host,
            port,
            wait_notify_interval,
            heartbeat_interval,
            max_frame_len,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
