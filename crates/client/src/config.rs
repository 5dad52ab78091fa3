//! Client configuration and URL construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::ws::ReconnectConfig;

/// Retry tuning for the authenticated request client.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Fixed backoff before the single silent retry of a network error.
    pub network_retry_delay: Duration,
    /// Delay used for a 429 when the server sends no `Retry-After` header.
    pub rate_limit_default_delay: Duration,
    /// Total attempts allowed for a rate-limited request before giving up.
    pub rate_limit_max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_retry_delay: Duration::from_secs(1),
            rate_limit_default_delay: Duration::from_secs(5),
            rate_limit_max_attempts: 5,
        }
    }
}

/// Liveness tuning for the duplex connection.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between outbound pings.
    pub ping_interval: Duration,
    /// The connection is considered dead if nothing arrives for this long.
    pub idle_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL, e.g. `https://api.lancelink.dev`.
    pub base_url: String,
    /// Path of the WebSocket endpoint on the same host.
    pub ws_path: String,
    /// Override for the persistent storage directory (tests use a tempdir).
    pub storage_dir: Option<PathBuf>,
    pub retry: RetryConfig,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ws_path: "/ws".to_string(),
            storage_dir: None,
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    pub fn with_storage_dir(mut self, dir: PathBuf) -> Self {
        self.storage_dir = Some(dir);
        self
    }

    /// Join the base URL with a request path.
    pub fn api_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// WebSocket URL for the live connection (scheme rewritten to ws/wss).
    pub fn live_url(&self) -> String {
        let http = self.api_url(&self.ws_path);
        if http.starts_with("https://") {
            http.replacen("https://", "wss://", 1)
        } else if http.starts_with("http://") {
            http.replacen("http://", "ws://", 1)
        } else {
            format!("ws://{}", http.trim_start_matches('/'))
        }
    }
}
