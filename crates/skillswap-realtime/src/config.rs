//! Connection configuration.

use serde::{Deserialize, Serialize};

/// Which transport the client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Real websocket connection to the backend.
    #[default]
    Websocket,
    /// Preview engine: simulated server, no network dependency.
    Preview,
}

/// Configuration for a realtime client.
///
/// Defaults mirror the values the production frontend shipped with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Base URL of the realtime endpoint (e.g. "ws://localhost:8000").
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Transport selection (websocket or preview).
    #[serde(default)]
    pub transport: TransportMode,
    /// Reconnect automatically after a non-normal close.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Base delay for exponential backoff (ms).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Maximum reconnection attempts before settling disconnected.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// How long to wait for the open handshake before forcing a retry (ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Keep-alive ping interval (ms). 0 disables keep-alive.
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
    /// Connection attempts allowed per rolling minute before the loop
    /// guard trips.
    #[serde(default = "default_max_connections_per_minute")]
    pub max_connections_per_minute: u32,
    /// Disable the client automatically when the health monitor reports
    /// an error loop.
    #[serde(default = "default_auto_disable_on_loop")]
    pub auto_disable_on_loop: bool,
    /// Verbose per-frame debug logging.
    #[serde(default)]
    pub debug: bool,
}

fn default_base_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_keep_alive_interval_ms() -> u64 {
    30_000
}

fn default_max_connections_per_minute() -> u32 {
    10
}

fn default_auto_disable_on_loop() -> bool {
    true
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            transport: TransportMode::default(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            max_connections_per_minute: default_max_connections_per_minute(),
            auto_disable_on_loop: default_auto_disable_on_loop(),
            debug: false,
        }
    }
}

impl RealtimeConfig {
    /// Build the connection URL for a user session.
    ///
    /// The endpoint is a single persistent socket per session, keyed by
    /// `user_id` in the query string.
    pub fn connection_url(&self, user_id: i64) -> String {
        let base = self.base_url.trim_end_matches('/');
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}/ws{sep}user_id={user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_delay_ms, 3_000);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.max_connections_per_minute, 10);
        assert_eq!(config.transport, TransportMode::Websocket);
    }

    #[test]
    fn test_connection_url() {
        let config = RealtimeConfig {
            base_url: "ws://localhost:8000".to_string(),
            ..Default::default()
        };
        assert_eq!(config.connection_url(7), "ws://localhost:8000/ws?user_id=7");
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: RealtimeConfig = toml::from_str(
            r#"
            base_url = "ws://chat.example.test"
            transport = "preview"
            keep_alive_interval_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "ws://chat.example.test");
        assert_eq!(config.transport, TransportMode::Preview);
        assert_eq!(config.keep_alive_interval_ms, 0);
        // Untouched fields keep their defaults.
        assert_eq!(config.max_reconnect_attempts, 5);
    }
}
