//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use skillswap_realtime::RealtimeConfig;
use std::path::Path;

/// Top-level configuration for the terminal client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Authenticated user id for the realtime session.
    pub user_id: i64,
    /// Component label used in connection log lines.
    #[serde(default = "default_label")]
    pub label: String,
    /// Conversation to join once connected, if any.
    #[serde(default)]
    pub conversation_id: Option<i64>,
    /// Post comment stream to join once connected, if any.
    #[serde(default)]
    pub post_id: Option<i64>,
    /// Message sent into the conversation after joining (preview demo).
    #[serde(default)]
    pub greeting: Option<String>,
    /// Realtime connection settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

fn default_label() -> String {
    "skillswap-client".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: 1,
            label: default_label(),
            conversation_id: None,
            post_id: None,
            greeting: None,
            realtime: RealtimeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a file if it exists, otherwise fall back to defaults.
    pub fn load(config_path: &str) -> AppResult<Self> {
        if Path::new(config_path).exists() {
            Self::from_file(config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillswap_realtime::TransportMode;

    #[test]
    fn test_minimal_config() {
        let config: AppConfig = toml::from_str("user_id = 7").unwrap();
        assert_eq!(config.user_id, 7);
        assert_eq!(config.label, "skillswap-client");
        assert!(config.conversation_id.is_none());
        assert_eq!(config.realtime.transport, TransportMode::Websocket);
    }

    #[test]
    fn test_full_config() {
        let config: AppConfig = toml::from_str(
            r#"
            user_id = 3
            label = "ChatPage"
            conversation_id = 12

            [realtime]
            base_url = "ws://chat.internal:8000"
            transport = "preview"
            max_reconnect_attempts = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.label, "ChatPage");
        assert_eq!(config.conversation_id, Some(12));
        assert_eq!(config.realtime.transport, TransportMode::Preview);
        assert_eq!(config.realtime.max_reconnect_attempts, 8);
    }
}
