//! Application wiring: transport selection, callbacks, and run loop.

use crate::config::AppConfig;
use crate::error::AppResult;
use skillswap_realtime::{
    Callbacks, FrameDraft, HealthMonitor, PreviewConfig, PreviewTransport, RealtimeClient,
    Transport, TransportMode, WebSocketTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Terminal client around one realtime connection.
pub struct Application {
    config: AppConfig,
    client: RealtimeClient,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let transport: Arc<dyn Transport> = match config.realtime.transport {
            TransportMode::Websocket => Arc::new(WebSocketTransport::new()),
            TransportMode::Preview => {
                info!("Preview mode: using the simulated server");
                Arc::new(PreviewTransport::new(PreviewConfig::default()))
            }
        };

        let callbacks = Callbacks::new()
            .label(config.label.clone())
            .on_connect(|| info!("Realtime connected"))
            .on_disconnect(|| info!("Realtime disconnected"))
            .on_error(|message| warn!(error = message, "Realtime error"))
            .on_message(|frame| {
                info!(kind = %frame.kind, data = %frame.data, "Incoming event");
            });

        let client = RealtimeClient::new(
            config.realtime.clone(),
            config.user_id,
            transport,
            callbacks,
            HealthMonitor::global(),
        );

        Self { config, client }
    }

    /// Connect, join the configured rooms, then run until Ctrl-C.
    pub async fn run(&self) -> AppResult<()> {
        self.client.connect();

        if !self.wait_until_connected(Duration::from_secs(15)).await {
            warn!(
                error = ?self.client.connection_error(),
                "Could not establish a connection; the client keeps retrying in the background"
            );
        } else {
            self.join_rooms();
        }

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        let diag = self.client.diagnostics();
        info!(
            state = %diag.state,
            reconnect_attempts = diag.reconnect_attempts,
            health_errors = diag.health.errors,
            "Final connection diagnostics"
        );
        self.client.disconnect();
        Ok(())
    }

    fn join_rooms(&self) {
        if let Some(conversation_id) = self.config.conversation_id {
            self.client.join_conversation(conversation_id);
            info!(conversation_id, "Joined conversation");

            if let Some(greeting) = &self.config.greeting {
                self.client.send(FrameDraft::new(
                    "send_message",
                    serde_json::json!({
                        "conversation_id": conversation_id.to_string(),
                        "content": greeting,
                    }),
                ));
            }
        }
        if let Some(post_id) = self.config.post_id {
            self.client.join_post(post_id);
            info!(post_id, "Joined post comment stream");
        }
    }

    async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.client.is_connected() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }
}
