//! Public client handle for the realtime connection.
//!
//! One `RealtimeClient` represents the single logical connection for a
//! user session. The handle is cheap to clone-share behind an `Arc`; the
//! actual socket lives in a driver task that the handle steers through
//! commands and observes through shared state.

use crate::callbacks::Callbacks;
use crate::config::RealtimeConfig;
use crate::connection::{Command, ConnectionState, Driver, QueuedFrame, Shared};
use crate::frame::FrameDraft;
use crate::health::{HealthData, HealthMonitor};
use crate::rooms;
use crate::transport::Transport;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Snapshot of client state for debug surfaces.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub label: String,
    pub user_id: i64,
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub enabled: bool,
    pub generation: u64,
    pub connection_error: Option<String>,
    pub joined_conversations: Vec<i64>,
    pub joined_posts: Vec<i64>,
    pub health: HealthData,
}

/// Handle to the realtime connection for one user.
pub struct RealtimeClient {
    config: RealtimeConfig,
    user_id: i64,
    label: String,
    shared: Arc<Shared>,
    health: Arc<HealthMonitor>,
    commands: mpsc::UnboundedSender<Command>,
    outbound: mpsc::UnboundedSender<QueuedFrame>,
    shutdown: CancellationToken,
}

impl RealtimeClient {
    /// Create a client and spawn its driver task.
    ///
    /// The driver starts parked; call [`connect`](Self::connect) to open
    /// the socket. Production wiring passes `HealthMonitor::global()`;
    /// tests inject isolated instances.
    pub fn new(
        config: RealtimeConfig,
        user_id: i64,
        transport: Arc<dyn Transport>,
        callbacks: Callbacks,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let shared = Arc::new(Shared::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let label = callbacks.component_label().to_string();

        let driver = Driver::new(
            config.clone(),
            user_id,
            transport,
            callbacks,
            health.clone(),
            shared.clone(),
            command_rx,
            outbound_rx,
            shutdown.clone(),
        );
        tokio::spawn(driver.run());

        Self {
            config,
            user_id,
            label,
            shared,
            health,
            commands: command_tx,
            outbound: outbound_tx,
            shutdown,
        }
    }

    /// Request a connection.
    ///
    /// A no-op while a connection is already open or pending, so rapid
    /// repeated calls never create a second socket.
    pub fn connect(&self) {
        if !self.is_enabled() {
            debug!(label = %self.label, "Realtime disabled, not connecting");
            return;
        }
        if self.user_id <= 0 {
            warn!(label = %self.label, "Cannot connect without a valid user id");
            *self.shared.connection_error.write() = Some("missing user id".to_string());
            return;
        }
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(label = %self.label, "Connection already open or pending");
                return;
            }
            _ => {}
        }
        if self.shared.connect_pending.swap(true, Ordering::SeqCst) {
            debug!(label = %self.label, "Connect already requested");
            return;
        }
        let _ = self.commands.send(Command::Connect);
    }

    /// Tear down and retry from scratch: clears the health error state,
    /// resets the attempt counter, and opens a fresh socket.
    pub fn reconnect(&self) {
        self.health.reset_error_state();
        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        self.shared.enabled.store(true, Ordering::SeqCst);
        *self.shared.connection_error.write() = None;
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Kill-switch. `toggle(false)` closes the socket immediately and
    /// parks the client in the disabled state; `toggle(true)` re-enables
    /// and performs a full reconnect with counters reset.
    pub fn toggle(&self, enabled: bool) {
        if enabled {
            self.reconnect();
        } else {
            self.shared.enabled.store(false, Ordering::SeqCst);
            let _ = self.commands.send(Command::Disable);
        }
    }

    /// Close the socket and stop reconnecting.
    ///
    /// All pending timers (reconnect backoff, connect timeout, keep-alive)
    /// are cleared before the socket closes. The client stays usable: a
    /// later [`connect`](Self::connect) or [`reconnect`](Self::reconnect)
    /// opens a fresh socket. Dropping the handle tears the driver down
    /// for good.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Stamp and transmit a frame.
    ///
    /// Rejected with a logged warning when the connection is not open;
    /// the frame is dropped, never queued. Callers check `is_connected`
    /// first or accept best-effort delivery.
    pub fn send(&self, draft: FrameDraft) -> bool {
        if self.state() != ConnectionState::Connected {
            warn!(
                label = %self.label,
                kind = %draft.kind,
                "Not connected, frame not sent"
            );
            return false;
        }
        let frame = draft.stamp(self.user_id);
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(label = %self.label, error = %e, "Failed to encode frame");
                return false;
            }
        };
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.outbound
            .send(QueuedFrame { generation, text })
            .is_ok()
    }

    pub fn join_conversation(&self, conversation_id: i64) {
        if self.send(rooms::join_conversation_frame(conversation_id)) {
            self.shared.rooms.lock().join_conversation(conversation_id);
        }
    }

    pub fn leave_conversation(&self, conversation_id: i64) {
        self.shared.rooms.lock().leave_conversation(conversation_id);
        self.send(rooms::leave_conversation_frame(conversation_id));
    }

    pub fn join_post(&self, post_id: i64) {
        if self.send(rooms::join_post_frame(post_id)) {
            self.shared.rooms.lock().join_post(post_id);
        }
    }

    pub fn leave_post(&self, post_id: i64) {
        self.shared.rooms.lock().leave_post(post_id);
        self.send(rooms::leave_post_frame(post_id));
    }

    pub fn start_typing(&self, conversation_id: i64) {
        self.send(rooms::typing_start_frame(conversation_id));
    }

    pub fn stop_typing(&self, conversation_id: i64) {
        self.send(rooms::typing_stop_frame(conversation_id));
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.state() == ConnectionState::Reconnecting
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Last connection error shown to the user, if any.
    pub fn connection_error(&self) -> Option<String> {
        self.shared.connection_error.read().clone()
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Debug snapshot of connection and health state.
    pub fn diagnostics(&self) -> Diagnostics {
        let rooms = self.shared.rooms.lock();
        Diagnostics {
            label: self.label.clone(),
            user_id: self.user_id,
            state: self.state(),
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::SeqCst),
            enabled: self.is_enabled(),
            generation: self.shared.generation.load(Ordering::SeqCst),
            connection_error: self.connection_error(),
            joined_conversations: rooms.conversations(),
            joined_posts: rooms.posts(),
            health: self.health.health_data(),
        }
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("label", &self.label)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
