//! Connection lifecycle driver.
//!
//! One driver task owns the transport for a client: it opens the socket,
//! runs the session loop, and walks the reconnect/backoff path on failure.
//! At most one connection is live or pending per driver; the handle talks
//! to it through commands and shared state.

use crate::backoff::ReconnectPolicy;
use crate::callbacks::Callbacks;
use crate::config::RealtimeConfig;
use crate::error::{close_code_reason, RealtimeError};
use crate::frame::{pong_frame, Frame, EVENT_PING, EVENT_PONG, EVENT_SYSTEM};
use crate::health::HealthMonitor;
use crate::loop_guard::AttemptWindow;
use crate::rooms::RoomTracker;
use crate::transport::{BoxedWriter, Transport, TransportEvent, TransportReader, TransportWriter};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state observable by the owning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disabled,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Directives from the handle to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Connect,
    Reconnect,
    /// Close the socket and park without reconnecting. The client can
    /// connect again later; only dropping the handle is terminal.
    Disconnect,
    Enable,
    Disable,
}

/// A stamped, serialized frame queued for transmission.
///
/// The generation pins the frame to the transport session it was queued
/// under; frames from a superseded session are discarded, never sent.
#[derive(Debug)]
pub(crate) struct QueuedFrame {
    pub generation: u64,
    pub text: String,
}

/// State shared between the handle and the driver task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: RwLock<ConnectionState>,
    pub connection_error: RwLock<Option<String>>,
    pub enabled: AtomicBool,
    /// Guards against duplicate connect requests from rapid re-invocation.
    pub connect_pending: AtomicBool,
    pub generation: AtomicU64,
    pub reconnect_attempts: AtomicU32,
    pub rooms: Mutex<RoomTracker>,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            connection_error: RwLock::new(None),
            enabled: AtomicBool::new(true),
            connect_pending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            rooms: Mutex::new(RoomTracker::new()),
        }
    }
}

/// How a connection attempt or session ended.
enum SessionEnd {
    /// Shutdown token fired or the handle went away.
    Shutdown,
    /// Explicit disconnect: close and park, reconnectable later.
    Stopped,
    /// Kill-switch: disable command received.
    Disabled,
    /// Close with code 1000. Terminal; never reconnects.
    NormalClose,
    /// Explicit reconnect command: retry immediately, counters reset.
    ReconnectRequested,
    /// Abnormal close, transport error, or open-phase timeout.
    Failed,
}

enum Directive {
    Go,
    Shutdown,
}

pub(crate) struct Driver {
    config: RealtimeConfig,
    user_id: i64,
    transport: Arc<dyn Transport>,
    callbacks: Callbacks,
    health: Arc<HealthMonitor>,
    shared: Arc<Shared>,
    policy: ReconnectPolicy,
    guard: AttemptWindow,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: mpsc::UnboundedReceiver<QueuedFrame>,
    shutdown: CancellationToken,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RealtimeConfig,
        user_id: i64,
        transport: Arc<dyn Transport>,
        callbacks: Callbacks,
        health: Arc<HealthMonitor>,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
        outbound: mpsc::UnboundedReceiver<QueuedFrame>,
        shutdown: CancellationToken,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect_delay_ms, config.max_reconnect_attempts);
        let guard = AttemptWindow::new(config.max_connections_per_minute);
        Self {
            config,
            user_id,
            transport,
            callbacks,
            health,
            shared,
            policy,
            guard,
            commands,
            outbound,
            shutdown,
        }
    }

    /// Driver main loop: parked until told to connect, then runs the
    /// connect/retry cycle until it settles again.
    pub async fn run(mut self) {
        loop {
            match self.wait_for_directive().await {
                Directive::Shutdown => break,
                Directive::Go => {}
            }
            self.run_connection_cycle().await;
            // Cycle settled; a fresh connect() must be able to request again.
            self.shared.connect_pending.store(false, Ordering::SeqCst);
            if self.shutdown.is_cancelled() {
                break;
            }
        }
        self.set_state(ConnectionState::Disconnected);
        debug!(label = self.callbacks.component_label(), "Connection driver stopped");
    }

    /// Wait for a command that starts a connection.
    async fn wait_for_directive(&mut self) -> Directive {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return Directive::Shutdown,
                cmd = self.commands.recv() => match cmd {
                    None => return Directive::Shutdown,
                    Some(Command::Disable) => {
                        // Idempotent: disabling while parked just records
                        // the state again.
                        self.set_state(ConnectionState::Disabled);
                    }
                    Some(Command::Disconnect) => {
                        self.set_state(ConnectionState::Disconnected);
                    }
                    Some(Command::Connect | Command::Reconnect | Command::Enable) => {
                        return Directive::Go;
                    }
                },
            }
        }
    }

    /// One connect/retry cycle. Returns when the connection settles in a
    /// parked state (disconnected, disabled, or shutdown).
    async fn run_connection_cycle(&mut self) {
        self.shared.connect_pending.store(false, Ordering::SeqCst);
        loop {
            if self.shutdown.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            if !self.shared.enabled.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disabled);
                return;
            }

            // Local loop guard, checked before the health monitor gets a say.
            if !self.guard.approve() {
                self.disable_with_error("connection loop detected - realtime disabled");
                return;
            }

            self.health.record_connection_attempt();
            self.set_state(ConnectionState::Connecting);
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let url = self.config.connection_url(self.user_id);
            debug!(
                label = self.callbacks.component_label(),
                user_id = self.user_id,
                generation,
                "Opening connection"
            );

            let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
            let outcome = tokio::select! {
                () = self.shutdown.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
                result = tokio::time::timeout(connect_timeout, self.transport.connect(url)) => result,
            };

            let end = match outcome {
                // Open-phase timeout: dropping the pending connect closes
                // the socket; the retry path is the same as for a close.
                Err(_elapsed) => {
                    let err = RealtimeError::ConnectTimeout;
                    warn!(label = self.callbacks.component_label(), "{err}");
                    self.health.record_error(&err);
                    self.set_error(Some(err.to_string()));
                    self.callbacks.emit_error(&err.to_string());
                    SessionEnd::Failed
                }
                Ok(Err(err)) => {
                    error!(label = self.callbacks.component_label(), error = %err, "Connection failed");
                    self.health.record_error(&err);
                    let message = if err.is_opaque() {
                        "network or connection error".to_string()
                    } else {
                        err.to_string()
                    };
                    self.set_error(Some(message.clone()));
                    self.callbacks.emit_error(&message);
                    SessionEnd::Failed
                }
                Ok(Ok((reader, writer))) => self.run_session(generation, reader, writer).await,
            };

            // Memberships do not survive the socket; owners re-join.
            self.shared.rooms.lock().clear();

            match end {
                SessionEnd::Shutdown | SessionEnd::Stopped => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
                SessionEnd::Disabled => {
                    self.set_state(ConnectionState::Disabled);
                    return;
                }
                SessionEnd::NormalClose => {
                    info!(label = self.callbacks.component_label(), "Connection closed normally");
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
                SessionEnd::ReconnectRequested => {
                    self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
                    continue;
                }
                SessionEnd::Failed => {
                    if !self.schedule_retry().await {
                        return;
                    }
                }
            }
        }
    }

    /// Decide whether to retry after a failure and wait out the backoff.
    /// Returns false when the cycle should settle instead.
    async fn schedule_retry(&mut self) -> bool {
        if !self.config.auto_reconnect {
            self.set_state(ConnectionState::Disconnected);
            return false;
        }

        let attempt = self.shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.health.record_reconnect_attempt();

        let health = self.health.health_data();
        if health.is_in_error_loop && self.config.auto_disable_on_loop {
            self.disable_with_error("reconnection loop detected - realtime disabled");
            return false;
        }

        if !self.policy.should_retry(attempt) {
            warn!(
                label = self.callbacks.component_label(),
                attempt, "Maximum reconnection attempts reached"
            );
            self.set_error(Some("maximum reconnection attempts reached".to_string()));
            if self.health.error_count() >= 3 {
                // Escalate, not silently stop.
                self.disable_with_error("too many consecutive errors - realtime disabled");
            } else {
                self.set_state(ConnectionState::Disconnected);
            }
            return false;
        }

        self.set_state(ConnectionState::Reconnecting);
        let delay = self.policy.next_delay(attempt);
        info!(
            label = self.callbacks.component_label(),
            attempt,
            max_attempts = self.policy.max_attempts(),
            delay_ms = delay.as_millis(),
            "Waiting before reconnect"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                () = self.shutdown.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return false;
                }
                cmd = self.commands.recv() => match cmd {
                    None => {
                        self.set_state(ConnectionState::Disconnected);
                        return false;
                    }
                    Some(Command::Disable) => {
                        self.set_state(ConnectionState::Disabled);
                        return false;
                    }
                    Some(Command::Disconnect) => {
                        self.set_state(ConnectionState::Disconnected);
                        return false;
                    }
                    Some(Command::Reconnect) => {
                        // Explicit reconnect skips the rest of the delay.
                        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
                        return true;
                    }
                    Some(Command::Connect | Command::Enable) => {
                        // Already on the retry path; keep waiting.
                    }
                },
            }
        }
    }

    /// Run one connected session until it ends.
    async fn run_session(
        &mut self,
        generation: u64,
        mut reader: TransportReader,
        mut writer: BoxedWriter,
    ) -> SessionEnd {
        self.set_state(ConnectionState::Connected);
        self.set_error(None);
        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        self.health.record_successful_connection();
        info!(
            label = self.callbacks.component_label(),
            user_id = self.user_id,
            "Connected"
        );
        self.callbacks.emit_connect();

        let mut keep_alive = if self.config.keep_alive_interval_ms > 0 {
            let mut interval = tokio::time::interval(Duration::from_millis(
                self.config.keep_alive_interval_ms,
            ));
            // The first tick completes immediately; skip it so pings start
            // one full period after open.
            interval.tick().await;
            Some(interval)
        } else {
            None
        };

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    let _ = writer.close().await;
                    self.callbacks.emit_disconnect();
                    break SessionEnd::Shutdown;
                }

                cmd = self.commands.recv() => match cmd {
                    None => {
                        let _ = writer.close().await;
                        self.callbacks.emit_disconnect();
                        break SessionEnd::Shutdown;
                    }
                    Some(Command::Disable) => {
                        let _ = writer.close().await;
                        self.callbacks.emit_disconnect();
                        break SessionEnd::Disabled;
                    }
                    Some(Command::Disconnect) => {
                        let _ = writer.close().await;
                        self.callbacks.emit_disconnect();
                        break SessionEnd::Stopped;
                    }
                    Some(Command::Reconnect) => {
                        let _ = writer.close().await;
                        self.callbacks.emit_disconnect();
                        break SessionEnd::ReconnectRequested;
                    }
                    Some(Command::Connect | Command::Enable) => {
                        debug!(label = self.callbacks.component_label(), "Already connected");
                    }
                },

                queued = self.outbound.recv() => match queued {
                    None => {
                        let _ = writer.close().await;
                        self.callbacks.emit_disconnect();
                        break SessionEnd::Shutdown;
                    }
                    Some(frame) if frame.generation != generation => {
                        debug!(
                            frame_generation = frame.generation,
                            current_generation = generation,
                            "Discarding frame from superseded connection"
                        );
                    }
                    Some(frame) => {
                        if let Err(e) = writer.send_text(frame.text).await {
                            error!(error = %e, "Write failed");
                            self.health.record_error(&e);
                            self.set_error(Some(e.to_string()));
                            self.callbacks.emit_error(&e.to_string());
                            self.callbacks.emit_disconnect();
                            break SessionEnd::Failed;
                        }
                    }
                },

                event = reader.next() => match event {
                    Some(Ok(TransportEvent::Text(text))) => {
                        self.dispatch_inbound(&text, &mut writer).await;
                    }
                    Some(Ok(TransportEvent::Ping(payload))) => {
                        let _ = writer.send_pong(payload).await;
                    }
                    Some(Ok(TransportEvent::Pong(_))) => {
                        debug!("Received transport pong");
                    }
                    Some(Ok(TransportEvent::Closed { code, reason })) => {
                        let reason_text = if reason.is_empty() {
                            close_code_reason(code).to_string()
                        } else {
                            reason
                        };
                        warn!(code, reason = %reason_text, "Connection closed by peer");
                        self.callbacks.emit_disconnect();
                        if code == 1000 {
                            break SessionEnd::NormalClose;
                        }
                        let err = RealtimeError::ConnectionClosed {
                            code,
                            reason: reason_text.clone(),
                        };
                        self.health.record_error(&err);
                        self.set_error(Some(reason_text));
                        break SessionEnd::Failed;
                    }
                    Some(Err(e)) => {
                        // Error events update counters but do not close the
                        // session by themselves; the close event that
                        // follows drives the transition.
                        error!(error = %e, "Transport error");
                        self.health.record_error(&e);
                        let message = if e.is_opaque() {
                            "network or connection error".to_string()
                        } else {
                            e.to_string()
                        };
                        self.set_error(Some(message.clone()));
                        self.callbacks.emit_error(&message);
                    }
                    None => {
                        warn!("Transport stream ended without close frame");
                        let err = RealtimeError::ConnectionClosed {
                            code: 1006,
                            reason: close_code_reason(1006).to_string(),
                        };
                        self.health.record_error(&err);
                        self.set_error(Some(close_code_reason(1006).to_string()));
                        self.callbacks.emit_disconnect();
                        break SessionEnd::Failed;
                    }
                },

                _ = tick(&mut keep_alive) => {
                    let ping = crate::frame::ping_frame(self.user_id);
                    match serde_json::to_string(&ping) {
                        Ok(text) => {
                            if let Err(e) = writer.send_text(text).await {
                                warn!(error = %e, "Keep-alive ping failed");
                            } else {
                                debug!("Sent keep-alive ping");
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to encode keep-alive ping"),
                    }
                }
            }
        }
    }

    /// Parse and route one inbound text frame.
    ///
    /// Malformed frames are logged and dropped; system frames are consumed
    /// here and never reach application callbacks.
    async fn dispatch_inbound(&self, text: &str, writer: &mut BoxedWriter) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed inbound frame");
                return;
            }
        };

        match frame.kind.as_str() {
            EVENT_PING => {
                debug!("Received ping, answering with pong");
                let pong = pong_frame(self.user_id);
                match serde_json::to_string(&pong) {
                    Ok(text) => {
                        let _ = writer.send_text(text).await;
                    }
                    Err(e) => warn!(error = %e, "Failed to encode pong"),
                }
            }
            EVENT_PONG => {
                debug!("Received keep-alive pong");
            }
            EVENT_SYSTEM => {
                debug!(data = %frame.data, "Received system frame");
            }
            _ => {
                if self.config.debug {
                    debug!(
                        label = self.callbacks.component_label(),
                        kind = %frame.kind,
                        "Inbound frame"
                    );
                }
                self.callbacks.emit_message(frame);
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.shared.state.write() = state;
    }

    fn set_error(&self, message: Option<String>) {
        *self.shared.connection_error.write() = message;
    }

    fn disable_with_error(&self, message: &str) {
        warn!(label = self.callbacks.component_label(), "{message}");
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disabled);
        self.set_error(Some(message.to_string()));
        self.callbacks.emit_error(message);
    }
}

/// Resolve the next keep-alive tick, or never when keep-alive is off.
async fn tick(keep_alive: &mut Option<tokio::time::Interval>) {
    match keep_alive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
