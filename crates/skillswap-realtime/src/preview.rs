//! Preview engine: a simulated server behind the transport seam.
//!
//! Lets the whole application run with zero network dependency. The engine
//! implements the same [`Transport`] contract as the real websocket and
//! answers outbound frames with synthetic server responses after randomized
//! delays, so application code cannot tell it apart from a live backend
//! except via the configured transport mode.

use crate::error::RealtimeResult;
use crate::frame::{
    Frame, FrameDraft, EVENT_CONNECTION_ESTABLISHED, EVENT_JOIN_POST, EVENT_NEW_COMMENT,
    EVENT_NEW_MESSAGE, EVENT_NEW_NOTIFICATION, EVENT_PING, EVENT_PONG, EVENT_TYPING_START,
    EVENT_TYPING_STOP, EVENT_USER_TYPING,
};
use crate::transport::{
    BoxedWriter, ChannelReader, ChannelWriter, SentItem, Transport, TransportEvent,
    TransportReader,
};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const EVENT_MESSAGE_SENT: &str = "message_sent";
pub const EVENT_USER_ONLINE: &str = "user_online";
pub const EVENT_HEARTBEAT: &str = "heartbeat";

/// Documented payload key-set for each inbound event type the engine can
/// emit. The simulator is held to these shapes so mock and real traffic
/// stay indistinguishable to application code.
pub fn expected_data_keys(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        EVENT_CONNECTION_ESTABLISHED => Some(&["message"]),
        EVENT_PONG => Some(&[]),
        EVENT_MESSAGE_SENT => Some(&["message_id", "conversation_id", "content", "recipient_id"]),
        EVENT_NEW_MESSAGE => Some(&["message_id", "conversation_id", "content", "sender_id"]),
        EVENT_USER_TYPING => Some(&["conversation_id", "user_id", "typing"]),
        EVENT_NEW_COMMENT => Some(&["comment_id", "post_id", "content", "author_id"]),
        EVENT_NEW_NOTIFICATION => Some(&["notification_id", "title", "body", "kind"]),
        EVENT_USER_ONLINE => Some(&["user_id", "status"]),
        EVENT_HEARTBEAT => Some(&[]),
        _ => None,
    }
}

/// Tuning knobs for the simulated server.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Simulated counterpart user replying to messages.
    pub counterpart_id: i64,
    /// Handshake delay bounds (ms).
    pub connect_delay_ms: (u64, u64),
    /// Server processing delay bounds for responses (ms).
    pub response_delay_ms: (u64, u64),
    /// Extra delay before the counterpart's reply to a sent message (ms).
    pub reply_delay_ms: (u64, u64),
    /// Synthetic heartbeat period (ms). 0 disables it.
    pub heartbeat_interval_ms: u64,
    /// Emit pending-notification and presence events after connect.
    pub simulate_initial_events: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            counterpart_id: 2,
            connect_delay_ms: (300, 1_000),
            response_delay_ms: (100, 400),
            reply_delay_ms: (300, 800),
            heartbeat_interval_ms: 30_000,
            simulate_initial_events: true,
        }
    }
}

impl PreviewConfig {
    /// Near-zero delays for driving the engine in tests.
    pub fn fast() -> Self {
        Self {
            connect_delay_ms: (1, 2),
            response_delay_ms: (1, 2),
            reply_delay_ms: (1, 2),
            heartbeat_interval_ms: 0,
            simulate_initial_events: false,
            ..Self::default()
        }
    }
}

/// Drop-in fake transport running a discrete event simulation.
#[derive(Debug, Clone, Default)]
pub struct PreviewTransport {
    config: PreviewConfig,
}

impl PreviewTransport {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }
}

impl Transport for PreviewTransport {
    fn connect(&self, _url: String) -> BoxFuture<'static, RealtimeResult<(TransportReader, BoxedWriter)>> {
        let config = self.config.clone();
        Box::pin(async move {
            let mut rng = SmallRng::from_entropy();
            let delay = rng.gen_range(config.connect_delay_ms.0..=config.connect_delay_ms.1);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();

            tokio::spawn(Simulator::new(config, event_tx, sent_rx).run());

            let reader: TransportReader = ChannelReader::new(event_rx).boxed();
            let writer: BoxedWriter = Box::new(ChannelWriter::new(sent_tx));
            Ok((reader, writer))
        })
    }
}

/// Server id used for frames authored by the simulated backend itself.
const SERVER_USER_ID: i64 = 0;

struct Simulator {
    config: PreviewConfig,
    events: mpsc::UnboundedSender<RealtimeResult<TransportEvent>>,
    sent: mpsc::UnboundedReceiver<SentItem>,
    rng: SmallRng,
    next_id: i64,
}

impl Simulator {
    fn new(
        config: PreviewConfig,
        events: mpsc::UnboundedSender<RealtimeResult<TransportEvent>>,
        sent: mpsc::UnboundedReceiver<SentItem>,
    ) -> Self {
        Self {
            config,
            events,
            sent,
            rng: SmallRng::from_entropy(),
            next_id: 1,
        }
    }

    async fn run(mut self) {
        self.emit(
            EVENT_CONNECTION_ESTABLISHED,
            json!({"message": "connected to preview engine"}),
        );

        if self.config.simulate_initial_events {
            self.schedule_initial_events();
        }

        let mut heartbeat = if self.config.heartbeat_interval_ms > 0 {
            Some(tokio::time::interval(Duration::from_millis(
                self.config.heartbeat_interval_ms,
            )))
        } else {
            None
        };
        if let Some(hb) = heartbeat.as_mut() {
            // First tick fires immediately; consume it so the heartbeat
            // starts one full period after connect.
            hb.tick().await;
        }

        loop {
            tokio::select! {
                item = self.sent.recv() => match item {
                    Some(SentItem::Text(text)) => self.handle_outbound(&text).await,
                    Some(SentItem::Pong(_)) => {}
                    Some(SentItem::Close) | None => {
                        let _ = self.events.send(Ok(TransportEvent::Closed {
                            code: 1000,
                            reason: "normal closure".to_string(),
                        }));
                        debug!("Preview engine: connection closed");
                        return;
                    }
                },
                _ = async {
                    match heartbeat.as_mut() {
                        Some(hb) => { hb.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.emit(EVENT_HEARTBEAT, json!({}));
                }
            }
        }
    }

    async fn handle_outbound(&mut self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Preview engine: dropping malformed outbound frame");
                return;
            }
        };

        // Simulated server processing time before any response.
        let delay = self.delay(self.config.response_delay_ms);
        tokio::time::sleep(delay).await;

        let sender = frame.user_id.unwrap_or(SERVER_USER_ID);
        match frame.kind.as_str() {
            EVENT_PING => {
                self.emit(EVENT_PONG, json!({}));
            }
            "send_message" => {
                let conversation_id = frame.data["conversation_id"].clone();
                let content = frame.data["content"].clone();
                let message_id = self.allocate_id();
                self.emit(
                    EVENT_MESSAGE_SENT,
                    json!({
                        "message_id": message_id,
                        "conversation_id": conversation_id,
                        "content": content,
                        "recipient_id": self.config.counterpart_id,
                    }),
                );

                // The counterpart answers a little later.
                let reply_delay = self.delay(self.config.reply_delay_ms);
                tokio::time::sleep(reply_delay).await;
                let reply_id = self.allocate_id();
                self.emit(
                    EVENT_NEW_MESSAGE,
                    json!({
                        "message_id": reply_id,
                        "conversation_id": frame.data["conversation_id"].clone(),
                        "content": "thanks, sounds like a fair exchange!",
                        "sender_id": self.config.counterpart_id,
                    }),
                );
            }
            EVENT_TYPING_START | EVENT_TYPING_STOP => {
                self.emit(
                    EVENT_USER_TYPING,
                    json!({
                        "conversation_id": frame.data["conversation_id"].clone(),
                        "user_id": sender,
                        "typing": frame.kind == EVENT_TYPING_START,
                    }),
                );
            }
            EVENT_JOIN_POST => {
                // Joining a post room surfaces some comment activity.
                let comment_id = self.allocate_id();
                self.emit(
                    EVENT_NEW_COMMENT,
                    json!({
                        "comment_id": comment_id,
                        "post_id": frame.data["post_id"].clone(),
                        "content": "I can trade guitar lessons for this!",
                        "author_id": self.config.counterpart_id,
                    }),
                );
            }
            other => {
                debug!(kind = other, "Preview engine: no simulated response");
            }
        }
    }

    fn schedule_initial_events(&mut self) {
        let events = self.events.clone();
        let counterpart = self.config.counterpart_id;
        let notification_id = self.allocate_id();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            send_frame(
                &events,
                EVENT_NEW_NOTIFICATION,
                json!({
                    "notification_id": notification_id,
                    "title": "Pending requests",
                    "body": "You have a new skill exchange request",
                    "kind": "match_request",
                }),
            );

            tokio::time::sleep(Duration::from_secs(3)).await;
            send_frame(
                &events,
                EVENT_USER_ONLINE,
                json!({"user_id": counterpart, "status": "online"}),
            );
        });
    }

    fn emit(&self, kind: &str, data: serde_json::Value) {
        send_frame(&self.events, kind, data);
    }

    fn delay(&mut self, bounds: (u64, u64)) -> Duration {
        Duration::from_millis(self.rng.gen_range(bounds.0..=bounds.1))
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn send_frame(
    events: &mpsc::UnboundedSender<RealtimeResult<TransportEvent>>,
    kind: &str,
    data: serde_json::Value,
) {
    let frame = FrameDraft::new(kind, data).stamp(SERVER_USER_ID);
    match serde_json::to_string(&frame) {
        Ok(text) => {
            let _ = events.send(Ok(TransportEvent::Text(text)));
        }
        Err(e) => warn!(error = %e, "Preview engine: failed to encode frame"),
    }
}
