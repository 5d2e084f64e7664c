//! Transport boundary for the realtime connection.
//!
//! The connection driver owns state and policy; transports only move
//! frames. Keeping this seam minimal lets the real websocket and the
//! preview engine be swapped by configuration while the lifecycle logic
//! stays identical.

use crate::error::{RealtimeError, RealtimeResult};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tracing::debug;

/// Event surfaced by a transport reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame (JSON on the wire).
    Text(String),
    /// Protocol-level ping; the session loop answers with a pong.
    Ping(Vec<u8>),
    /// Protocol-level pong.
    Pong(Vec<u8>),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
}

pub type TransportReader = BoxStream<'static, RealtimeResult<TransportEvent>>;
pub type BoxedWriter = Box<dyn TransportWriter>;

/// Write half of a transport connection.
pub trait TransportWriter: Send {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, RealtimeResult<()>>;
    fn send_pong(&mut self, payload: Vec<u8>) -> BoxFuture<'_, RealtimeResult<()>>;
    fn close(&mut self) -> BoxFuture<'_, RealtimeResult<()>>;
}

/// A connectable transport (real websocket or preview engine).
pub trait Transport: Send + Sync {
    fn connect(&self, url: String) -> BoxFuture<'static, RealtimeResult<(TransportReader, BoxedWriter)>>;
}

// ---------------------------------------------------------------------------
// Real websocket transport (tokio-tungstenite)
// ---------------------------------------------------------------------------

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Production transport backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, url: String) -> BoxFuture<'static, RealtimeResult<(TransportReader, BoxedWriter)>> {
        Box::pin(async move {
            let (ws_stream, _response) =
                connect_async_tls_with_config(&url, None, true, None).await?;
            let (write, read) = ws_stream.split();

            let reader: TransportReader = read
                .filter_map(|item| async move { map_ws_message(item) })
                .boxed();
            let writer: BoxedWriter = Box::new(WsWriter { sink: write });
            Ok((reader, writer))
        })
    }
}

fn map_ws_message(
    item: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<RealtimeResult<TransportEvent>> {
    match item {
        Ok(Message::Text(text)) => Some(Ok(TransportEvent::Text(text.to_string()))),
        Ok(Message::Ping(data)) => Some(Ok(TransportEvent::Ping(data.to_vec()))),
        Ok(Message::Pong(data)) => Some(Ok(TransportEvent::Pong(data.to_vec()))),
        Ok(Message::Close(frame)) => {
            let (code, reason) = frame
                .map(|f| (f.code.into(), f.reason.to_string()))
                .unwrap_or((1000, String::new()));
            Some(Ok(TransportEvent::Closed { code, reason }))
        }
        Ok(Message::Binary(_)) => {
            debug!("Ignoring binary frame");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(e.into())),
    }
}

struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, Message>,
}

impl TransportWriter for WsWriter {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, RealtimeResult<()>> {
        Box::pin(async move {
            self.sink
                .send(Message::Text(text.into()))
                .await
                .map_err(RealtimeError::from)
        })
    }

    fn send_pong(&mut self, payload: Vec<u8>) -> BoxFuture<'_, RealtimeResult<()>> {
        Box::pin(async move {
            self.sink
                .send(Message::Pong(payload.into()))
                .await
                .map_err(RealtimeError::from)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, RealtimeResult<()>> {
        Box::pin(async move {
            self.sink
                .send(Message::Close(None))
                .await
                .map_err(RealtimeError::from)
        })
    }
}

// ---------------------------------------------------------------------------
// Channel plumbing shared by the preview engine and the test transport
// ---------------------------------------------------------------------------

/// Item written by the client through a channel-backed writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentItem {
    Text(String),
    Pong(Vec<u8>),
    Close,
}

/// Reader half backed by an in-memory channel.
pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<RealtimeResult<TransportEvent>>,
}

impl ChannelReader {
    pub fn new(rx: mpsc::UnboundedReceiver<RealtimeResult<TransportEvent>>) -> Self {
        Self { rx }
    }
}

impl futures_util::Stream for ChannelReader {
    type Item = RealtimeResult<TransportEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Writer half backed by an in-memory channel.
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<SentItem>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::UnboundedSender<SentItem>) -> Self {
        Self { tx }
    }

    fn push(&self, item: SentItem) -> RealtimeResult<()> {
        self.tx
            .send(item)
            .map_err(|_| RealtimeError::ConnectionFailed("transport channel closed".to_string()))
    }
}

impl TransportWriter for ChannelWriter {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, RealtimeResult<()>> {
        let result = self.push(SentItem::Text(text));
        Box::pin(async move { result })
    }

    fn send_pong(&mut self, payload: Vec<u8>) -> BoxFuture<'_, RealtimeResult<()>> {
        let result = self.push(SentItem::Pong(payload));
        Box::pin(async move { result })
    }

    fn close(&mut self) -> BoxFuture<'_, RealtimeResult<()>> {
        let result = self.push(SentItem::Close);
        Box::pin(async move { result })
    }
}
