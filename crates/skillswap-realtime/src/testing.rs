//! Reusable test utilities for exercising the connection driver without a
//! real socket.
//!
//! [`TestTransport::pair`] yields a transport for the client plus a
//! [`TestServer`] handle that accepts each connection, reads outbound
//! frames, pushes inbound frames, and can drop or refuse sockets to drive
//! the reconnect and loop-protection paths deterministically.

use crate::error::{RealtimeError, RealtimeResult};
use crate::transport::{
    BoxedWriter, ChannelReader, ChannelWriter, SentItem, Transport, TransportEvent,
    TransportReader,
};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How the transport treats incoming connect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectPolicy {
    Accept,
    /// Fail every connect. `opaque` errors carry no detail, mimicking
    /// CORS-style network failures.
    Refuse { opaque: bool },
    /// Never resolve the connect future, to exercise the open timeout.
    Hang,
}

struct TestState {
    connects: AtomicUsize,
    policy: Mutex<ConnectPolicy>,
    conn_tx: mpsc::UnboundedSender<TestConnection>,
}

/// Transport half handed to the client under test.
#[derive(Clone)]
pub struct TestTransport {
    state: Arc<TestState>,
}

impl TestTransport {
    /// Build a transport + server control pair.
    pub fn pair() -> (Self, TestServer) {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let state = Arc::new(TestState {
            connects: AtomicUsize::new(0),
            policy: Mutex::new(ConnectPolicy::Accept),
            conn_tx,
        });
        (
            Self {
                state: state.clone(),
            },
            TestServer { state, conn_rx },
        )
    }
}

impl Transport for TestTransport {
    fn connect(&self, _url: String) -> BoxFuture<'static, RealtimeResult<(TransportReader, BoxedWriter)>> {
        let state = self.state.clone();
        Box::pin(async move {
            state.connects.fetch_add(1, Ordering::SeqCst);

            let policy = *state.policy.lock();
            match policy {
                ConnectPolicy::Refuse { opaque } => {
                    let detail = if opaque {
                        String::new()
                    } else {
                        "connection refused".to_string()
                    };
                    return Err(RealtimeError::ConnectionFailed(detail));
                }
                ConnectPolicy::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!();
                }
                ConnectPolicy::Accept => {}
            }

            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();

            let connection = TestConnection { event_tx, sent_rx };
            state
                .conn_tx
                .send(connection)
                .map_err(|_| RealtimeError::ConnectionFailed("test server gone".to_string()))?;

            let reader: TransportReader = ChannelReader::new(event_rx).boxed();
            let writer: BoxedWriter = Box::new(ChannelWriter::new(sent_tx));
            Ok((reader, writer))
        })
    }
}

/// Server-side control handle paired with [`TestTransport`].
pub struct TestServer {
    state: Arc<TestState>,
    conn_rx: mpsc::UnboundedReceiver<TestConnection>,
}

impl TestServer {
    /// Total connect calls observed, accepted or refused.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Refuse all future connects with a connection error.
    pub fn refuse_connections(&self, opaque: bool) {
        *self.state.policy.lock() = ConnectPolicy::Refuse { opaque };
    }

    /// Accept future connects again.
    pub fn accept_connections(&self) {
        *self.state.policy.lock() = ConnectPolicy::Accept;
    }

    /// Leave future connects hanging until the client's open timeout fires.
    pub fn hang_connections(&self) {
        *self.state.policy.lock() = ConnectPolicy::Hang;
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> TestConnection {
        self.conn_rx
            .recv()
            .await
            .expect("test transport dropped before a connection arrived")
    }

    /// Wait for a connection with a timeout; None if none arrives.
    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<TestConnection> {
        tokio::time::timeout(timeout, self.conn_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

/// One live connection from the client under test.
pub struct TestConnection {
    event_tx: mpsc::UnboundedSender<RealtimeResult<TransportEvent>>,
    sent_rx: mpsc::UnboundedReceiver<SentItem>,
}

impl TestConnection {
    /// Push an inbound text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self
            .event_tx
            .send(Ok(TransportEvent::Text(text.into())));
    }

    /// Push a transport error event (the socket stays open).
    pub fn send_error(&self, err: RealtimeError) {
        let _ = self.event_tx.send(Err(err));
    }

    /// Close the connection with the given code.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.event_tx.send(Ok(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        }));
    }

    /// Drop the socket without a close frame (abnormal termination).
    pub fn drop_socket(self) {
        drop(self.event_tx);
    }

    /// Receive the next frame written by the client.
    pub async fn recv_sent(&mut self) -> Option<SentItem> {
        self.sent_rx.recv().await
    }

    /// Receive with a timeout; None when nothing was written.
    pub async fn recv_sent_timeout(&mut self, timeout: Duration) -> Option<SentItem> {
        tokio::time::timeout(timeout, self.sent_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Receive the next text frame, skipping pongs, decoded as JSON.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        while let Some(item) = self.sent_rx.recv().await {
            match item {
                SentItem::Text(text) => return serde_json::from_str(&text).ok(),
                SentItem::Pong(_) => continue,
                SentItem::Close => return None,
            }
        }
        None
    }
}
