//! Real-time connection layer for skillswap chat and notifications.
//!
//! Provides robust connectivity with:
//! - Automatic reconnection with exponential backoff and jitter
//! - Loop detection and a self-protective disable circuit breaker
//! - Health monitoring over a rolling window
//! - Frame dispatch with system-frame filtering and outbound stamping
//! - A preview engine that simulates the server for offline operation

pub mod backoff;
pub mod callbacks;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod health;
pub mod loop_guard;
pub mod preview;
pub mod rooms;
pub mod testing;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use callbacks::Callbacks;
pub use client::{Diagnostics, RealtimeClient};
pub use config::{RealtimeConfig, TransportMode};
pub use connection::ConnectionState;
pub use error::{close_code_reason, RealtimeError, RealtimeResult};
pub use frame::{Frame, FrameDraft};
pub use health::{HealthData, HealthMonitor};
pub use loop_guard::AttemptWindow;
pub use preview::{PreviewConfig, PreviewTransport};
pub use rooms::RoomTracker;
pub use transport::{Transport, TransportEvent, WebSocketTransport};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any websocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
