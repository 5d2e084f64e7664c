//! Real-time layer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Connection timeout - server did not respond in time")]
    ConnectTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Connection loop detected - realtime disabled")]
    LoopDetected,

    #[error("Frame parse error: {0}")]
    Parse(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RealtimeError {
    /// An opaque error carries no close code and no useful detail.
    ///
    /// These typically indicate CORS-style rejections or abrupt network
    /// failures and weigh more heavily toward loop detection than errors
    /// with a discernible reason.
    pub fn is_opaque(&self) -> bool {
        match self {
            Self::ConnectionFailed(detail) => detail.is_empty(),
            Self::Tungstenite(tokio_tungstenite::tungstenite::Error::Io(_)) => true,
            Self::Tungstenite(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => true,
            _ => false,
        }
    }
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Map a websocket close code to the human-readable reason shown to users.
pub fn close_code_reason(code: u16) -> &'static str {
    match code {
        1000 => "normal closure",
        1001 => "endpoint going away",
        1006 => "connection closed abnormally",
        1011 => "internal server error",
        _ => "connection closed",
    }
}
