//! Typed event subscription slots.
//!
//! Components register named capability slots instead of mutating option
//! objects; the `label` identifies the owning component in log output.

use crate::frame::Frame;
use std::fmt;

type MessageFn = Box<dyn Fn(Frame) + Send + Sync>;
type SignalFn = Box<dyn Fn() + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str) + Send + Sync>;

/// Callback slots invoked by the connection driver.
#[derive(Default)]
pub struct Callbacks {
    label: Option<String>,
    on_message: Option<MessageFn>,
    on_connect: Option<SignalFn>,
    on_disconnect: Option<SignalFn>,
    on_error: Option<ErrorFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Component label used in log lines (e.g. "ChatPage").
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Domain frames, after system frames have been filtered out.
    pub fn on_message(mut self, f: impl Fn(Frame) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn component_label(&self) -> &str {
        self.label.as_deref().unwrap_or("realtime")
    }

    pub(crate) fn emit_message(&self, frame: Frame) {
        if let Some(f) = &self.on_message {
            f(frame);
        }
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn emit_disconnect(&self) {
        if let Some(f) = &self.on_disconnect {
            f();
        }
    }

    pub(crate) fn emit_error(&self, message: &str) {
        if let Some(f) = &self.on_error {
            f(message);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("label", &self.component_label())
            .field("on_message", &self.on_message.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDraft;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_empty_slots_are_noops() {
        let callbacks = Callbacks::new();
        callbacks.emit_connect();
        callbacks.emit_disconnect();
        callbacks.emit_error("boom");
        callbacks.emit_message(FrameDraft::new("new_message", serde_json::json!({})).stamp(1));
    }

    #[test]
    fn test_slots_fire() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let callbacks = Callbacks::new()
            .label("TestComponent")
            .on_message(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(callbacks.component_label(), "TestComponent");
        callbacks.emit_message(FrameDraft::new("new_message", serde_json::json!({})).stamp(1));
        callbacks.emit_message(FrameDraft::new("new_comment", serde_json::json!({})).stamp(1));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
