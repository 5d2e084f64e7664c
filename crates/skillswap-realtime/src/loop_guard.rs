//! Hook-local connection loop guard.
//!
//! A second line of defense, independent of the health monitor: the
//! connection driver keeps its own rolling count of connect attempts and
//! refuses to open a socket once the per-minute ceiling is exceeded. A bug
//! in one counter must not defeat the other.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Rolling window of connection attempt timestamps.
#[derive(Debug)]
pub struct AttemptWindow {
    window: Duration,
    ceiling: u32,
    attempts: VecDeque<Instant>,
}

impl AttemptWindow {
    pub fn new(ceiling: u32) -> Self {
        Self::with_window(Duration::from_secs(60), ceiling)
    }

    pub fn with_window(window: Duration, ceiling: u32) -> Self {
        Self {
            window,
            ceiling: ceiling.max(1),
            attempts: VecDeque::new(),
        }
    }

    /// Record an attempt and decide whether it may proceed.
    ///
    /// Returns false once more than `ceiling` attempts have landed inside
    /// the rolling window, at which point the caller must short-circuit to
    /// disabled without opening a socket.
    pub fn approve(&mut self) -> bool {
        let now = Instant::now();
        self.attempts.push_back(now);

        let cutoff = now - self.window;
        while self.attempts.front().is_some_and(|&t| t < cutoff) {
            self.attempts.pop_front();
        }

        let count = self.attempts.len() as u32;
        if count > self.ceiling {
            warn!(
                attempts = count,
                ceiling = self.ceiling,
                "Connection loop suspected, refusing to connect"
            );
            return false;
        }
        true
    }

    /// Attempts currently inside the window.
    pub fn count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Forget all recorded attempts (explicit user reconnect).
    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approves_up_to_ceiling() {
        let mut guard = AttemptWindow::new(10);
        for i in 0..10 {
            assert!(guard.approve(), "attempt {} should pass", i + 1);
        }
        assert!(!guard.approve(), "attempt 11 should be refused");
    }

    #[test]
    fn test_window_expiry_restores_approval() {
        let mut guard = AttemptWindow::with_window(Duration::from_millis(30), 2);
        assert!(guard.approve());
        assert!(guard.approve());
        assert!(!guard.approve());

        std::thread::sleep(Duration::from_millis(50));
        assert!(guard.approve());
    }

    #[test]
    fn test_reset_clears_window() {
        let mut guard = AttemptWindow::new(2);
        guard.approve();
        guard.approve();
        assert!(!guard.approve());

        guard.reset();
        assert!(guard.approve());
    }
}
