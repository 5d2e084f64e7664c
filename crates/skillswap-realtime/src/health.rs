//! Connection health monitoring.
//!
//! Tracks attempts, successes, and errors over a rolling window and
//! derives the `is_in_error_loop` circuit-breaker signal. The monitor is
//! a service object injected into every client; `HealthMonitor::global()`
//! is the process-wide instance used by production wiring.

use crate::error::RealtimeError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_ATTEMPT_CEILING: u32 = 10;
const EMPTY_ERROR_LOOP_THRESHOLD: u32 = 3;

static GLOBAL: Lazy<Arc<HealthMonitor>> = Lazy::new(|| Arc::new(HealthMonitor::new()));

/// Snapshot of health counters over the trailing window.
#[derive(Debug, Clone, Default)]
pub struct HealthData {
    pub connection_attempts: u32,
    pub successful_connections: u32,
    pub errors: u32,
    pub empty_errors: u32,
    pub reconnect_attempts: u32,
    /// True when the window exceeds the attempt ceiling or empty errors
    /// arrive consecutively. Computed, never stored.
    pub is_in_error_loop: bool,
}

#[derive(Debug, Default)]
struct HealthState {
    connection_attempts: VecDeque<Instant>,
    successful_connections: VecDeque<Instant>,
    errors: VecDeque<Instant>,
    empty_errors: VecDeque<Instant>,
    reconnect_attempts: VecDeque<Instant>,
    consecutive_empty_errors: u32,
    last_error: Option<(Instant, String)>,
}

impl HealthState {
    fn prune(&mut self, window: Duration) {
        let cutoff = Instant::now() - window;
        for events in [
            &mut self.connection_attempts,
            &mut self.successful_connections,
            &mut self.errors,
            &mut self.empty_errors,
            &mut self.reconnect_attempts,
        ] {
            while events.front().is_some_and(|&t| t < cutoff) {
                events.pop_front();
            }
        }
    }
}

/// Rolling-window health monitor for realtime connections.
#[derive(Debug)]
pub struct HealthMonitor {
    window: Duration,
    attempt_ceiling: u32,
    state: Mutex<HealthState>,
}

impl HealthMonitor {
    /// Create a monitor with the default 60 s window and 10/min ceiling.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_WINDOW, DEFAULT_ATTEMPT_CEILING)
    }

    /// Create a monitor with a custom window and attempt ceiling.
    pub fn with_limits(window: Duration, attempt_ceiling: u32) -> Self {
        Self {
            window,
            attempt_ceiling: attempt_ceiling.max(1),
            state: Mutex::new(HealthState::default()),
        }
    }

    /// The process-wide monitor shared by all clients.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    pub fn record_connection_attempt(&self) {
        self.state.lock().connection_attempts.push_back(Instant::now());
    }

    pub fn record_successful_connection(&self) {
        let mut state = self.state.lock();
        state.successful_connections.push_back(Instant::now());
        state.consecutive_empty_errors = 0;
    }

    pub fn record_reconnect_attempt(&self) {
        self.state.lock().reconnect_attempts.push_back(Instant::now());
    }

    /// Record a connection error, tagging opaque errors separately.
    pub fn record_error(&self, err: &RealtimeError) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.errors.push_back(now);
        state.last_error = Some((now, err.to_string()));
        if err.is_opaque() {
            state.empty_errors.push_back(now);
            state.consecutive_empty_errors += 1;
        } else {
            state.consecutive_empty_errors = 0;
        }
    }

    /// Record an error with no discernible code or reason.
    pub fn record_empty_error(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.errors.push_back(now);
        state.empty_errors.push_back(now);
        state.consecutive_empty_errors += 1;
    }

    /// Clear all counters. Called on explicit user-initiated reconnect.
    pub fn reset_error_state(&self) {
        let mut state = self.state.lock();
        *state = HealthState::default();
    }

    /// Errors recorded in the current window.
    pub fn error_count(&self) -> u32 {
        let mut state = self.state.lock();
        state.prune(self.window);
        state.errors.len() as u32
    }

    /// Human-readable last error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.as_ref().map(|(_, msg)| msg.clone())
    }

    /// Snapshot the counters over the trailing window.
    ///
    /// Events older than the window are pruned before counting, so the
    /// loop signal is always a function of current state.
    pub fn health_data(&self) -> HealthData {
        let mut state = self.state.lock();
        state.prune(self.window);

        let connection_attempts = state.connection_attempts.len() as u32;
        let is_in_error_loop = connection_attempts > self.attempt_ceiling
            || state.consecutive_empty_errors >= EMPTY_ERROR_LOOP_THRESHOLD;

        HealthData {
            connection_attempts,
            successful_connections: state.successful_connections.len() as u32,
            errors: state.errors.len() as u32,
            empty_errors: state.empty_errors.len() as u32,
            reconnect_attempts: state.reconnect_attempts.len() as u32,
            is_in_error_loop,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_quiet() {
        let monitor = HealthMonitor::new();
        let data = monitor.health_data();
        assert_eq!(data.connection_attempts, 0);
        assert!(!data.is_in_error_loop);
    }

    #[test]
    fn test_attempt_ceiling_trips_loop() {
        let monitor = HealthMonitor::new();
        for _ in 0..10 {
            monitor.record_connection_attempt();
        }
        assert!(!monitor.health_data().is_in_error_loop);

        monitor.record_connection_attempt();
        assert!(monitor.health_data().is_in_error_loop);
    }

    #[test]
    fn test_consecutive_empty_errors_trip_loop() {
        let monitor = HealthMonitor::new();
        monitor.record_empty_error();
        monitor.record_empty_error();
        assert!(!monitor.health_data().is_in_error_loop);

        monitor.record_empty_error();
        let data = monitor.health_data();
        assert!(data.is_in_error_loop);
        assert_eq!(data.empty_errors, 3);
    }

    #[test]
    fn test_success_breaks_empty_error_run() {
        let monitor = HealthMonitor::new();
        monitor.record_empty_error();
        monitor.record_empty_error();
        monitor.record_successful_connection();
        monitor.record_empty_error();
        assert!(!monitor.health_data().is_in_error_loop);
    }

    #[test]
    fn test_non_opaque_error_breaks_empty_error_run() {
        let monitor = HealthMonitor::new();
        monitor.record_empty_error();
        monitor.record_empty_error();
        monitor.record_error(&RealtimeError::ConnectTimeout);
        monitor.record_empty_error();
        assert!(!monitor.health_data().is_in_error_loop);
    }

    #[test]
    fn test_window_pruning() {
        let monitor = HealthMonitor::with_limits(Duration::from_millis(40), 10);
        for _ in 0..5 {
            monitor.record_connection_attempt();
        }
        assert_eq!(monitor.health_data().connection_attempts, 5);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.health_data().connection_attempts, 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let monitor = HealthMonitor::new();
        for _ in 0..12 {
            monitor.record_connection_attempt();
        }
        monitor.record_empty_error();
        monitor.record_empty_error();
        monitor.record_empty_error();
        assert!(monitor.health_data().is_in_error_loop);

        monitor.reset_error_state();
        let data = monitor.health_data();
        assert!(!data.is_in_error_loop);
        assert_eq!(data.connection_attempts, 0);
        assert_eq!(data.errors, 0);
        assert!(monitor.last_error().is_none());
    }

    #[test]
    fn test_last_error_message() {
        let monitor = HealthMonitor::new();
        monitor.record_error(&RealtimeError::ConnectTimeout);
        assert!(monitor.last_error().unwrap().contains("timeout"));
    }
}
