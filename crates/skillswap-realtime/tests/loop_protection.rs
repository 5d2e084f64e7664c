//! Loop detection and circuit-breaker integration tests.

use skillswap_realtime::testing::TestTransport;
use skillswap_realtime::{Callbacks, ConnectionState, HealthMonitor, RealtimeClient, RealtimeConfig};
use std::sync::Arc;
use std::time::Duration;

fn storm_config() -> RealtimeConfig {
    RealtimeConfig {
        // Plenty of retries allowed, so loop protection, not retry
        // exhaustion, is what stops the storm.
        max_reconnect_attempts: 50,
        reconnect_delay_ms: 10,
        connect_timeout_ms: 1_000,
        keep_alive_interval_ms: 0,
        max_connections_per_minute: 10,
        auto_disable_on_loop: true,
        ..Default::default()
    }
}

async fn wait_for(mut predicate: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

#[tokio::test(start_paused = true)]
async fn connection_storm_trips_loop_guard() {
    let (transport, server) = TestTransport::pair();
    server.refuse_connections(false);
    let health = Arc::new(HealthMonitor::new());
    let client = RealtimeClient::new(
        storm_config(),
        7,
        Arc::new(transport),
        Callbacks::new(),
        health.clone(),
    );

    client.connect();
    assert!(
        wait_for(
            || client.state() == ConnectionState::Disabled,
            Duration::from_secs(60)
        )
        .await,
        "storm must end in the disabled state"
    );

    // The guard refuses the attempt that would exceed the ceiling, so at
    // most ten sockets were ever requested.
    assert_eq!(server.connect_count(), 10);
    assert!(!client.is_enabled());
    let error = client.connection_error().expect("error message expected");
    assert!(error.contains("loop"), "unexpected error: {error}");

    // Further connects are refused outright while disabled.
    client.connect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(server.connect_count(), 10);
    assert_eq!(client.state(), ConnectionState::Disabled);
}

#[tokio::test(start_paused = true)]
async fn consecutive_empty_errors_disable_via_health_monitor() {
    let (transport, server) = TestTransport::pair();
    // Opaque failures: no code, no reason, the CORS-style signature.
    server.refuse_connections(true);
    let health = Arc::new(HealthMonitor::new());
    let client = RealtimeClient::new(
        storm_config(),
        7,
        Arc::new(transport),
        Callbacks::new(),
        health.clone(),
    );

    client.connect();
    assert!(
        wait_for(
            || client.state() == ConnectionState::Disabled,
            Duration::from_secs(60)
        )
        .await
    );

    // Three consecutive opaque errors trip the health monitor well before
    // the attempt ceiling does.
    assert_eq!(server.connect_count(), 3);
    assert!(health.health_data().is_in_error_loop);
    assert!(client
        .connection_error()
        .is_some_and(|e| e.contains("loop")));
}

#[tokio::test(start_paused = true)]
async fn explicit_reconnect_clears_the_breaker() {
    let (transport, mut server) = TestTransport::pair();
    server.refuse_connections(true);
    let health = Arc::new(HealthMonitor::new());
    let client = RealtimeClient::new(
        storm_config(),
        7,
        Arc::new(transport),
        Callbacks::new(),
        health.clone(),
    );

    client.connect();
    assert!(
        wait_for(
            || client.state() == ConnectionState::Disabled,
            Duration::from_secs(60)
        )
        .await
    );

    // The user-visible recovery affordance: reconnect() resets the error
    // state and tries again.
    server.accept_connections();
    client.reconnect();
    let _conn = server.accept().await;
    assert!(
        wait_for(|| client.is_connected(), Duration::from_secs(10)).await,
        "reconnect after recovery should succeed"
    );
    assert!(client.is_enabled());
    assert!(client.connection_error().is_none());
    assert!(!health.health_data().is_in_error_loop);
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_with_errors_escalates_to_disabled() {
    let (transport, server) = TestTransport::pair();
    server.refuse_connections(false);
    let config = RealtimeConfig {
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 10,
        keep_alive_interval_ms: 0,
        // Health-based disable off, so the exhaustion path decides.
        auto_disable_on_loop: false,
        ..Default::default()
    };
    let client = RealtimeClient::new(
        config,
        7,
        Arc::new(transport),
        Callbacks::new(),
        Arc::new(HealthMonitor::new()),
    );

    client.connect();
    assert!(
        wait_for(
            || client.state() == ConnectionState::Disabled,
            Duration::from_secs(60)
        )
        .await,
        "three accumulated errors escalate exhaustion to disabled"
    );
    // Initial attempt plus two retries.
    assert_eq!(server.connect_count(), 3);
    assert!(client
        .connection_error()
        .is_some_and(|e| e.contains("consecutive errors")));
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_without_error_pileup_settles_disconnected() {
    let (transport, server) = TestTransport::pair();
    server.refuse_connections(false);
    let config = RealtimeConfig {
        max_reconnect_attempts: 1,
        reconnect_delay_ms: 10,
        keep_alive_interval_ms: 0,
        auto_disable_on_loop: false,
        ..Default::default()
    };
    let client = RealtimeClient::new(
        config,
        7,
        Arc::new(transport),
        Callbacks::new(),
        Arc::new(HealthMonitor::new()),
    );

    client.connect();
    assert!(
        wait_for(
            || client.state() == ConnectionState::Disconnected,
            Duration::from_secs(60)
        )
        .await
    );
    // Two errors only: below the escalation threshold, still enabled.
    assert_eq!(server.connect_count(), 2);
    assert!(client.is_enabled());
    assert!(client
        .connection_error()
        .is_some_and(|e| e.contains("maximum reconnection attempts")));
}
