//! Contract Test: Heartbeat
//!
//! Verifies the per-client heartbeat step and tick aggregation.
//!
//! Constraints verified:
//! - A client that is neither ready nor eligible for auth is left alone
//! - Auth recovery is followed by a dead-letter drain and a restart
//! - A client whose auth fails is not drained
//! - A running monitoring loop is not restarted
//! - One client's failure never aborts the tick

mod common;

use common::*;
use scrobble_core::{ClientRegistry, DestinationClient, HeartbeatTask};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn heartbeat_with(clients: Vec<MockClient>) -> HeartbeatTask {
    let registry = Arc::new(ClientRegistry::new());
    registry.set_clients(
        clients
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn DestinationClient>)
            .collect(),
    );
    HeartbeatTask::new(registry, Duration::from_secs(60))
}

#[tokio::test]
async fn unready_ungated_client_is_left_alone() {
    let client = MockClient::new("idle");
    client.ready.store(false, Ordering::SeqCst);
    let counters = client.counters.clone();

    let report = heartbeat_with(vec![client]).tick().await;

    assert_eq!(report.checked, 1);
    assert_eq!(report.restarted, 0);
    assert!(report.errors.is_empty());
    assert_eq!(Counters::get(&counters.test_auth), 0);
    assert_eq!(Counters::get(&counters.dead_letter), 0);
    assert_eq!(Counters::get(&counters.monitoring_started), 0);
}

#[tokio::test]
async fn auth_recovery_drains_and_restarts() {
    let mut client = MockClient::new("recovering");
    client.ready.store(false, Ordering::SeqCst);
    client.auth_gated = true;
    client.can_try_auth = true;
    let counters = client.counters.clone();

    let report = heartbeat_with(vec![client]).tick().await;

    assert_eq!(report.restarted, 1);
    assert_eq!(Counters::get(&counters.test_auth), 1);
    assert_eq!(Counters::get(&counters.dead_letter), 1);
    assert_eq!(Counters::get(&counters.monitoring_started), 1);
}

#[tokio::test]
async fn auth_in_backoff_is_not_attempted() {
    let mut client = MockClient::new("backoff");
    client.ready.store(false, Ordering::SeqCst);
    client.auth_gated = true;
    client.can_try_auth = false;
    let counters = client.counters.clone();

    let report = heartbeat_with(vec![client]).tick().await;

    assert_eq!(report.restarted, 0);
    assert_eq!(Counters::get(&counters.test_auth), 0);
}

#[tokio::test]
async fn failed_auth_stops_the_step() {
    let mut client = MockClient::new("rejected");
    client.ready.store(false, Ordering::SeqCst);
    client.auth_gated = true;
    client.can_try_auth = true;
    client.auth_succeeds = false;
    let counters = client.counters.clone();

    let report = heartbeat_with(vec![client]).tick().await;

    assert_eq!(report.restarted, 0);
    assert!(report.errors.is_empty());
    assert_eq!(Counters::get(&counters.test_auth), 1);
    assert_eq!(Counters::get(&counters.dead_letter), 0);
}

#[tokio::test]
async fn running_monitor_is_not_restarted() {
    let client = MockClient::new("running");
    client.scrobbling.store(true, Ordering::SeqCst);
    let counters = client.counters.clone();

    let report = heartbeat_with(vec![client]).tick().await;

    assert_eq!(report.restarted, 0);
    assert_eq!(Counters::get(&counters.dead_letter), 1);
    assert_eq!(Counters::get(&counters.monitoring_started), 0);
}

#[tokio::test]
async fn one_failing_client_does_not_abort_the_tick() {
    let mut erroring = MockClient::new("erroring");
    erroring.dead_letter_failure = Failure::Error;
    let mut panicking = MockClient::new("panicking");
    panicking.dead_letter_failure = Failure::Panic;
    let healthy = MockClient::new("healthy");
    let counters = healthy.counters.clone();

    let report = heartbeat_with(vec![erroring, panicking, healthy]).tick().await;

    assert_eq!(report.checked, 3);
    assert_eq!(report.restarted, 1);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].0, "erroring");
    assert_eq!(report.errors[1].0, "panicking");
    assert_eq!(Counters::get(&counters.monitoring_started), 1);
}

#[tokio::test]
async fn second_tick_finds_monitor_running() {
    let client = MockClient::new("steady");
    let counters = client.counters.clone();
    let heartbeat = heartbeat_with(vec![client]);

    assert_eq!(heartbeat.tick().await.restarted, 1);
    assert_eq!(heartbeat.tick().await.restarted, 0);
    assert_eq!(Counters::get(&counters.dead_letter), 2);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let client = MockClient::new("looped");
    let counters = client.counters.clone();
    let heartbeat = heartbeat_with(vec![client]);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = heartbeat.spawn(async move {
        let _ = rx.await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = tx.send(());
    handle.await.expect("heartbeat task completes");

    // first tick fires immediately
    assert_eq!(Counters::get(&counters.monitoring_started), 1);
}
