//! Supervisor lifecycle and timers. Timer tests run on paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeListClient, did, harness};
use tokio::sync::Notify;
use didlist::engine::{Supervisor, SupervisorConfig};
use didlist::storage;

fn quiet_config() -> SupervisorConfig {
    SupervisorConfig {
        submit_interval: Duration::from_secs(3600),
        save_interval: Duration::from_secs(3600),
        stats_interval: None,
    }
}

#[tokio::test]
async fn shutdown_performs_final_save() {
    let h = harness(FakeListClient::new().with_pages(vec![vec![did("did:plc:aaa")]]));
    h.lister.restore().await.unwrap();
    h.lister.enqueue(did("did:plc:bbb")).unwrap();

    let supervisor = Supervisor::new(h.lister.clone(), quiet_config());
    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    supervisor.shutdown();
    handle.await.unwrap().unwrap();

    assert_eq!(
        storage::load(&h.pending_path()).await.unwrap(),
        Some(vec![did("did:plc:bbb")])
    );
    assert_eq!(
        storage::load(&h.added_path()).await.unwrap(),
        Some(vec![did("did:plc:aaa")])
    );
    // No submission pass ran.
    assert!(h.client.submitted().is_empty());
}

#[tokio::test]
async fn shutdown_before_ready_saves_nothing() {
    let h = harness(FakeListClient::new());

    let supervisor = Supervisor::new(h.lister.clone(), quiet_config());
    supervisor.shutdown();
    supervisor.run().await.unwrap();

    assert!(!h.pending_path().exists());
    assert!(!h.added_path().exists());
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn submit_timer_drains_pending() {
    let h = harness(FakeListClient::new());
    h.lister.restore().await.unwrap();
    h.lister.enqueue(did("did:plc:aaa")).unwrap();

    let supervisor = Supervisor::new(
        h.lister.clone(),
        SupervisorConfig {
            submit_interval: Duration::from_secs(60),
            ..quiet_config()
        },
    );
    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(h.client.submitted().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.client.submitted(), vec![did("did:plc:aaa")]);
    assert_eq!(h.lister.added_ids(), vec![did("did:plc:aaa")]);
    assert!(h.lister.pending_ids().is_empty());

    supervisor.shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn save_timer_writes_snapshots() {
    let h = harness(FakeListClient::new().with_pages(vec![vec![did("did:plc:aaa")]]));
    h.lister.restore().await.unwrap();
    h.lister.enqueue(did("did:plc:bbb")).unwrap();

    let supervisor = Supervisor::new(
        h.lister.clone(),
        SupervisorConfig {
            save_interval: Duration::from_secs(120),
            ..quiet_config()
        },
    );
    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_secs(119)).await;
    assert!(!h.pending_path().exists());

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(2)).await;
        if h.added_path().exists() {
            break;
        }
    }
    assert_eq!(
        storage::load(&h.pending_path()).await.unwrap(),
        Some(vec![did("did:plc:bbb")])
    );
    assert_eq!(
        storage::load(&h.added_path()).await.unwrap(),
        Some(vec![did("did:plc:aaa")])
    );
    assert!(h.client.submitted().is_empty());

    supervisor.shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_pass_keeps_in_flight_identifier() {
    let gate = Arc::new(Notify::new());
    let h = harness(FakeListClient::new().gated(Arc::clone(&gate)));
    h.lister.restore().await.unwrap();
    h.lister.enqueue(did("did:plc:ccc")).unwrap();

    let supervisor = Supervisor::new(
        h.lister.clone(),
        SupervisorConfig {
            submit_interval: Duration::from_secs(10),
            ..quiet_config()
        },
    );
    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    for _ in 0..30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if !h.client.submitted().is_empty() {
            break;
        }
    }
    assert_eq!(h.client.submitted(), vec![did("did:plc:ccc")]);
    assert_eq!(h.lister.stats().in_flight, 1);

    supervisor.shutdown();
    handle.await.unwrap().unwrap();

    assert_eq!(
        storage::load(&h.pending_path()).await.unwrap(),
        Some(vec![did("did:plc:ccc")])
    );
    assert_eq!(storage::load(&h.added_path()).await.unwrap(), Some(vec![]));
}

#[test]
fn default_config_matches_documented_schedule() {
    let config = SupervisorConfig::default();
    assert_eq!(config.submit_interval, Duration::from_secs(60));
    assert_eq!(config.save_interval, Duration::from_secs(1800));
    assert_eq!(config.stats_interval, Some(Duration::from_secs(10)));
}
