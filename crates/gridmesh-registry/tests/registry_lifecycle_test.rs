//! Task Registry Lifecycle Integration Test
//!
//! Exercises the full header state machine across the three contexts that
//! mutate one registry in production:
//! 1. Inbound announcements (add_header)
//! 2. The work-dispatch path (get_task_for_computation / receive_verification)
//! 3. The periodic sweep loop (sweep / sweep_verification)

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gridmesh_registry::{RegistryConfig, TaskRegistry};
use gridmesh_types::{SubtaskId, TaskHeader, TaskId};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn header(id: &str, ttl_secs: u64, now: DateTime<Utc>) -> TaskHeader {
    TaskHeader::new(
        TaskId::from(id),
        "10.0.0.7".parse::<IpAddr>().unwrap(),
        40102,
        Duration::from_secs(ttl_secs),
        Duration::from_secs(600),
        1 << 20,
        256 << 20,
        now,
    )
}

#[tokio::test]
async fn header_lifecycle_from_announced_to_forgotten() {
    let registry = TaskRegistry::new(RegistryConfig {
        removed_task_timeout: Duration::from_secs(180),
    });
    let t0 = Utc::now();
    let id = TaskId::from("t1");

    // Announced.
    assert!(registry.add_header(header("t1", 3600, t0), true).await);

    // Active: two workers pick it up.
    assert!(registry.get_task_for_computation().await.is_some());
    assert!(registry.get_task_for_computation().await.is_some());

    // Removed while requests are still outstanding: the header is gone at
    // once, the active record survives until the count drains.
    registry.remove_header(&id, t0).await;
    assert!(registry.header(&id).await.is_none());
    assert_eq!(registry.stats().await.active_tasks, 1);

    // Re-announcing inside the anti-flapping window is rejected silently.
    assert!(!registry.add_header(header("t1", 3600, t0), true).await);

    // Both verifications come back; the record drains and is purged once.
    registry.receive_verification(&id).await.unwrap();
    registry.receive_verification(&id).await.unwrap();
    assert_eq!(registry.stats().await.active_tasks, 0);

    // Forgotten: after the window a sweep drops the marker and the id is
    // announceable again.
    let t1 = t0 + ChronoDuration::seconds(181);
    registry.sweep(t1).await;
    assert!(registry.add_header(header("t1", 3600, t1), true).await);
}

#[tokio::test]
async fn expiry_and_verification_sweeps_batch_correctly() {
    let registry = TaskRegistry::new(RegistryConfig::default());
    let t0 = Utc::now();

    registry.add_header(header("short", 60, t0), true).await;
    registry.add_header(header("long", 7200, t0), true).await;

    registry
        .add_to_verification(
            SubtaskId::from("short/st0"),
            TaskId::from("short"),
            Duration::from_secs(100),
            t0,
        )
        .await
        .unwrap();
    registry
        .add_to_verification(
            SubtaskId::from("long/st0"),
            TaskId::from("long"),
            Duration::from_secs(3600),
            t0,
        )
        .await
        .unwrap();

    // First sweep: only the short-lived header and the short verification
    // window have run out.
    let t1 = t0 + ChronoDuration::seconds(200);
    assert_eq!(registry.sweep(t1).await, vec![TaskId::from("short")]);
    assert_eq!(
        registry.sweep_verification(t1).await,
        vec![TaskId::from("short")]
    );

    // The surviving header aged but lives on.
    let long = registry.header(&TaskId::from("long")).await.unwrap();
    assert_eq!(long.ttl, Duration::from_secs(7000));

    // Second sweep far in the future takes the rest.
    let t2 = t0 + ChronoDuration::seconds(10_000);
    assert_eq!(registry.sweep(t2).await, vec![TaskId::from("long")]);
    assert_eq!(
        registry.sweep_verification(t2).await,
        vec![TaskId::from("long")]
    );

    // Everything is drained; further sweeps are no-ops.
    let stats = registry.stats().await;
    assert_eq!(stats.known_tasks, 0);
    assert_eq!(stats.pending_verifications, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_announcements_and_sweeps_leave_no_half_state() {
    const TASKS: usize = 200;

    let registry = Arc::new(TaskRegistry::new(RegistryConfig::default()));

    // Announcements race a sweep loop; every id must end up either present
    // with an aged ttl or cleanly absent, never in between.
    let announcer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut accepted = 0usize;
            for i in 0..TASKS {
                let now = Utc::now();
                if registry
                    .add_header(header(&format!("t{i}"), 3600, now), true)
                    .await
                {
                    accepted += 1;
                }
                tokio::task::yield_now().await;
            }
            accepted
        })
    };

    let sweeper = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for _ in 0..50 {
                registry.sweep(Utc::now()).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let accepted = announcer.await.unwrap();
    sweeper.await.unwrap();
    registry.sweep(Utc::now()).await;

    // Fresh ids with hour-long ttls never expire mid-test.
    assert_eq!(accepted, TASKS);
    let headers = registry.known_headers().await;
    assert_eq!(headers.len(), TASKS);
    for h in &headers {
        assert!(h.ttl <= Duration::from_secs(3600));
        assert!(!h.is_expired());
    }

    let stats = registry.stats().await;
    assert_eq!(stats.known_tasks, stats.supported_tasks);
    assert_eq!(stats.removed_markers, 0);
}
