use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gridmesh_dispatch::{DispatchConfig, Dispatcher};
use gridmesh_partition::PartitionerConfig;
use gridmesh_registry::{RegistryConfig, TaskRegistry};
use gridmesh_types::{SubtaskId, TaskHeader, TaskId};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

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
async fn full_task_flow_from_announcement_to_verification_expiry() {
    init_tracing();

    let registry = Arc::new(TaskRegistry::new(RegistryConfig::default()));
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        DispatchConfig {
            verification_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(10),
        },
    );

    let t0 = Utc::now();
    let id = TaskId::from("render-42");

    // Owner opens a 600-unit task.
    let partitioner = dispatcher
        .open_task(
            header("render-42", 7200, t0),
            PartitionerConfig {
                total_units: 600,
                samples_per_unit: 30,
                preferred_slice: Duration::from_secs(1),
                deadline: Duration::from_secs(3600),
                unit_size_bytes: 1,
            },
        )
        .await
        .unwrap();

    // Workers drain the unit space and deliver results.
    let mut delivered = 0u64;
    let mut subtask_seq = 0u32;
    while let Some(range) = dispatcher.request_work(&id, 3000.0).await.unwrap() {
        let result = vec![1u8; range.count as usize];
        let subtask_id = SubtaskId::new(format!("render-42/st{subtask_seq}"));
        subtask_seq += 1;
        dispatcher
            .deliver_result(subtask_id, &range, &result, t0)
            .await
            .unwrap();
        delivered += range.count;
    }

    assert_eq!(delivered, 600);
    assert!(partitioner.is_finished().await);
    assert_eq!(partitioner.progress().await, 1.0);
    assert!(partitioner.output().await.iter().all(|&b| b == 1));

    // Every delivered subtask has a verification window open.
    let pending = registry.stats().await.pending_verifications;
    assert_eq!(pending, subtask_seq as usize);

    // The external verifier confirms one subtask.
    assert_eq!(
        registry
            .resolve_verification(&SubtaskId::from("render-42/st0"))
            .await,
        Some(id.clone())
    );

    // Nothing expires within the window...
    let report = dispatcher.sweep(t0 + ChronoDuration::seconds(100)).await;
    assert!(report.unconfirmed_tasks.is_empty());

    // ...but past it, every unresolved window flags the task.
    let report = dispatcher.sweep(t0 + ChronoDuration::seconds(3601)).await;
    assert_eq!(report.unconfirmed_tasks.len(), (subtask_seq - 1) as usize);
    assert!(report.unconfirmed_tasks.iter().all(|t| *t == id));

    // Expiry purged the entries: a later sweep reports nothing.
    let report = dispatcher.sweep(t0 + ChronoDuration::seconds(4000)).await;
    assert!(report.unconfirmed_tasks.is_empty());
}

#[tokio::test]
async fn remote_announcements_feed_the_computation_path() {
    init_tracing();

    let registry = Arc::new(TaskRegistry::new(RegistryConfig::default()));
    let dispatcher = Dispatcher::new(Arc::clone(&registry), DispatchConfig::default());

    let now = Utc::now();
    assert!(dispatcher.announce(header("t1", 3600, now), true).await);
    assert!(dispatcher.announce(header("t2", 3600, now), false).await);
    // Duplicate announcement from a second peer: first writer wins.
    assert!(!dispatcher.announce(header("t1", 60, now), true).await);

    // Only the supported task is ever chosen.
    for _ in 0..20 {
        let chosen = registry.get_task_for_computation().await.unwrap();
        assert_eq!(chosen.id, TaskId::from("t1"));
        registry.receive_verification(&chosen.id).await.unwrap();
    }
}

#[tokio::test]
async fn background_sweeper_reports_unconfirmed_tasks() {
    init_tracing();

    let registry = Arc::new(TaskRegistry::new(RegistryConfig::default()));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        DispatchConfig {
            // Zero timeout: the next sweep tick already sees the deadline
            // in the past.
            verification_timeout: Duration::ZERO,
            sweep_interval: Duration::from_millis(20),
        },
    ));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sweeper = dispatcher.spawn_sweeper(tx);

    registry
        .add_to_verification(
            SubtaskId::from("st1"),
            TaskId::from("t1"),
            Duration::ZERO,
            Utc::now() - ChronoDuration::seconds(1),
        )
        .await
        .unwrap();

    let unconfirmed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("sweeper did not report in time")
        .expect("channel closed");
    assert_eq!(unconfirmed, TaskId::from("t1"));

    sweeper.abort();
}
