use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::test_utils::enable_logger;
use crate::SpoolConfig;

fn test_pipeline() -> Pipeline {
    Pipeline::new(SpoolConfig::default())
}

#[tokio::test]
async fn test_shutdown_reaches_all_stages() {
    enable_logger();
    let pipeline = test_pipeline();
    let mut a = pipeline.register("a");
    let mut b = pipeline.register("b");

    pipeline.shutdown().expect("stages are listening");

    timeout(Duration::from_secs(1), a.shutdown_rx.changed())
        .await
        .expect("stage a should observe shutdown")
        .expect("sender alive");
    timeout(Duration::from_secs(1), b.shutdown_rx.changed())
        .await
        .expect("stage b should observe shutdown")
        .expect("sender alive");
}

#[tokio::test]
async fn test_shutdown_without_listeners_fails() {
    let pipeline = test_pipeline();

    assert!(pipeline.shutdown().is_err());
}

#[tokio::test]
async fn test_update_config_reaches_stages() {
    let pipeline = test_pipeline();
    let mut ctx = pipeline.register("a");

    let next = SpoolConfig {
        spool_size: 2,
        ..SpoolConfig::default()
    };
    pipeline.update_config(next.clone()).expect("stage is listening");

    timeout(Duration::from_secs(1), ctx.config_rx.changed())
        .await
        .expect("stage should observe the update")
        .expect("sender alive");
    let got = ctx.config_rx.borrow_and_update().clone();
    assert_eq!(*got, next);
    assert_eq!(*pipeline.current_config(), next);
}

#[tokio::test]
async fn test_update_config_rejects_invalid_values() {
    let pipeline = test_pipeline();
    let _ctx = pipeline.register("a");

    let bad = SpoolConfig {
        spool_size: 0,
        ..SpoolConfig::default()
    };

    assert!(pipeline.update_config(bad).is_err());
    // the previous configuration stays in effect
    assert_eq!(*pipeline.current_config(), SpoolConfig::default());
}

#[tokio::test]
async fn test_snapshot_aggregates_stage_reports() {
    let pipeline = test_pipeline();
    let mut a = pipeline.register("a");
    let mut b = pipeline.register("b");

    tokio::spawn(async move {
        if let Some(reply) = a.snapshot_rx.recv().await {
            let _ = reply.send(StageSnapshot::new("a").with_entry("k", 1));
        }
    });
    tokio::spawn(async move {
        if let Some(reply) = b.snapshot_rx.recv().await {
            let _ = reply.send(StageSnapshot::new("b").with_entry("k", 2));
        }
    });

    let mut snapshots = pipeline.snapshot().await;
    snapshots.sort_by(|x, y| x.stage.cmp(&y.stage));

    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].stage, "a");
    assert_eq!(snapshots[0].entry("k"), Some("1"));
    assert_eq!(snapshots[1].stage, "b");
    assert_eq!(snapshots[1].entry("k"), Some("2"));
}

#[tokio::test]
async fn test_snapshot_skips_exited_stage() {
    let pipeline = test_pipeline();
    let mut live = pipeline.register("live");
    let dead = pipeline.register("dead");
    drop(dead);

    tokio::spawn(async move {
        if let Some(reply) = live.snapshot_rx.recv().await {
            let _ = reply.send(StageSnapshot::new("live"));
        }
    });

    let snapshots = pipeline.snapshot().await;

    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].stage, "live");
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_skips_unresponsive_stage() {
    let pipeline = test_pipeline();
    // Holds its context but never services requests
    let _stalled = pipeline.register("stalled");

    let snapshots = pipeline.snapshot().await;

    assert!(snapshots.is_empty());
}

#[tokio::test]
async fn test_wait_resolves_after_all_stages_finish() {
    let pipeline = Arc::new(test_pipeline());
    let a = pipeline.register("a");
    let b = pipeline.register("b");

    let waiter = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.wait().await })
    };

    drop(a);
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    drop(b);
    timeout(Duration::from_secs(1), waiter)
        .await
        .expect("wait should resolve")
        .expect("no panic");
}
