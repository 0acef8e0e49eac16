//! Bulk operation tests: batching, progress and cancellation.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::Instant;

use relay::bulk::{BatchExecutor, BulkOperationConfig, BulkOperationStatus, BulkState};
use relay::config::Config;
use relay::core::{FailureKind, PageType};
use relay::Error;

use crate::fixtures::{items, Harness};

const LATENCY: Duration = Duration::from_millis(100);

/// Test: Twelve items in batches of five
/// Given a bridge with fixed latency on paused time
/// When 12 items run with batch size 5
/// Then they settle in groups of 5, 5 and 2, never more than 5 at once
#[tokio::test(start_paused = true)]
async fn test_batches_settle_in_groups() {
    let harness = Harness::with_latency(PageType::ItemsLibrary, LATENCY);
    let (tx, mut rx) = mpsc::unbounded_channel::<BulkOperationStatus>();
    let config = BulkOperationConfig::new("catalog", "update_item", items(12))
        .with_batch_size(5)
        .with_progress(tx);

    let start = Instant::now();
    let collector = tokio::spawn(async move {
        let mut settled = Vec::new();
        while let Some(status) = rx.recv().await {
            settled.push((start.elapsed(), status.processed_items));
        }
        settled
    });

    let result = harness.bulk.execute(config).await.unwrap();
    let settled = collector.await.unwrap();

    assert_eq!(result.state, BulkState::Completed);
    assert_eq!(result.success_count, 12);
    assert_eq!(harness.bridge.call_count(), 12);
    assert_eq!(harness.bridge.max_in_flight(), 5);

    let mut groups: Vec<usize> = Vec::new();
    let mut last = None;
    for (at, _) in &settled {
        let batch = at.as_millis() / LATENCY.as_millis();
        if last == Some(batch) {
            if let Some(size) = groups.last_mut() {
                *size += 1;
            }
        } else {
            groups.push(1);
            last = Some(batch);
        }
    }
    assert_eq!(groups, vec![5, 5, 2]);
}

/// Test: Counter invariant at every observation
/// Given a mix of valid and invalid items
/// When progress snapshots and polled status are inspected
/// Then success + failure always equals processed
#[tokio::test(start_paused = true)]
async fn test_counters_consistent_everywhere() {
    let harness = Harness::with_latency(PageType::ItemsLibrary, LATENCY);
    let mut batch = items(8);
    batch.insert(2, json!({ "note": "missing id" }));
    batch.insert(6, json!({ "itemId": "boom", "simulateFailure": true }));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = BulkOperationConfig::new("catalog", "fetch_item", batch)
        .with_batch_size(3)
        .with_progress(tx);

    let (id, handle) = harness.bulk.submit(config).await;

    let poller = {
        let bulk = harness.bulk.clone();
        tokio::spawn(async move {
            let mut polls = 0;
            loop {
                let Some(status) = bulk.status(id).await else { break };
                assert_eq!(
                    status.success_count + status.failure_count,
                    status.processed_items
                );
                polls += 1;
                if status.state.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            polls
        })
    };

    let result = handle.await.unwrap().unwrap();
    assert!(poller.await.unwrap() > 1);

    let mut last_processed = 0;
    while let Some(status) = rx.recv().await {
        assert_eq!(status.id, id);
        assert_eq!(
            status.success_count + status.failure_count,
            status.processed_items
        );
        assert!(status.processed_items > last_processed);
        last_processed = status.processed_items;
    }
    assert_eq!(last_processed, 10);

    assert!(result.success);
    assert_eq!(result.success_count, 8);
    assert_eq!(result.failure_count, 2);
    let failures: Vec<_> = result.results.iter().filter(|r| !r.success).collect();
    assert!(failures.iter().any(|r| r.is_kind(FailureKind::Validation)));
    assert!(failures.iter().any(|r| r.is_kind(FailureKind::AgentExecution)));
}

/// Test: Cancellation during the inter-batch delay
/// Given a long delay between batches
/// When the run is cancelled after the first batch settles
/// Then the delay ends early and no further batch starts
#[tokio::test(start_paused = true)]
async fn test_cancel_during_delay() {
    let harness = Harness::with_latency(PageType::ItemsLibrary, LATENCY);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = BulkOperationConfig::new("catalog", "update_item", items(9))
        .with_batch_size(3)
        .with_delay(Duration::from_secs(60))
        .with_progress(tx);

    let start = Instant::now();
    let (id, handle) = harness.bulk.submit(config).await;
    for _ in 0..3 {
        rx.recv().await.unwrap();
    }
    assert!(harness.bulk.cancel(id).await);

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.state, BulkState::Cancelled);
    assert_eq!(result.results.len(), 3);
    assert_eq!(harness.bridge.call_count(), 3);
    assert!(start.elapsed() < Duration::from_secs(60));

    let status = harness.bulk.status(id).await.unwrap();
    assert_eq!(status.state, BulkState::Cancelled);
    assert_eq!(status.processed_items, 3);
    assert_eq!(status.remaining(), 6);
    assert!(status.end_time.is_some());
    assert!(!harness.bulk.cancel(id).await);
}

/// Test: Cancellation mid-batch lets the batch finish
/// Given a batch in flight
/// When the run is cancelled before any item settles
/// Then the in-flight batch still settles and nothing else starts
#[tokio::test(start_paused = true)]
async fn test_cancel_mid_batch_settles_batch() {
    let harness = Harness::with_latency(PageType::ItemsLibrary, LATENCY);
    let config = BulkOperationConfig::new("catalog", "update_item", items(6)).with_batch_size(4);

    let (id, handle) = harness.bulk.submit(config).await;
    tokio::time::sleep(LATENCY / 2).await;
    assert!(harness.bulk.cancel(id).await);

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.state, BulkState::Cancelled);
    assert_eq!(result.results.len(), 4);
    assert_eq!(result.success_count, 4);
}

/// Test: Cancellation during the only batch
/// Given a run whose items all fit in one batch
/// When it is cancelled while that batch is in flight
/// Then the batch settles and the run still ends cancelled
#[tokio::test(start_paused = true)]
async fn test_cancel_during_final_batch() {
    let harness = Harness::with_latency(PageType::ItemsLibrary, LATENCY);
    let config = BulkOperationConfig::new("catalog", "update_item", items(3)).with_batch_size(5);

    let (id, handle) = harness.bulk.submit(config).await;
    tokio::time::sleep(LATENCY / 2).await;
    assert!(harness.bulk.cancel(id).await);

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.state, BulkState::Cancelled);
    assert_eq!(result.results.len(), 3);
    assert_eq!(harness.bridge.call_count(), 3);

    let status = harness.bulk.status(id).await.unwrap();
    assert_eq!(status.state, BulkState::Cancelled);
    assert_eq!(status.processed_items, 3);
    assert!(!harness.bulk.cancel(id).await);
}

/// Test: Registry faults become item failures
/// Given mock fallback disabled and a page the agent is not allowed on
/// When a bulk run targets that agent
/// Then every item fails with its input attached and the run completes
#[tokio::test]
async fn test_registry_fault_is_per_item() {
    let harness = Harness::strict(PageType::Dashboard);
    let config = BulkOperationConfig::new("seo", "analyze_page", items(3));

    let result = harness.bulk.execute(config).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.state, BulkState::Completed);
    assert_eq!(result.failure_count, 3);
    for failure in &result.results {
        let data = failure.data.as_ref().unwrap();
        assert!(data["item"]["itemId"].is_string());
    }
}

/// Test: Invalid batch size
#[tokio::test]
async fn test_zero_batch_size_rejected() {
    let harness = Harness::on(PageType::ItemsLibrary);
    let config = BulkOperationConfig::new("catalog", "update_item", items(3)).with_batch_size(0);

    let err = harness.bulk.execute(config).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(harness.bridge.call_count(), 0);

    let statuses = harness.bulk.operations().await;
    assert_eq!(statuses[0].state, BulkState::Failed);
}

/// Test: Defaults come from the config file
/// Given a relay.toml with batch_size = 2
/// When a run without its own batch size executes
/// Then no more than two items are ever in flight
#[tokio::test(start_paused = true)]
async fn test_config_defaults_apply() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relay.toml");
    std::fs::write(&path, "batch_size = 2\ndelay_between_batches_ms = 10\n").unwrap();
    let config = Config::load_from(&path).unwrap();

    let harness = Harness::with_latency(PageType::ItemsLibrary, LATENCY);
    let executor = BatchExecutor::from_config(harness.dispatcher.clone(), &config);

    let result = executor
        .execute(BulkOperationConfig::new("catalog", "fetch_item", items(5)))
        .await
        .unwrap();
    assert_eq!(result.success_count, 5);
    assert_eq!(harness.bridge.max_in_flight(), 2);
}

/// Test: Bulk config loaded from wire format
#[tokio::test]
async fn test_bulk_config_from_json() {
    let config: BulkOperationConfig = serde_json::from_value(json!({
        "type": "delete_item",
        "agentType": "catalog",
        "items": [{ "itemId": "a" }, { "itemId": "b" }, { "itemId": "c" }],
        "batchSize": 2,
        "delayBetweenBatches": 0
    }))
    .unwrap();

    let harness = Harness::on(PageType::ItemsLibrary);
    let result = harness.bulk.execute(config).await.unwrap();

    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["status"], json!("completed"));
    assert_eq!(wire["successCount"], json!(3));
    assert_eq!(wire["totalItems"], json!(3));
}

/// Test: Independent runs are tracked separately
#[tokio::test]
async fn test_runs_tracked_independently() {
    let harness = Harness::on(PageType::ItemsLibrary);
    let first = harness
        .bulk
        .execute(BulkOperationConfig::new("catalog", "fetch_item", items(2)))
        .await
        .unwrap();
    let second = harness
        .bulk
        .execute(BulkOperationConfig::new("catalog", "list_items", items(3)))
        .await
        .unwrap();

    assert_ne!(first.operation_id, second.operation_id);
    assert_eq!(harness.bulk.operations().await.len(), 2);
    assert_eq!(
        harness.bulk.status(second.operation_id).await.unwrap().total_items,
        3
    );
    assert_eq!(harness.bulk.prune_finished().await, 2);
}
