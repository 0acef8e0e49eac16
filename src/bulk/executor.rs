//! Batch executor.
//!
//! Applies one agent operation to every item of a bulk run. Items are split
//! into consecutive batches; a batch runs concurrently and fully settles
//! before the next one starts. Cancellation is honored at batch boundaries
//! and interrupts the inter-batch delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bulk::types::{
    BulkOperationConfig, BulkOperationResult, BulkOperationStatus, BulkState, OperationId,
};
use crate::config::{Config, DEFAULT_BATCH_SIZE};
use crate::core::{FailureKind, TaskResult};
use crate::error::{Error, Result};
use crate::orchestration::Dispatcher;
use crate::util::elapsed_ms;
use crate::{rlog, rlog_debug, rlog_error, rlog_warn};

struct Tracked {
    status: BulkOperationStatus,
    cancel: CancellationToken,
}

/// Split `items` into consecutive groups of at most `batch_size`.
///
/// # Errors
/// `Error::Validation` when `batch_size` is zero.
pub fn partition(items: &[Value], batch_size: usize) -> Result<Vec<&[Value]>> {
    if batch_size == 0 {
        return Err(Error::Validation(
            "batchSize must be at least 1".to_string(),
        ));
    }
    Ok(items.chunks(batch_size).collect())
}

/// Runs bulk operations and tracks their status by id.
pub struct BatchExecutor {
    dispatcher: Arc<Dispatcher>,
    operations: RwLock<HashMap<OperationId, Tracked>>,
    batch_size: usize,
    delay: Duration,
}

impl BatchExecutor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            operations: RwLock::new(HashMap::new()),
            batch_size: DEFAULT_BATCH_SIZE,
            delay: Duration::ZERO,
        }
    }

    /// Take the default batch size and delay from `config`.
    pub fn from_config(dispatcher: Arc<Dispatcher>, config: &Config) -> Self {
        Self::new(dispatcher)
            .with_batch_size(config.batch_size)
            .with_delay(config.delay_between_batches())
    }

    /// Batch size for runs that do not set one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Inter-batch delay for runs that do not set one.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run a bulk operation to completion.
    ///
    /// Per-item failures never abort the run; they are counted and reported
    /// in `results`. `success` is true when at least one item succeeded.
    ///
    /// # Errors
    /// `Error::Validation` for a zero batch size. The run is registered and
    /// marked failed before the error is returned.
    pub async fn execute(&self, config: BulkOperationConfig) -> Result<BulkOperationResult> {
        let (id, cancel) = self.register(&config).await;
        self.run(id, config, cancel).await
    }

    /// Start a bulk operation in the background.
    ///
    /// The id is registered before this returns, so `cancel` and `status`
    /// work immediately.
    pub async fn submit(
        self: &Arc<Self>,
        config: BulkOperationConfig,
    ) -> (OperationId, JoinHandle<Result<BulkOperationResult>>) {
        let (id, cancel) = self.register(&config).await;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(id, config, cancel).await });
        (id, handle)
    }

    /// Snapshot of a run's status.
    pub async fn status(&self, id: OperationId) -> Option<BulkOperationStatus> {
        self.operations
            .read()
            .await
            .get(&id)
            .map(|tracked| tracked.status.clone())
    }

    /// Snapshots of every tracked run.
    pub async fn operations(&self) -> Vec<BulkOperationStatus> {
        self.operations
            .read()
            .await
            .values()
            .map(|tracked| tracked.status.clone())
            .collect()
    }

    /// Request cancellation. Returns false for unknown or finished runs.
    ///
    /// Batches already in flight settle normally; no new batch starts. A
    /// run that accepted the request always ends `Cancelled`, even when
    /// the request arrived during its final batch.
    pub async fn cancel(&self, id: OperationId) -> bool {
        let operations = self.operations.read().await;
        match operations.get(&id) {
            Some(tracked) if !tracked.status.state.is_terminal() => {
                rlog!("Bulk {}: cancellation requested", id.short());
                tracked.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Forget runs in a terminal state. Returns how many were removed.
    pub async fn prune_finished(&self) -> usize {
        let mut operations = self.operations.write().await;
        let before = operations.len();
        operations.retain(|_, tracked| !tracked.status.state.is_terminal());
        before - operations.len()
    }

    async fn register(&self, config: &BulkOperationConfig) -> (OperationId, CancellationToken) {
        let id = OperationId::new();
        let cancel = CancellationToken::new();
        let status = BulkOperationStatus::new(id, &config.operation_type, config.items.len());
        self.operations.write().await.insert(
            id,
            Tracked {
                status,
                cancel: cancel.clone(),
            },
        );
        (id, cancel)
    }

    async fn run(
        &self,
        id: OperationId,
        config: BulkOperationConfig,
        cancel: CancellationToken,
    ) -> Result<BulkOperationResult> {
        let start = Instant::now();
        let batch_size = config.batch_size.unwrap_or(self.batch_size);
        let delay = config
            .delay_between_batches_ms
            .map(Duration::from_millis)
            .unwrap_or(self.delay);

        let batches = match partition(&config.items, batch_size) {
            Ok(batches) => batches,
            Err(e) => {
                rlog_error!("Bulk {}: {}", id.short(), e);
                self.finish(id, BulkState::Failed).await;
                return Err(e);
            }
        };

        rlog!(
            "Bulk {}: {}.{} over {} item(s) in {} batch(es)",
            id.short(),
            config.agent_type,
            config.operation_type,
            config.items.len(),
            batches.len()
        );
        self.set_state(id, BulkState::Running).await;

        let mut results = Vec::with_capacity(config.items.len());
        let outcome = self
            .run_batches(id, &config, &batches, delay, &cancel, &mut results)
            .await;

        let state = match outcome {
            Ok(true) => BulkState::Cancelled,
            Ok(false) => BulkState::Completed,
            Err(e) => {
                rlog_error!("Bulk {}: failed: {}", id.short(), e);
                self.finish(id, BulkState::Failed).await;
                return Err(e);
            }
        };
        let status = self.finish(id, state).await.ok_or_else(|| {
            Error::OperationNotFound(id.to_string())
        })?;
        let state = status.state;

        rlog!(
            "Bulk {}: {} ({}/{} succeeded, {} failed)",
            id.short(),
            state,
            status.success_count,
            status.total_items,
            status.failure_count
        );
        Ok(BulkOperationResult {
            success: status.success_count > 0,
            operation_id: id,
            total_items: status.total_items,
            success_count: status.success_count,
            failure_count: status.failure_count,
            results,
            duration_ms: elapsed_ms(start),
            state,
        })
    }

    /// Returns whether the run was cancelled.
    async fn run_batches(
        &self,
        id: OperationId,
        config: &BulkOperationConfig,
        batches: &[&[Value]],
        delay: Duration,
        cancel: &CancellationToken,
        results: &mut Vec<TaskResult>,
    ) -> Result<bool> {
        let mut progress_open = config.progress.is_some();

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                rlog!(
                    "Bulk {}: cancelled before batch {}/{}",
                    id.short(),
                    index + 1,
                    batches.len()
                );
                return Ok(true);
            }

            rlog_debug!(
                "Bulk {}: batch {}/{} ({} item(s))",
                id.short(),
                index + 1,
                batches.len(),
                batch.len()
            );
            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .map(|item| self.run_item(config, item))
                .collect();

            while let Some(result) = pending.next().await {
                let snapshot = self.record(id, result.success).await?;
                results.push(result);
                if let (true, Some(tx)) = (progress_open, &config.progress) {
                    if tx.send(snapshot).is_err() {
                        rlog_warn!("Bulk {}: progress receiver dropped", id.short());
                        progress_open = false;
                    }
                }
            }

            if index + 1 < batches.len() && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
        Ok(false)
    }

    async fn run_item(&self, config: &BulkOperationConfig, item: &Value) -> TaskResult {
        match self
            .dispatcher
            .dispatch_operation(&config.agent_type, &config.operation_type, item)
            .await
        {
            Ok(result) => result,
            Err(e) => TaskResult::failure(FailureKind::AgentExecution, e.to_string())
                .with_field("item", item.clone()),
        }
    }

    async fn record(&self, id: OperationId, success: bool) -> Result<BulkOperationStatus> {
        let mut operations = self.operations.write().await;
        let tracked = operations
            .get_mut(&id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;
        tracked.status.record(success);
        Ok(tracked.status.clone())
    }

    async fn set_state(&self, id: OperationId, state: BulkState) {
        if let Some(tracked) = self.operations.write().await.get_mut(&id) {
            tracked.status.state = state;
        }
    }

    /// Move a run to its terminal state. A cancel accepted after the last
    /// batch boundary still turns `Completed` into `Cancelled`; `cancel`
    /// holds the read lock while it fires the token, so the two cannot
    /// interleave.
    async fn finish(&self, id: OperationId, state: BulkState) -> Option<BulkOperationStatus> {
        let mut operations = self.operations.write().await;
        let tracked = operations.get_mut(&id)?;
        let state = match state {
            BulkState::Completed if tracked.cancel.is_cancelled() => BulkState::Cancelled,
            other => other,
        };
        tracked.status.finish(state);
        Some(tracked.status.clone())
    }
}
