//! Bulk operation type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::TaskResult;
use crate::util::uuid_id;

uuid_id!(
    /// Unique identifier for a bulk run.
    OperationId
);

/// Lifecycle state of a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BulkState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkState::Completed | BulkState::Failed | BulkState::Cancelled
        )
    }
}

impl std::fmt::Display for BulkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkState::Pending => write!(f, "pending"),
            BulkState::Running => write!(f, "running"),
            BulkState::Completed => write!(f, "completed"),
            BulkState::Failed => write!(f, "failed"),
            BulkState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Live status of a bulk run. Callers only ever see clones.
///
/// `success_count + failure_count == processed_items` holds at every
/// observation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationStatus {
    pub id: OperationId,
    #[serde(rename = "type")]
    pub operation_type: String,
    pub total_items: usize,
    pub processed_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(rename = "status")]
    pub state: BulkState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl BulkOperationStatus {
    pub fn new(id: OperationId, operation_type: &str, total_items: usize) -> Self {
        Self {
            id,
            operation_type: operation_type.to_string(),
            total_items,
            processed_items: 0,
            success_count: 0,
            failure_count: 0,
            state: BulkState::Pending,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Count one settled item.
    pub fn record(&mut self, success: bool) {
        self.processed_items += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    /// Move to a terminal state and stamp the end time.
    pub fn finish(&mut self, state: BulkState) {
        self.state = state;
        self.end_time = Some(Utc::now());
    }

    pub fn remaining(&self) -> usize {
        self.total_items.saturating_sub(self.processed_items)
    }
}

/// Input of a bulk run: apply one agent operation to every item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationConfig {
    /// Operation invoked on `agent_type` for each item.
    #[serde(rename = "type")]
    pub operation_type: String,
    pub agent_type: String,
    pub items: Vec<Value>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Pause between batches, in milliseconds.
    #[serde(default, rename = "delayBetweenBatches")]
    pub delay_between_batches_ms: Option<u64>,
    /// Receives a status snapshot after every settled item.
    #[serde(skip)]
    pub progress: Option<mpsc::UnboundedSender<BulkOperationStatus>>,
}

impl BulkOperationConfig {
    pub fn new(agent_type: &str, operation_type: &str, items: Vec<Value>) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            agent_type: agent_type.to_string(),
            items,
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_between_batches_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<BulkOperationStatus>) -> Self {
        self.progress = Some(tx);
        self
    }
}

/// Outcome of a bulk run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationResult {
    /// True when at least one item succeeded.
    pub success: bool,
    pub operation_id: OperationId,
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// One entry per settled item, in settlement order.
    pub results: Vec<TaskResult>,
    pub duration_ms: u64,
    #[serde(rename = "status")]
    pub state: BulkState,
}
