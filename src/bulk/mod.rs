//! Bulk runs: one agent operation applied to many items in bounded batches.

mod executor;
mod types;

pub use executor::{partition, BatchExecutor};
pub use types::{
    BulkOperationConfig, BulkOperationResult, BulkOperationStatus, BulkState, OperationId,
};
