//! Core domain models for relay.
//!
//! Tasks, results, and the page context descriptor shared by the registry,
//! dispatcher, and executors.

pub mod context;
pub mod task;

pub use context::{PageContext, PageType};
pub use task::{FailureKind, Task, TaskId, TaskResult};
