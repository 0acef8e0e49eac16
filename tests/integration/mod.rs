//! Integration test suite for relay.
//!
//! These tests drive the dispatcher, the workflow executor and the batch
//! executor end to end over a simulated browser bridge.
//!
//! # Test Categories
//!
//! - `registry_dispatch`: Agent resolution, caching and task routing
//! - `workflow_e2e`: Full workflow execution tests
//! - `bulk_operations`: Batching, progress and cancellation
//!
//! # CI Compatibility
//!
//! The simulated bridge never opens a browser. Latency-sensitive tests run
//! on paused tokio time.

mod fixtures;

mod bulk_operations;
mod workflow_e2e;
