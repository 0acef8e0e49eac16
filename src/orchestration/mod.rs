//! Orchestration layer: agent registry and task dispatch.
//!
//! The registry owns the only state shared across runs (the instance
//! cache); the dispatcher is the single path from a task or step to an
//! agent operation.

mod dispatch;
mod registry;

pub use dispatch::{route_for, Dispatcher, Route, ROUTES};
pub use registry::AgentRegistry;
