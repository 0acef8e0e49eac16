//! Multi-step workflows.
//!
//! A workflow is an ordered list of agent operations with simple
//! dependency gating and critical-step short-circuiting.

mod executor;
mod graph;
mod types;

pub use executor::WorkflowExecutor;
pub use graph::StepGraph;
pub use types::{WorkflowDefinition, WorkflowEvent, WorkflowResult, WorkflowStep};
