//! Workflow type definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::TaskResult;

/// An ordered list of steps plus optional rollback and time limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    /// Dispatched in order after a critical failure halts the run.
    #[serde(default)]
    pub rollback_steps: Vec<WorkflowStep>,
    /// Limit for the whole run, in milliseconds.
    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

impl WorkflowDefinition {
    pub fn new(name: &str, steps: Vec<WorkflowStep>) -> Self {
        Self {
            name: name.to_string(),
            steps,
            rollback_steps: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn with_rollback(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.rollback_steps = steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// One unit of work in a workflow.
///
/// `depends_on` names the operations of earlier steps that must have
/// succeeded before this step is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub agent_type: String,
    pub operation: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// A failed critical step halts the workflow.
    #[serde(default)]
    pub critical: bool,
}

impl WorkflowStep {
    pub fn new(agent_type: &str, operation: &str, data: Value) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            operation: operation.to_string(),
            data,
            depends_on: Vec::new(),
            critical: false,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn depends_on(mut self, operations: &[&str]) -> Self {
        self.depends_on = operations.iter().map(|op| op.to_string()).collect();
        self
    }
}

/// Outcome of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// True when at least one step succeeded.
    pub success: bool,
    /// One entry per attempted step, in declaration order.
    pub results: Vec<TaskResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback_results: Vec<TaskResult>,
    pub message: String,
}

impl WorkflowResult {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
}

/// Lifecycle notifications emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A step is being dispatched.
    StepStarted {
        index: usize,
        operation: String,
    },
    /// A dispatched step settled.
    StepCompleted {
        index: usize,
        operation: String,
        success: bool,
    },
    /// A step was not dispatched because dependencies were unmet.
    StepSkipped {
        index: usize,
        operation: String,
        missing: Vec<String>,
    },
    /// A critical step failed; no further steps run.
    Halted {
        index: usize,
        operation: String,
    },
    /// The run is over.
    Finished {
        success: bool,
        message: String,
    },
}
