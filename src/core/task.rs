//! Task and result data model.
//!
//! A `Task` is a single routed request; a `TaskResult` is the canonical
//! outcome of every task, workflow step, and bulk item.

use crate::agent::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::util::uuid_id;

uuid_id!(
    /// Unique identifier for a task.
    ///
    /// Uses UUID v4 for generation and provides a short form display
    /// for human-readable output.
    TaskId
);

/// A routed unit of work.
///
/// `task_type` is the externally visible kind. `Dispatcher::route` resolves
/// it to an `(agent_type, operation)` pair and records it here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub agent_type: Option<AgentType>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub priority: Option<i32>,
    /// Upper bound for a single attempt, in milliseconds.
    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<u64>,
    /// Extra attempts after a failed agent execution.
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: &str, data: Value) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.to_string(),
            agent_type: None,
            operation: None,
            data,
            priority: None,
            timeout_ms: None,
            retries: None,
            depends_on: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Record the route chosen by the dispatcher.
    pub fn set_route(&mut self, agent_type: AgentType, operation: &str) {
        self.agent_type = Some(agent_type);
        self.operation = Some(operation.to_string());
    }
}

/// Why a `TaskResult` is unsuccessful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A step's required predecessor is missing or failed.
    DependencyUnmet,
    UnknownTaskType,
    UnknownAgentType,
    UnknownOperation,
    /// The agent operation itself errored or reported failure.
    AgentExecution,
    /// Page-context allow-list mismatch or malformed input.
    Validation,
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::DependencyUnmet => "dependency_unmet",
            FailureKind::UnknownTaskType => "unknown_task_type",
            FailureKind::UnknownAgentType => "unknown_agent_type",
            FailureKind::UnknownOperation => "unknown_operation",
            FailureKind::AgentExecution => "agent_execution",
            FailureKind::Validation => "validation",
            FailureKind::Timeout => "timeout",
        };
        write!(f, "{}", name)
    }
}

/// Canonical outcome of every task, step, and bulk item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl TaskResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            kind: None,
            data: None,
            duration_ms: None,
            timestamp: Utc::now(),
            agent_type: None,
            task_id: None,
        }
    }

    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            kind: Some(kind),
            data: None,
            duration_ms: None,
            timestamp: Utc::now(),
            agent_type: None,
            task_id: None,
        }
    }

    /// Attach a JSON payload. Objects are stored as-is; any other value is
    /// wrapped under a `value` key.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        });
        self
    }

    /// Insert a single key into the payload.
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn with_agent(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn is_kind(&self, kind: FailureKind) -> bool {
        self.kind == Some(kind)
    }
}
