//! Task dispatcher.
//!
//! Routes a task's declared type to an `(AgentType, operation)` pair through
//! a fixed table, resolves the agent from the registry, and normalizes every
//! outcome into a `TaskResult`. Routing failures are answered without
//! touching the registry or any agent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::agent::AgentType;
use crate::core::{FailureKind, Task, TaskResult};
use crate::error::{Error, Result};
use crate::orchestration::registry::AgentRegistry;
use crate::util::{elapsed_ms, with_timeout};
use crate::{rlog_debug, rlog_trace, rlog_warn};

/// One entry of the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub task_type: &'static str,
    pub agent_type: AgentType,
    pub operation: &'static str,
}

const fn route(task_type: &'static str, agent_type: AgentType, operation: &'static str) -> Route {
    Route {
        task_type,
        agent_type,
        operation,
    }
}

/// Task type → agent operation.
pub const ROUTES: &[Route] = &[
    route("seo_analyze", AgentType::Seo, "analyze_page"),
    route("seo_optimize_title", AgentType::Seo, "optimize_title"),
    route("seo_optimize_description", AgentType::Seo, "optimize_description"),
    route("seo_generate_tags", AgentType::Seo, "generate_tags"),
    route("navigate", AgentType::Navigation, "navigate_to"),
    route("open_item", AgentType::Navigation, "open_item"),
    route("go_back", AgentType::Navigation, "go_back"),
    route("fetch_item", AgentType::Catalog, "fetch_item"),
    route("update_item", AgentType::Catalog, "update_item"),
    route("list_items", AgentType::Catalog, "list_items"),
    route("delete_item", AgentType::Catalog, "delete_item"),
];

/// Look up the route for a task type.
pub fn route_for(task_type: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.task_type == task_type)
}

/// Routes tasks to agents.
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    default_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            default_timeout: None,
        }
    }

    /// Bound every attempt that carries no timeout of its own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Resolve and record a task's route. Returns `None` for unknown types.
    pub fn route(task: &mut Task) -> Option<&'static Route> {
        let found = route_for(&task.task_type)?;
        task.set_route(found.agent_type, found.operation);
        Some(found)
    }

    /// Dispatch a single task.
    ///
    /// Honors `Task::timeout` per attempt and re-invokes a failed agent
    /// execution up to `Task::retries` extra times.
    ///
    /// # Errors
    /// Only when the registry cannot produce any agent (fallback disabled).
    pub async fn dispatch(&self, task: &Task) -> Result<TaskResult> {
        let Some(route) = route_for(&task.task_type) else {
            rlog_warn!("Dispatcher: unknown task type '{}'", task.task_type);
            return Ok(TaskResult::failure(
                FailureKind::UnknownTaskType,
                format!("Unknown task type: {}", task.task_type),
            )
            .with_task(task.id));
        };

        rlog_debug!(
            "Dispatcher: task {} ({}) -> {}.{}",
            task.id.short(),
            task.task_type,
            route.agent_type,
            route.operation
        );
        let attempts = task.retries.unwrap_or(0).saturating_add(1);
        let timeout = task.timeout().or(self.default_timeout);
        let result = self
            .invoke(route.agent_type, route.operation, &task.data, timeout, attempts)
            .await?;
        Ok(result.with_task(task.id))
    }

    /// Dispatch an operation named by string agent type, as workflow steps
    /// and bulk runs do.
    pub async fn dispatch_operation(
        &self,
        agent_type: &str,
        operation: &str,
        data: &Value,
    ) -> Result<TaskResult> {
        let agent_type = match agent_type.parse::<AgentType>() {
            Ok(agent_type) => agent_type,
            Err(e) => {
                rlog_warn!("Dispatcher: {}", e);
                return Ok(TaskResult::failure(FailureKind::UnknownAgentType, e.to_string()));
            }
        };
        self.invoke(agent_type, operation, data, self.default_timeout, 1)
            .await
    }

    async fn invoke(
        &self,
        agent_type: AgentType,
        operation: &str,
        data: &Value,
        timeout: Option<Duration>,
        attempts: u32,
    ) -> Result<TaskResult> {
        if !agent_type.supports(operation) {
            let err = Error::UnknownOperation {
                agent_type,
                operation: operation.to_string(),
            };
            return Ok(TaskResult::failure(FailureKind::UnknownOperation, err.to_string())
                .with_agent(agent_type));
        }

        let instance = self.registry.resolve(agent_type).await?;
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match with_timeout(timeout, instance.operation(operation, data)).await {
                Ok(Ok(result)) => result,
                Ok(Err(e @ Error::UnknownOperation { .. })) => {
                    TaskResult::failure(FailureKind::UnknownOperation, e.to_string())
                }
                Ok(Err(e)) => TaskResult::failure(FailureKind::AgentExecution, e.to_string()),
                Err(e) => TaskResult::failure(FailureKind::Timeout, e.to_string()),
            };

            let retryable = matches!(
                result.kind,
                Some(FailureKind::AgentExecution) | Some(FailureKind::Timeout)
            );
            if !result.success && retryable && attempt < attempts {
                rlog_debug!(
                    "Dispatcher: {}.{} attempt {}/{} failed: {}",
                    agent_type,
                    operation,
                    attempt,
                    attempts,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                continue;
            }

            rlog_trace!(
                "Dispatcher: {}.{} settled success={} after {} attempt(s)",
                agent_type,
                operation,
                result.success,
                attempt
            );
            return Ok(result
                .with_agent(agent_type)
                .with_duration_ms(elapsed_ms(start)));
        }
    }
}
