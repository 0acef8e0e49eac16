//! Workflow executor.
//!
//! Runs a workflow's steps strictly in declaration order. Each step is gated
//! on the recorded success of the operations it depends on; a failed
//! critical step halts the run. Step failures are captured in the results,
//! while a dispatcher fault aborts the whole run.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use crate::core::{FailureKind, TaskResult};
use crate::error::{Error, Result};
use crate::orchestration::Dispatcher;
use crate::util::with_timeout;
use crate::workflow::graph::StepGraph;
use crate::workflow::types::{WorkflowDefinition, WorkflowEvent, WorkflowResult, WorkflowStep};
use crate::{rlog, rlog_debug, rlog_error, rlog_warn};

/// How the step loop ended.
enum Halt {
    /// Every step was attempted.
    Exhausted,
    /// A critical step failed at this position.
    Critical(usize),
}

/// Results accumulated by one run. Lives outside the step loop so that a
/// timeout or fault keeps what was recorded so far.
#[derive(Default)]
struct RunState {
    results: Vec<TaskResult>,
    /// Operation name -> success of its latest recorded result.
    recorded: HashMap<String, bool>,
}

impl RunState {
    fn record(&mut self, step: &WorkflowStep, result: TaskResult) {
        self.recorded.insert(step.operation.clone(), result.success);
        self.results.push(result);
    }

    fn unmet<'a>(&self, step: &'a WorkflowStep) -> Vec<&'a str> {
        step.depends_on
            .iter()
            .filter(|dep| self.recorded.get(dep.as_str()) != Some(&true))
            .map(String::as_str)
            .collect()
    }
}

/// Executes workflow definitions through a shared dispatcher.
///
/// # Example
///
/// ```ignore
/// let executor = WorkflowExecutor::new(dispatcher);
/// let result = executor.execute_workflow(&definition).await?;
/// println!("{}", result.message); // "2/3 steps successful"
/// ```
pub struct WorkflowExecutor {
    dispatcher: Arc<Dispatcher>,
    event_tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl WorkflowExecutor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            event_tx: None,
        }
    }

    /// Emit `WorkflowEvent`s on `tx` while running.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Run a workflow.
    ///
    /// `success` is true when at least one step succeeded; `message` reports
    /// `"<succeeded>/<attempted> steps successful"`.
    ///
    /// # Errors
    /// `Error::Validation` when the step dependencies reference the step
    /// itself or form a cycle. Nothing is dispatched in that case.
    pub async fn execute_workflow(&self, definition: &WorkflowDefinition) -> Result<WorkflowResult> {
        let graph = StepGraph::build(&definition.steps)?;
        for (position, name) in graph
            .forward_references()
            .iter()
            .chain(graph.dangling_references())
        {
            rlog_warn!(
                "Workflow '{}': step {} depends on '{}' which has no earlier step",
                definition.name,
                position,
                name
            );
        }

        rlog!(
            "Workflow '{}': starting {} step(s)",
            definition.name,
            definition.steps.len()
        );

        let mut run = RunState::default();
        let outcome = with_timeout(definition.timeout(), self.run_steps(definition, &mut run)).await;

        let mut rollback_results = Vec::new();
        let result = match outcome {
            Ok(Ok(halt)) => {
                if let Halt::Critical(position) = halt {
                    rlog_warn!(
                        "Workflow '{}': halted at critical step {} ({})",
                        definition.name,
                        position,
                        definition.steps[position].operation
                    );
                    rollback_results = self.rollback(definition).await;
                }
                let succeeded = run.results.iter().filter(|r| r.success).count();
                WorkflowResult {
                    success: succeeded > 0,
                    message: format!("{}/{} steps successful", succeeded, run.results.len()),
                    results: run.results,
                    rollback_results,
                }
            }
            Ok(Err(e)) => self.aborted(definition, run, e.to_string()),
            Err(Error::Timeout(limit)) => self.aborted(
                definition,
                run,
                format!("Workflow timed out after {:?}", limit),
            ),
            Err(e) => self.aborted(definition, run, e.to_string()),
        };

        rlog!(
            "Workflow '{}': finished success={} ({})",
            definition.name,
            result.success,
            result.message
        );
        self.emit(WorkflowEvent::Finished {
            success: result.success,
            message: result.message.clone(),
        });
        Ok(result)
    }

    async fn run_steps(&self, definition: &WorkflowDefinition, run: &mut RunState) -> Result<Halt> {
        for (index, step) in definition.steps.iter().enumerate() {
            let missing = run.unmet(step);
            if !missing.is_empty() {
                rlog_debug!(
                    "Workflow '{}': step {} ({}) skipped, unmet: {}",
                    definition.name,
                    index,
                    step.operation,
                    missing.join(", ")
                );
                let result = TaskResult::failure(
                    FailureKind::DependencyUnmet,
                    format!(
                        "Step {} has unmet dependencies: {}",
                        step.operation,
                        missing.join(", ")
                    ),
                )
                .with_field("step", json!(step.operation));
                self.emit(WorkflowEvent::StepSkipped {
                    index,
                    operation: step.operation.clone(),
                    missing: missing.iter().map(|m| m.to_string()).collect(),
                });
                run.record(step, result);

                if step.critical {
                    self.emit(WorkflowEvent::Halted {
                        index,
                        operation: step.operation.clone(),
                    });
                    return Ok(Halt::Critical(index));
                }
                continue;
            }

            self.emit(WorkflowEvent::StepStarted {
                index,
                operation: step.operation.clone(),
            });
            let result = self
                .dispatcher
                .dispatch_operation(&step.agent_type, &step.operation, &step.data)
                .await?;
            let success = result.success;
            rlog_debug!(
                "Workflow '{}': step {} ({}) success={}",
                definition.name,
                index,
                step.operation,
                success
            );
            run.record(step, result);
            self.emit(WorkflowEvent::StepCompleted {
                index,
                operation: step.operation.clone(),
                success,
            });

            if !success && step.critical {
                self.emit(WorkflowEvent::Halted {
                    index,
                    operation: step.operation.clone(),
                });
                return Ok(Halt::Critical(index));
            }
        }
        Ok(Halt::Exhausted)
    }

    /// Best-effort rollback: every step is dispatched, none is gated.
    async fn rollback(&self, definition: &WorkflowDefinition) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(definition.rollback_steps.len());
        for step in &definition.rollback_steps {
            let result = match self
                .dispatcher
                .dispatch_operation(&step.agent_type, &step.operation, &step.data)
                .await
            {
                Ok(result) => result,
                Err(e) => TaskResult::failure(FailureKind::AgentExecution, e.to_string()),
            };
            results.push(result);
        }
        if !results.is_empty() {
            rlog!(
                "Workflow '{}': rollback ran {} step(s), {} succeeded",
                definition.name,
                results.len(),
                results.iter().filter(|r| r.success).count()
            );
        }
        results
    }

    fn aborted(&self, definition: &WorkflowDefinition, run: RunState, message: String) -> WorkflowResult {
        rlog_error!("Workflow '{}': aborted: {}", definition.name, message);
        WorkflowResult {
            success: false,
            results: run.results,
            rollback_results: Vec::new(),
            message,
        }
    }
}
