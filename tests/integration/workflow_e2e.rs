//! End-to-end workflow execution tests.

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

use relay::core::{FailureKind, PageType};
use relay::workflow::{WorkflowDefinition, WorkflowEvent, WorkflowExecutor, WorkflowStep};
use relay::Error;

use crate::fixtures::Harness;

fn retitle_workflow() -> WorkflowDefinition {
    WorkflowDefinition::new(
        "retitle",
        vec![
            WorkflowStep::new("navigation", "open_item", json!({ "itemId": "item-1" })).critical(),
            WorkflowStep::new("catalog", "fetch_item", json!({ "itemId": "item-1" }))
                .depends_on(&["open_item"]),
            WorkflowStep::new("seo", "optimize_title", json!({ "title": "walnut board" }))
                .depends_on(&["fetch_item"]),
            WorkflowStep::new("catalog", "update_item", json!({ "itemId": "item-1" }))
                .depends_on(&["optimize_title"]),
        ],
    )
}

/// Test: Happy path through three agent types
/// Given an item edit page
/// When the retitle workflow runs
/// Then every step succeeds in declaration order
#[tokio::test]
async fn test_retitle_workflow_completes() {
    let harness = Harness::on(PageType::ItemEdit);

    let result = harness
        .workflows
        .execute_workflow(&retitle_workflow())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.message, "4/4 steps successful");
    let operations: Vec<_> = result
        .results
        .iter()
        .map(|r| r.data.as_ref().unwrap()["operation"].clone())
        .collect();
    assert_eq!(
        operations,
        vec![
            json!("open_item"),
            json!("fetch_item"),
            json!("optimize_title"),
            json!("update_item")
        ]
    );
    assert_eq!(harness.registry().cached_count().await, 3);
}

/// Test: Critical failure stops dependents
/// Given [A critical fails, B depends on A]
/// When the workflow runs
/// Then only A is recorded and B is never dispatched
#[tokio::test]
async fn test_critical_failure_stops_dependents() {
    let harness = Harness::on(PageType::ItemEdit);
    harness.bridge.fail_operation("fetch_item");
    let def = WorkflowDefinition::new(
        "guarded",
        vec![
            WorkflowStep::new("catalog", "fetch_item", json!({ "itemId": "1" })).critical(),
            WorkflowStep::new("catalog", "update_item", json!({ "itemId": "1" }))
                .depends_on(&["fetch_item"]),
        ],
    );

    let result = harness.workflows.execute_workflow(&def).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert!(result.results[0].is_kind(FailureKind::AgentExecution));
    assert_eq!(harness.bridge.call_count(), 1);
}

/// Test: Failed dependency cascades through the chain
/// Given a non-critical first step that fails
/// When later steps depend on it transitively
/// Then each dependent is recorded as unmet without dispatch
#[tokio::test]
async fn test_unmet_dependencies_cascade() {
    let harness = Harness::on(PageType::ItemEdit);
    let mut def = retitle_workflow();
    def.steps[0].critical = false;
    def.steps[0].data = json!({ "itemId": "item-1", "simulateFailure": true });

    let result = harness.workflows.execute_workflow(&def).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.results.len(), 4);
    for skipped in &result.results[1..] {
        assert!(skipped.is_kind(FailureKind::DependencyUnmet));
    }
    assert_eq!(result.results[3].data.as_ref().unwrap()["step"], json!("update_item"));
    assert_eq!(harness.bridge.call_count(), 1);
}

/// Test: Unknown agent type is a step failure
/// Given a step naming an agent type that does not exist
/// When the workflow runs
/// Then that step fails and the rest proceed
#[tokio::test]
async fn test_unknown_agent_type_step() {
    let harness = Harness::on(PageType::ItemEdit);
    let def = WorkflowDefinition::new(
        "mixed",
        vec![
            WorkflowStep::new("pricing", "reprice", json!({})),
            WorkflowStep::new("seo", "generate_tags", json!({})),
        ],
    );

    let result = harness.workflows.execute_workflow(&def).await.unwrap();
    assert!(result.success);
    assert!(result.results[0].is_kind(FailureKind::UnknownAgentType));
    assert_eq!(result.message, "1/2 steps successful");
}

/// Test: Registry fault aborts the run
/// Given mock fallback disabled on a dashboard page
/// When a step needs a catalog agent
/// Then the run ends unsuccessfully with the fault message and partial results
#[tokio::test]
async fn test_registry_fault_aborts_workflow() {
    let harness = Harness::strict(PageType::Dashboard);
    let def = WorkflowDefinition::new(
        "dashboard",
        vec![
            WorkflowStep::new("navigation", "go_back", json!({})),
            WorkflowStep::new("catalog", "list_items", json!({})),
            WorkflowStep::new("navigation", "go_back", json!({})),
        ],
    );

    let result = harness.workflows.execute_workflow(&def).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert!(result.message.contains("not available"));
}

/// Test: Cyclic definitions are rejected up front
#[tokio::test]
async fn test_cycle_rejected() {
    let harness = Harness::on(PageType::ItemEdit);
    let def = WorkflowDefinition::new(
        "loop",
        vec![
            WorkflowStep::new("catalog", "fetch_item", json!({})).depends_on(&["list_items"]),
            WorkflowStep::new("catalog", "list_items", json!({})).depends_on(&["fetch_item"]),
        ],
    );

    let err = harness.workflows.execute_workflow(&def).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(harness.bridge.call_count(), 0);
}

/// Test: Workflow loaded from a JSON file
/// Given a definition written to disk in wire format
/// When it is parsed and run
/// Then rollback steps run after the critical halt
#[tokio::test]
async fn test_workflow_from_file_with_rollback() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("publish.json");
    std::fs::write(
        &path,
        json!({
            "name": "publish",
            "steps": [
                { "agentType": "catalog", "operation": "fetch_item", "data": { "itemId": "7" } },
                { "agentType": "catalog", "operation": "update_item", "data": { "itemId": "7", "simulateFailure": true }, "critical": true },
                { "agentType": "seo", "operation": "generate_tags" }
            ],
            "rollbackSteps": [
                { "agentType": "navigation", "operation": "go_back" }
            ],
            "timeout": 10000
        })
        .to_string(),
    )
    .unwrap();

    let def: WorkflowDefinition =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let harness = Harness::on(PageType::ItemEdit);
    let result = harness.workflows.execute_workflow(&def).await.unwrap();

    assert!(result.success);
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.rollback_results.len(), 1);
    assert_eq!(result.message, "1/2 steps successful");

    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["rollbackResults"].as_array().map(Vec::len), Some(1));
}

/// Test: Whole-run timeout
/// Given a workflow limit shorter than its second step
/// When the workflow runs on paused time
/// Then the first result is kept and the run reports the timeout
#[tokio::test(start_paused = true)]
async fn test_workflow_timeout() {
    let harness = Harness::with_latency(PageType::ItemEdit, Duration::from_millis(100));
    let def = WorkflowDefinition::new(
        "slow",
        vec![
            WorkflowStep::new("catalog", "fetch_item", json!({ "itemId": "1" })),
            WorkflowStep::new("catalog", "fetch_item", json!({ "itemId": "2", "latencyMs": 5000 })),
        ],
    )
    .with_timeout(Duration::from_millis(1000));

    let result = harness.workflows.execute_workflow(&def).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.results.len(), 1);
    assert!(result.message.starts_with("Workflow timed out"));
}

/// Test: Event stream mirrors the run
#[tokio::test]
async fn test_event_stream() {
    let harness = Harness::on(PageType::ItemEdit);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let executor = WorkflowExecutor::new(harness.dispatcher.clone()).with_events(tx);

    executor.execute_workflow(&retitle_workflow()).await.unwrap();
    drop(executor);

    let mut started = 0;
    let mut completed = 0;
    let mut finished = None;
    while let Some(event) = rx.recv().await {
        match event {
            WorkflowEvent::StepStarted { .. } => started += 1,
            WorkflowEvent::StepCompleted { success, .. } => {
                assert!(success);
                completed += 1;
            }
            WorkflowEvent::Finished { success, message } => finished = Some((success, message)),
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!((started, completed), (4, 4));
    assert_eq!(finished, Some((true, "4/4 steps successful".to_string())));
}
