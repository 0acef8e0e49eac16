//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Wiring a registry, dispatcher and both executors over one bridge
//! - Predefined item sets and task payloads

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use relay::agent::SimulatedBridge;
use relay::bulk::BatchExecutor;
use relay::core::{PageContext, PageType};
use relay::orchestration::{AgentRegistry, Dispatcher};
use relay::workflow::WorkflowExecutor;

/// Everything a test needs, sharing one registry.
pub struct Harness {
    pub bridge: Arc<SimulatedBridge>,
    pub dispatcher: Arc<Dispatcher>,
    pub workflows: WorkflowExecutor,
    pub bulk: Arc<BatchExecutor>,
}

impl Harness {
    /// Harness on `page` with an instant bridge and mock fallback enabled.
    pub fn on(page: PageType) -> Self {
        Self::build(SimulatedBridge::instant(), page, true)
    }

    /// Harness whose bridge sleeps `latency` per call.
    pub fn with_latency(page: PageType, latency: Duration) -> Self {
        Self::build(Arc::new(SimulatedBridge::new(latency)), page, true)
    }

    /// Harness that surfaces registry failures instead of falling back.
    pub fn strict(page: PageType) -> Self {
        Self::build(SimulatedBridge::instant(), page, false)
    }

    fn build(bridge: Arc<SimulatedBridge>, page: PageType, mock_fallback: bool) -> Self {
        let registry = Arc::new(
            AgentRegistry::new(bridge.clone(), PageContext::new(page))
                .with_mock_fallback(mock_fallback),
        );
        let dispatcher = Arc::new(Dispatcher::new(registry));
        Self {
            bridge,
            workflows: WorkflowExecutor::new(dispatcher.clone()),
            bulk: Arc::new(BatchExecutor::new(dispatcher.clone())),
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.dispatcher.registry()
    }
}

/// `count` catalog items with distinct ids.
pub fn items(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({ "itemId": format!("item-{}", i) }))
        .collect()
}

/// A payload that satisfies every operation's required fields.
pub fn full_payload() -> Value {
    json!({
        "itemId": "item-1",
        "url": "https://shop.example/items/item-1",
        "title": "Handmade walnut cutting board",
        "description": "End-grain walnut board, oiled and ready to use.",
    })
}
