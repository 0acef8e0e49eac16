//! Concrete agent implementations.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use crate::core::{FailureKind, PageContext, TaskResult};
use crate::error::{Error, Result};
use crate::util::elapsed_ms;

use super::bridge::{BridgeRequest, BrowserBridge};
use super::AgentType;

/// Connection shared by the bridge-backed agents.
struct BridgeLink {
    agent_type: AgentType,
    bridge: Arc<dyn BrowserBridge>,
    context: PageContext,
}

impl BridgeLink {
    fn connect(
        agent_type: AgentType,
        bridge: Arc<dyn BrowserBridge>,
        context: &PageContext,
    ) -> Result<Self> {
        if !bridge.is_connected() {
            return Err(Error::AgentConstruction {
                agent_type,
                reason: "browser bridge is not connected".to_string(),
            });
        }
        Ok(Self {
            agent_type,
            bridge,
            context: context.clone(),
        })
    }

    async fn call(&self, operation: &str, data: &Value) -> TaskResult {
        let start = Instant::now();
        let request = BridgeRequest {
            agent_type: self.agent_type,
            operation: operation.to_string(),
            data: data.clone(),
            context: self.context.clone(),
        };
        let result = match self.bridge.invoke(request).await {
            Ok(value) => TaskResult::success(format!("{} completed", operation)).with_data(value),
            Err(e) => TaskResult::failure(FailureKind::AgentExecution, e.to_string()),
        };
        result.with_duration_ms(elapsed_ms(start))
    }

    fn release(&self) {
        self.bridge.release(self.agent_type);
    }
}

impl std::fmt::Debug for BridgeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeLink")
            .field("agent_type", &self.agent_type)
            .field("context", &self.context)
            .finish()
    }
}

fn require_str<'a>(data: &'a Value, key: &str) -> std::result::Result<&'a str, TaskResult> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            TaskResult::failure(
                FailureKind::Validation,
                format!("missing required field '{}'", key),
            )
        })
}

/// Search-optimization agent for item pages.
#[derive(Debug)]
pub struct SeoAgent {
    link: BridgeLink,
}

impl SeoAgent {
    pub fn new(bridge: Arc<dyn BrowserBridge>, context: &PageContext) -> Result<Self> {
        Ok(Self {
            link: BridgeLink::connect(AgentType::Seo, bridge, context)?,
        })
    }

    pub async fn operation(&self, name: &str, data: &Value) -> TaskResult {
        let checked = match name {
            "optimize_title" => require_str(data, "title").map(|_| ()),
            "optimize_description" => require_str(data, "description").map(|_| ()),
            _ => Ok(()),
        };
        match checked {
            Ok(()) => self.link.call(name, data).await,
            Err(rejected) => rejected,
        }
    }
}

/// Moves the browser between pages.
#[derive(Debug)]
pub struct NavigationAgent {
    link: BridgeLink,
}

impl NavigationAgent {
    pub fn new(bridge: Arc<dyn BrowserBridge>, context: &PageContext) -> Result<Self> {
        Ok(Self {
            link: BridgeLink::connect(AgentType::Navigation, bridge, context)?,
        })
    }

    pub async fn operation(&self, name: &str, data: &Value) -> TaskResult {
        let checked = match name {
            "navigate_to" => require_str(data, "url").map(|_| ()),
            "open_item" => require_str(data, "itemId").map(|_| ()),
            _ => Ok(()),
        };
        match checked {
            Ok(()) => self.link.call(name, data).await,
            Err(rejected) => rejected,
        }
    }
}

/// Reads and edits catalog items.
#[derive(Debug)]
pub struct CatalogAgent {
    link: BridgeLink,
}

impl CatalogAgent {
    pub fn new(bridge: Arc<dyn BrowserBridge>, context: &PageContext) -> Result<Self> {
        Ok(Self {
            link: BridgeLink::connect(AgentType::Catalog, bridge, context)?,
        })
    }

    pub async fn operation(&self, name: &str, data: &Value) -> TaskResult {
        if name != "list_items" {
            if let Err(rejected) = require_str(data, "itemId") {
                return rejected;
            }
        }
        self.link.call(name, data).await
    }
}

/// Stand-in that answers every operation of its kind with a simulated
/// success, without touching the bridge.
#[derive(Debug)]
pub struct MockAgent {
    agent_type: AgentType,
}

impl MockAgent {
    pub fn new(agent_type: AgentType) -> Self {
        Self { agent_type }
    }

    pub async fn operation(&self, name: &str, data: &Value) -> TaskResult {
        TaskResult::success(format!("{} simulated by mock {} agent", name, self.agent_type))
            .with_data(json!({
                "mock": true,
                "operation": name,
                "input": data,
            }))
            .with_duration_ms(0)
    }
}

/// Closed set of agent implementations.
#[derive(Debug)]
pub enum AgentVariant {
    Seo(SeoAgent),
    Navigation(NavigationAgent),
    Catalog(CatalogAgent),
    Mock(MockAgent),
}

impl AgentVariant {
    /// Construct the real implementation for `agent_type`.
    pub fn build(
        agent_type: AgentType,
        bridge: Arc<dyn BrowserBridge>,
        context: &PageContext,
    ) -> Result<Self> {
        Ok(match agent_type {
            AgentType::Seo => AgentVariant::Seo(SeoAgent::new(bridge, context)?),
            AgentType::Navigation => {
                AgentVariant::Navigation(NavigationAgent::new(bridge, context)?)
            }
            AgentType::Catalog => AgentVariant::Catalog(CatalogAgent::new(bridge, context)?),
        })
    }

    pub fn mock(agent_type: AgentType) -> Self {
        AgentVariant::Mock(MockAgent::new(agent_type))
    }

    pub(crate) async fn operation(&self, name: &str, data: &Value) -> TaskResult {
        match self {
            AgentVariant::Seo(agent) => agent.operation(name, data).await,
            AgentVariant::Navigation(agent) => agent.operation(name, data).await,
            AgentVariant::Catalog(agent) => agent.operation(name, data).await,
            AgentVariant::Mock(agent) => agent.operation(name, data).await,
        }
    }

    pub(crate) fn destroy(&self) {
        match self {
            AgentVariant::Seo(SeoAgent { link })
            | AgentVariant::Navigation(NavigationAgent { link })
            | AgentVariant::Catalog(CatalogAgent { link }) => link.release(),
            AgentVariant::Mock(_) => {}
        }
    }
}
