//! Agents: capability providers that act on the current page.
//!
//! The set of agent kinds is closed. `AgentType` names a kind, describes its
//! operation surface and the page types it may run on, and `AgentVariant`
//! holds the constructed implementation as a tagged union.

pub mod bridge;
mod variants;

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{PageType, TaskResult};
use crate::error::{Error, Result};
use crate::rlog_debug;

pub use bridge::{BridgeRequest, BrowserBridge, SimulatedBridge};
pub use variants::{AgentVariant, CatalogAgent, MockAgent, NavigationAgent, SeoAgent};

/// Kind of agent a task or step is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Seo,
    Navigation,
    Catalog,
}

impl AgentType {
    pub const ALL: [AgentType; 3] = [AgentType::Seo, AgentType::Navigation, AgentType::Catalog];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Seo => "seo",
            AgentType::Navigation => "navigation",
            AgentType::Catalog => "catalog",
        }
    }

    /// Operation names every implementation of this kind exposes,
    /// mock included.
    pub fn operations(&self) -> &'static [&'static str] {
        match self {
            AgentType::Seo => &[
                "analyze_page",
                "optimize_title",
                "optimize_description",
                "generate_tags",
            ],
            AgentType::Navigation => &["navigate_to", "open_item", "go_back", "wait_for_page"],
            AgentType::Catalog => &["fetch_item", "update_item", "list_items", "delete_item"],
        }
    }

    pub fn supports(&self, operation: &str) -> bool {
        self.operations().contains(&operation)
    }

    /// Page types on which a real (non-mock) agent of this kind is valid.
    pub fn allowed_pages(&self) -> &'static [PageType] {
        match self {
            AgentType::Seo => &[PageType::ItemDetail, PageType::ItemEdit, PageType::ItemsLibrary],
            AgentType::Catalog => &[
                PageType::ItemDetail,
                PageType::ItemEdit,
                PageType::ItemsLibrary,
                PageType::Search,
            ],
            AgentType::Navigation => &PageType::ALL,
        }
    }

    pub fn allows(&self, page: PageType) -> bool {
        self.allowed_pages().contains(&page)
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AgentType::ALL
            .into_iter()
            .find(|agent| agent.as_str() == s)
            .ok_or_else(|| Error::UnknownAgentType(s.to_string()))
    }
}

/// A constructed agent, cached by the registry under
/// `(agent_type, page_type)`.
#[derive(Debug)]
pub struct AgentInstance {
    agent_type: AgentType,
    page_type: PageType,
    variant: AgentVariant,
    ready: AtomicBool,
}

impl AgentInstance {
    pub fn new(agent_type: AgentType, page_type: PageType, variant: AgentVariant) -> Self {
        Self {
            agent_type,
            page_type,
            variant,
            ready: AtomicBool::new(true),
        }
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    pub fn variant(&self) -> &AgentVariant {
        &self.variant
    }

    /// True for real implementations, false for the mock fallback.
    pub fn is_enhanced(&self) -> bool {
        !matches!(self.variant, AgentVariant::Mock(_))
    }

    pub fn capabilities(&self) -> &'static [&'static str] {
        self.agent_type.operations()
    }

    /// False once the instance has been destroyed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Run a named operation.
    ///
    /// # Errors
    /// `Error::UnknownOperation` when `name` is outside the capability list,
    /// `Error::Validation` when the instance was already destroyed. Failures
    /// of the operation itself are reported in the returned `TaskResult`.
    pub async fn operation(&self, name: &str, data: &Value) -> Result<TaskResult> {
        if !self.agent_type.supports(name) {
            return Err(Error::UnknownOperation {
                agent_type: self.agent_type,
                operation: name.to_string(),
            });
        }
        if !self.is_ready() {
            return Err(Error::Validation(format!(
                "{} agent for {} has been destroyed",
                self.agent_type, self.page_type
            )));
        }
        let result = self.variant.operation(name, data).await;
        Ok(result.with_agent(self.agent_type))
    }

    /// Release the underlying implementation. Idempotent.
    pub fn destroy(&self) {
        if self.ready.swap(false, Ordering::SeqCst) {
            rlog_debug!(
                "AgentInstance::destroy type={} page={} enhanced={}",
                self.agent_type,
                self.page_type,
                self.is_enhanced()
            );
            self.variant.destroy();
        }
    }
}
