//! Agent registry: lazily constructs and caches agent instances.
//!
//! Instances are keyed by `(AgentType, PageType)`. Construction goes through
//! the type's real implementation first; when that fails, or the current
//! page is outside the type's allow-list, a mock with the same operation
//! surface is cached instead so the dispatcher always has a callable target.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agent::{AgentInstance, AgentType, AgentVariant, BrowserBridge};
use crate::config::Config;
use crate::core::{PageContext, PageType};
use crate::error::{Error, Result};
use crate::{rlog, rlog_debug, rlog_warn};

type CacheKey = (AgentType, PageType);

/// Cache and context are guarded together so a context change can never
/// interleave with a lookup.
struct RegistryState {
    context: PageContext,
    cache: HashMap<CacheKey, Arc<AgentInstance>>,
}

/// Caller-owned registry of agent instances.
///
/// # Example
///
/// ```ignore
/// let bridge = Arc::new(SimulatedBridge::default());
/// let registry = AgentRegistry::new(bridge, PageContext::new(PageType::ItemEdit));
/// let seo = registry.resolve(AgentType::Seo).await?;
/// assert!(seo.is_enhanced());
/// ```
pub struct AgentRegistry {
    bridge: Arc<dyn BrowserBridge>,
    mock_fallback: bool,
    state: Mutex<RegistryState>,
}

impl AgentRegistry {
    pub fn new(bridge: Arc<dyn BrowserBridge>, context: PageContext) -> Self {
        Self {
            bridge,
            mock_fallback: true,
            state: Mutex::new(RegistryState {
                context,
                cache: HashMap::new(),
            }),
        }
    }

    pub fn from_config(
        config: &Config,
        bridge: Arc<dyn BrowserBridge>,
        context: PageContext,
    ) -> Self {
        Self::new(bridge, context).with_mock_fallback(config.mock_fallback)
    }

    /// Enable or disable the mock fallback. When disabled, a construction
    /// or validation failure is returned from [`AgentRegistry::resolve`].
    pub fn with_mock_fallback(mut self, enabled: bool) -> Self {
        self.mock_fallback = enabled;
        self
    }

    /// Snapshot of the current page context.
    pub async fn context(&self) -> PageContext {
        self.state.lock().await.context.clone()
    }

    /// Resolve the instance for `agent_type` on the current page.
    ///
    /// Repeated calls under an unchanged page type return the same `Arc`.
    ///
    /// # Errors
    /// Only when both the real implementation and the fallback are
    /// unavailable (fallback disabled).
    pub async fn resolve(&self, agent_type: AgentType) -> Result<Arc<AgentInstance>> {
        let mut state = self.state.lock().await;
        let key = (agent_type, state.context.page_type);

        if let Some(instance) = state.cache.get(&key) {
            return Ok(Arc::clone(instance));
        }

        let instance = Arc::new(self.create(agent_type, &state.context)?);
        rlog_debug!(
            "AgentRegistry: created {} agent for {} (enhanced={})",
            agent_type,
            key.1,
            instance.is_enhanced()
        );
        state.cache.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    fn create(&self, agent_type: AgentType, context: &PageContext) -> Result<AgentInstance> {
        let page_type = context.page_type;
        let candidate = AgentVariant::build(agent_type, Arc::clone(&self.bridge), context)
            .and_then(|variant| {
                if agent_type.allows(page_type) {
                    Ok(variant)
                } else {
                    variant.destroy();
                    Err(Error::Validation(format!(
                        "{} agent is not available on {} pages",
                        agent_type, page_type
                    )))
                }
            });

        match candidate {
            Ok(variant) => Ok(AgentInstance::new(agent_type, page_type, variant)),
            Err(e) if self.mock_fallback => {
                rlog_warn!(
                    "AgentRegistry: falling back to mock {} agent on {}: {}",
                    agent_type,
                    page_type,
                    e
                );
                Ok(AgentInstance::new(
                    agent_type,
                    page_type,
                    AgentVariant::mock(agent_type),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Switch to a new page context.
    ///
    /// Every cached instance whose page type differs from the new one is
    /// destroyed and then evicted. Returns how many were evicted.
    pub async fn update_context(&self, context: PageContext) -> usize {
        let mut state = self.state.lock().await;
        let page_type = context.page_type;

        let stale: Vec<CacheKey> = state
            .cache
            .keys()
            .filter(|(_, page)| *page != page_type)
            .copied()
            .collect();

        for key in &stale {
            if let Some(instance) = state.cache.get(key) {
                instance.destroy();
            }
            state.cache.remove(key);
        }

        if state.context.page_type != page_type {
            rlog!(
                "AgentRegistry: context {} -> {}, evicted {} instance(s)",
                state.context.page_type,
                page_type,
                stale.len()
            );
        }
        state.context = context;
        stale.len()
    }

    /// Destroy and drop every cached instance.
    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        for instance in state.cache.values() {
            instance.destroy();
        }
        let count = state.cache.len();
        state.cache.clear();
        rlog_debug!("AgentRegistry: teardown released {} instance(s)", count);
    }

    /// Number of cached instances.
    pub async fn cached_count(&self) -> usize {
        self.state.lock().await.cache.len()
    }
}
