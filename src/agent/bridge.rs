//! Browser bridge: the transport boundary between agents and the page.
//!
//! Agents never touch the DOM themselves. Every operation is forwarded as a
//! `BridgeRequest` to a `BrowserBridge`, which in production is the extension
//! messaging channel. `SimulatedBridge` stands in for it in the CLI and tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::PageContext;
use crate::error::{Error, Result};
use crate::rlog_trace;

use super::AgentType;

/// One operation forwarded to the page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub agent_type: AgentType,
    pub operation: String,
    pub data: Value,
    pub context: PageContext,
}

/// Transport used by agents to act on the page.
#[async_trait]
pub trait BrowserBridge: Send + Sync {
    /// Whether agents can currently be constructed against this bridge.
    fn is_connected(&self) -> bool;

    /// Perform one operation. `Err` means the external action failed.
    async fn invoke(&self, request: BridgeRequest) -> Result<Value>;

    /// Called when an agent bound to this bridge is destroyed.
    fn release(&self, _agent_type: AgentType) {}
}

/// In-process bridge that simulates page interaction.
///
/// Each call sleeps for the configured latency (or `data.latencyMs` when
/// present) and echoes the request. A call fails when its operation was
/// registered with [`SimulatedBridge::fail_operation`] or its data carries
/// `"simulateFailure": true`.
pub struct SimulatedBridge {
    latency: Duration,
    connected: AtomicBool,
    failing_operations: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    released: Mutex<Vec<AgentType>>,
}

impl SimulatedBridge {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            connected: AtomicBool::new(true),
            failing_operations: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
        }
    }

    /// A bridge with no simulated latency.
    pub fn instant() -> Arc<Self> {
        Arc::new(Self::new(Duration::ZERO))
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every call to `operation` fail.
    pub fn fail_operation(&self, operation: &str) {
        if let Ok(mut failing) = self.failing_operations.lock() {
            failing.insert(operation.to_string());
        }
    }

    /// Total number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of invocations observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Invocations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Agent types released so far, in release order.
    pub fn released(&self) -> Vec<AgentType> {
        self.released
            .lock()
            .map(|released| released.clone())
            .unwrap_or_default()
    }

    fn should_fail(&self, request: &BridgeRequest) -> bool {
        let flagged = request
            .data
            .get("simulateFailure")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        flagged
            || self
                .failing_operations
                .lock()
                .map(|failing| failing.contains(&request.operation))
                .unwrap_or(false)
    }
}

/// Counts one running invocation; leaving scope, including being dropped
/// mid-sleep by a timeout, takes it back off.
struct InFlight<'a> {
    counter: &'a AtomicUsize,
    level: usize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let level = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, level }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for SimulatedBridge {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl BrowserBridge for SimulatedBridge {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn invoke(&self, request: BridgeRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight::enter(&self.in_flight);
        self.max_in_flight.fetch_max(guard.level, Ordering::SeqCst);

        let latency = request
            .data
            .get("latencyMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        drop(guard);
        rlog_trace!(
            "SimulatedBridge: {}.{} on {}",
            request.agent_type,
            request.operation,
            request.context.page_type
        );

        if self.should_fail(&request) {
            return Err(Error::Bridge(format!(
                "simulated failure in {}.{}",
                request.agent_type, request.operation
            )));
        }

        Ok(json!({
            "operation": request.operation,
            "agent": request.agent_type,
            "page": request.context.page_type,
            "input": request.data,
        }))
    }

    fn release(&self, agent_type: AgentType) {
        if let Ok(mut released) = self.released.lock() {
            released.push(agent_type);
        }
    }
}
