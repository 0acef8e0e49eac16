//! Step dependency graph.
//!
//! Nodes are workflow steps in declaration order; an edge `a -> b` means
//! step `b` lists the operation of step `a` in its `depends_on`. The graph
//! is built once per run to reject definitions that can never make
//! progress. Execution itself stays in declaration order.

use crate::error::{Error, Result};
use crate::workflow::types::WorkflowStep;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// The dependency graph of a workflow's steps.
pub struct StepGraph {
    /// Node weight is the step's position in the definition.
    graph: DiGraph<usize, ()>,
    /// Operation name -> every step carrying that name.
    by_operation: HashMap<String, Vec<NodeIndex>>,
    /// `(step, name)` pairs naming a step declared later.
    forward: Vec<(usize, String)>,
    /// `(step, name)` pairs naming no step at all.
    dangling: Vec<(usize, String)>,
}

impl StepGraph {
    /// Build and validate the graph.
    ///
    /// # Errors
    /// `Error::Validation` when a step depends on its own operation or the
    /// dependencies form a cycle.
    pub fn build(steps: &[WorkflowStep]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut by_operation: HashMap<String, Vec<NodeIndex>> = HashMap::new();

        let nodes: Vec<NodeIndex> = steps
            .iter()
            .enumerate()
            .map(|(position, step)| {
                let node = graph.add_node(position);
                by_operation
                    .entry(step.operation.clone())
                    .or_default()
                    .push(node);
                node
            })
            .collect();

        let mut forward = Vec::new();
        let mut dangling = Vec::new();

        for (position, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                if dep == &step.operation {
                    return Err(Error::Validation(format!(
                        "Step {} ({}) depends on itself",
                        position, step.operation
                    )));
                }

                let Some(providers) = by_operation.get(dep) else {
                    dangling.push((position, dep.clone()));
                    continue;
                };

                // A name repeated later only binds to its earlier carriers.
                let earlier: Vec<NodeIndex> = providers
                    .iter()
                    .filter(|p| graph[**p] < position)
                    .copied()
                    .collect();
                let sources = if earlier.is_empty() {
                    forward.push((position, dep.clone()));
                    providers.clone()
                } else {
                    earlier
                };
                for source in sources {
                    graph.add_edge(source, nodes[position], ());
                }
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(Error::Validation(
                "Workflow step dependencies form a cycle".to_string(),
            ));
        }

        Ok(Self {
            graph,
            by_operation,
            forward,
            dangling,
        })
    }

    /// Number of steps.
    pub fn step_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Positions of the steps that `position` depends on, ascending.
    pub fn dependencies(&self, position: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(position), Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Positions of the steps carrying `operation`.
    pub fn steps_for(&self, operation: &str) -> Vec<usize> {
        self.by_operation
            .get(operation)
            .map(|nodes| nodes.iter().map(|n| self.graph[*n]).collect())
            .unwrap_or_default()
    }

    /// Dependencies on steps declared later; these are always unmet at run
    /// time.
    pub fn forward_references(&self) -> &[(usize, String)] {
        &self.forward
    }

    /// Dependencies naming no step; always unmet at run time.
    pub fn dangling_references(&self) -> &[(usize, String)] {
        &self.dangling
    }
}

impl std::fmt::Debug for StepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepGraph")
            .field("steps", &self.step_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
