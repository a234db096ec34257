//! Dependency resolution for planned and executable tasks.
//!
//! `DependencyGraph` turns any list of items that declare dependencies into
//! a topological layering ("waves"): every item lands in a strictly later
//! wave than each of its known dependencies. The planner uses the layering
//! to estimate durations and dependency depth; the chain engine uses it as
//! its dispatch order.
//!
//! Resolution is permissive. Dependencies on unknown ids and on the item
//! itself are recorded and ignored, and a dependency cycle is broken by
//! releasing the earliest-declared item on the cycle whose other
//! dependencies are met, so a bad declaration can
//! never deadlock execution. Callers that want strict behaviour use
//! [`DependencyGraph::validate`].

use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Anything that has an id and declares the ids it depends on.
pub trait Dependent {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// Why a declared dependency was dropped from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The dependency names an id that is not part of the set.
    Unknown,
    /// The item depends on itself.
    SelfReference,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Unknown => write!(f, "unknown"),
            IgnoreReason::SelfReference => write!(f, "self-reference"),
        }
    }
}

/// A declared dependency that resolution treated as already satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredDependency {
    pub task_id: String,
    pub dependency: String,
    pub reason: IgnoreReason,
}

/// Dependency graph over task ids.
///
/// Nodes are ids in declaration order; an edge `a -> b` means `b` waits
/// for `a`.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    ignored: Vec<IgnoredDependency>,
}

impl DependencyGraph {
    /// Build the graph from a slice of items.
    ///
    /// Duplicate ids keep their first declaration.
    pub fn build<T: Dependent>(items: &[T]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for item in items {
            if !index.contains_key(item.id()) {
                let node = graph.add_node(item.id().to_string());
                index.insert(item.id().to_string(), node);
            }
        }

        let mut ignored = Vec::new();
        let mut seen = HashSet::new();
        for item in items {
            // Only the first declaration of an id contributes edges.
            if !seen.insert(item.id()) {
                continue;
            }
            let to = index[item.id()];
            for dep in item.dependencies() {
                let reason = if dep == item.id() {
                    Some(IgnoreReason::SelfReference)
                } else if !index.contains_key(dep) {
                    Some(IgnoreReason::Unknown)
                } else {
                    None
                };

                if let Some(reason) = reason {
                    warn!(task_id = item.id(), dependency = %dep, %reason, "ignoring dependency");
                    ignored.push(IgnoredDependency {
                        task_id: item.id().to_string(),
                        dependency: dep.clone(),
                        reason,
                    });
                    continue;
                }

                let from = index[dep.as_str()];
                if graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self {
            graph,
            index,
            ignored,
        }
    }

    /// Number of distinct ids in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of resolved dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Dependencies that were dropped during construction.
    pub fn ignored(&self) -> &[IgnoredDependency] {
        &self.ignored
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Resolved dependencies of `id`, in no particular order.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Ids that directly depend on `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        match self.index.get(id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, direction)
                .map(|n| self.graph[n].as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Ids with no resolved dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].as_str())
            .collect()
    }

    /// Strict check: fails on any ignored dependency or cycle.
    pub fn validate(&self) -> Result<()> {
        if let Some(first) = self.ignored.first() {
            return Err(Error::Dependency(format!(
                "task '{}' has {} dependency '{}'",
                first.task_id, first.reason, first.dependency
            )));
        }
        if self.is_cyclic() {
            return Err(Error::Dependency(
                "dependency graph contains a cycle".to_string(),
            ));
        }
        Ok(())
    }

    /// Compute the execution waves.
    ///
    /// Each wave holds the ids whose dependencies all sit in earlier waves,
    /// in declaration order. When nothing is ready but ids remain, the
    /// graph has a cycle; the earliest-declared id on a cycle whose
    /// dependencies outside the cycle are done is released on its own. Ids
    /// merely downstream of a cycle keep waiting for it.
    pub fn waves(&self) -> Vec<Vec<String>> {
        let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut done: HashSet<NodeIndex> = HashSet::new();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let mut wave: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|&n| {
                    self.graph
                        .neighbors_directed(n, Direction::Incoming)
                        .all(|dep| done.contains(&dep))
                })
                .collect();

            if wave.is_empty() {
                let released = self.cycle_breaker(&remaining, &done);
                warn!(
                    task_id = %self.graph[released],
                    "dependency cycle detected, releasing task"
                );
                wave.push(released);
            }

            done.extend(wave.iter().copied());
            remaining.retain(|n| !done.contains(n));
            waves.push(wave.into_iter().map(|n| self.graph[n].clone()).collect());
        }

        waves
    }

    /// Earliest-declared remaining node in a strongly connected component
    /// whose incoming edges from outside the component are all done.
    ///
    /// Only called when no node is ready, so such a component exists: the
    /// source of the remaining condensation is a cycle.
    fn cycle_breaker(&self, remaining: &[NodeIndex], done: &HashSet<NodeIndex>) -> NodeIndex {
        let mut component_of: HashMap<NodeIndex, usize> = HashMap::new();
        for (i, component) in tarjan_scc(&self.graph).into_iter().enumerate() {
            if component.len() > 1 {
                component_of.extend(component.into_iter().map(|n| (n, i)));
            }
        }

        remaining
            .iter()
            .copied()
            .find(|&n| {
                let Some(&own) = component_of.get(&n) else {
                    return false;
                };
                remaining.iter().all(|&m| {
                    component_of.get(&m) != Some(&own)
                        || self
                            .graph
                            .neighbors_directed(m, Direction::Incoming)
                            .all(|dep| done.contains(&dep) || component_of.get(&dep) == Some(&own))
                })
            })
            .unwrap_or(remaining[0])
    }

    /// Length of the longest dependency chain, counted in waves.
    pub fn depth(&self) -> usize {
        self.waves().len()
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("ignored", &self.ignored.len())
            .finish()
    }
}

/// Compute execution waves for `items`.
pub fn resolve_waves<T: Dependent>(items: &[T]) -> Vec<Vec<String>> {
    DependencyGraph::build(items).waves()
}

/// Number of waves needed to run `items`.
pub fn dependency_depth<T: Dependent>(items: &[T]) -> usize {
    DependencyGraph::build(items).depth()
}

/// Check that `waves` is a topological layering of `items`.
///
/// Every known dependency of an id must appear in a strictly earlier wave.
pub fn is_valid_layering<T: Dependent>(items: &[T], waves: &[Vec<String>]) -> bool {
    let position: HashMap<&str, usize> = waves
        .iter()
        .enumerate()
        .flat_map(|(i, wave)| wave.iter().map(move |id| (id.as_str(), i)))
        .collect();

    items.iter().all(|item| {
        let Some(&own) = position.get(item.id()) else {
            return false;
        };
        item.dependencies().iter().all(|dep| {
            dep == item.id()
                || position.get(dep.as_str()).map_or(true, |&wave| wave < own)
        })
    })
}
