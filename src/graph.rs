// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Dependency Graph
//!
//! Holds the declared nodes of a deployment and the dependency edges between
//! them. Edges point from a dependency to its dependent, so a topological
//! order of the graph is a safe provisioning order.
//!
//! # Validation
//!
//! [`ResourceGraph::build`] rejects a declaration before anything is
//! provisioned when:
//! - two nodes share an id
//! - a dependency names a node that does not exist
//! - a property references a node that is not a declared dependency
//! - a dependency chain returns to itself
//!
//! # Execution order
//!
//! ```text
//!   A   B        batch 0: [A, B]
//!    \ /
//!     C          batch 1: [C]
//!     |
//!     D          batch 2: [D]
//! ```
//!
//! Nodes inside a batch are independent of each other. Within a batch, nodes
//! keep their declaration order so runs and logs are reproducible.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use std::collections::HashMap;

use crate::domain::{collect_references, NodeId, ReferenceSource, ResourceNode};
use crate::errors::ValidationError;

/// Validated dependency graph of resource nodes
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<NodeId, usize>,
    dag: DiGraph<usize, ()>,
}

impl ResourceGraph {
    /// Build and validate a graph from nodes in declaration order
    pub fn build(nodes: Vec<ResourceNode>) -> Result<Self, ValidationError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id().clone(), position).is_some() {
                return Err(ValidationError::DuplicateNode(node.id().to_string()));
            }
        }

        let mut dag = DiGraph::with_capacity(nodes.len(), nodes.len());
        for position in 0..nodes.len() {
            dag.add_node(position);
        }

        for (position, node) in nodes.iter().enumerate() {
            for dependency in node.dependencies() {
                let Some(&dep_position) = index.get(dependency) else {
                    return Err(ValidationError::DanglingReference {
                        node: node.id().to_string(),
                        missing: dependency.to_string(),
                    });
                };
                dag.add_edge(NodeIndex::new(dep_position), NodeIndex::new(position), ());
            }

            for reference in collect_references(node.properties()) {
                let target = reference.target();
                if !index.contains_key(target) {
                    return Err(ValidationError::DanglingReference {
                        node: node.id().to_string(),
                        missing: target.to_string(),
                    });
                }
                if !node.dependencies().contains(target) {
                    return Err(ValidationError::UndeclaredReference {
                        node: node.id().to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }

        if let Err(cycle) = toposort(&dag, None) {
            let position = dag[cycle.node_id()];
            return Err(ValidationError::Cycle {
                node: nodes[position].id().to_string(),
            });
        }

        Ok(Self { nodes, index, dag })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        let position = *self.index.get(id)?;
        Some(&self.nodes[position])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        let position = *self.index.get(id)?;
        Some(&mut self.nodes[position])
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut ResourceNode> {
        self.nodes.iter_mut()
    }

    /// Lazy sequence of batches in dependency order
    ///
    /// The iterator owns its bookkeeping, so the graph can be mutated while
    /// the batches are consumed.
    pub fn topological_batches(&self) -> TopologicalBatches {
        let dependents: Vec<Vec<usize>> = (0..self.nodes.len())
            .map(|position| {
                self.dag
                    .neighbors_directed(NodeIndex::new(position), Direction::Outgoing)
                    .map(|neighbor| self.dag[neighbor])
                    .collect()
            })
            .collect();

        let in_degree: Vec<usize> = self.nodes.iter().map(|n| n.dependencies().len()).collect();
        let frontier = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| position)
            .collect();

        TopologicalBatches {
            ids: self.nodes.iter().map(|n| n.id().clone()).collect(),
            dependents,
            in_degree,
            frontier,
        }
    }

    /// Every node that depends on `id`, directly or transitively
    pub fn transitive_dependents(&self, id: &str) -> Vec<NodeId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&self.dag, NodeIndex::new(start));
        while let Some(visited) = dfs.next(&self.dag) {
            reached.push(self.dag[visited]);
        }
        self.in_declaration_order(start, reached)
    }

    /// Every node `id` depends on, directly or transitively
    pub fn transitive_dependencies(&self, id: &str) -> Vec<NodeId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let reversed = Reversed(&self.dag);
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(reversed, NodeIndex::new(start));
        while let Some(visited) = dfs.next(reversed) {
            reached.push(self.dag[visited]);
        }
        self.in_declaration_order(start, reached)
    }

    fn in_declaration_order(&self, start: usize, mut positions: Vec<usize>) -> Vec<NodeId> {
        positions.retain(|&p| p != start);
        positions.sort_unstable();
        positions
            .into_iter()
            .map(|p| self.nodes[p].id().clone())
            .collect()
    }
}

impl ReferenceSource for ResourceGraph {
    fn physical_id_of(&self, id: &NodeId) -> Option<String> {
        self.node(id.as_str())
            .and_then(|node| node.physical_id())
            .map(str::to_string)
    }

    fn attribute_of(&self, id: &NodeId, attribute: &str) -> Option<serde_json::Value> {
        self.node(id.as_str())
            .and_then(|node| node.attributes().get(attribute))
            .cloned()
    }
}

/// Iterator over dependency-ordered batches, see [`ResourceGraph::topological_batches`]
#[derive(Debug, Clone)]
pub struct TopologicalBatches {
    ids: Vec<NodeId>,
    dependents: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    frontier: Vec<usize>,
}

impl Iterator for TopologicalBatches {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frontier.is_empty() {
            return None;
        }

        let mut batch = std::mem::take(&mut self.frontier);
        batch.sort_unstable();

        for &position in &batch {
            for &dependent in &self.dependents[position] {
                self.in_degree[dependent] -= 1;
                if self.in_degree[dependent] == 0 {
                    self.frontier.push(dependent);
                }
            }
        }

        Some(batch.into_iter().map(|p| self.ids[p].clone()).collect())
    }
}
