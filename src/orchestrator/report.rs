// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Properties, ResourceKind};
use crate::graph::ResourceGraph;
use crate::state_machine::NodeState;

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Success,
    Failed,
}

/// Which direction the graph was walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Deploy,
    Teardown,
}

/// Final state of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    pub logical_id: String,
    pub resource_type: ResourceKind,
    pub state: NodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    #[serde(skip_serializing_if = "Properties::is_empty", default)]
    pub attributes: Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub stack_id: String,
    pub mode: RunMode,
    pub outcome: RunOutcome,
    /// Nodes in declaration order
    pub nodes: Vec<NodeReport>,
    /// Resolved values of READY output nodes
    pub outputs: Properties,
}

impl RunReport {
    pub fn from_graph(stack_id: &str, mode: RunMode, graph: &ResourceGraph) -> Self {
        let nodes: Vec<NodeReport> = graph
            .nodes()
            .map(|node| NodeReport {
                logical_id: node.id().to_string(),
                resource_type: node.kind().clone(),
                state: node.state(),
                reason: node.reason().map(str::to_string),
                physical_id: node.physical_id().map(str::to_string),
                attributes: node.attributes().clone(),
                started_at: node.started_at(),
                finished_at: node.finished_at(),
            })
            .collect();

        let outcome = if nodes.iter().all(|n| n.state == NodeState::Ready) {
            RunOutcome::Success
        } else {
            RunOutcome::Failed
        };

        let outputs = match mode {
            RunMode::Deploy => graph
                .nodes()
                .filter(|n| *n.kind() == ResourceKind::Output && n.state() == NodeState::Ready)
                .map(|n| {
                    let value = n
                        .attributes()
                        .get("Value")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(n.attributes().clone()));
                    (n.id().to_string(), value)
                })
                .collect(),
            RunMode::Teardown => Properties::new(),
        };

        Self {
            stack_id: stack_id.to_string(),
            mode,
            outcome,
            nodes,
            outputs,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    pub fn node(&self, logical_id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.logical_id == logical_id)
    }

    /// Count of nodes per state
    pub fn summary(&self) -> Vec<(NodeState, usize)> {
        [
            NodeState::Ready,
            NodeState::Failed,
            NodeState::Blocked,
            NodeState::InProgress,
            NodeState::Pending,
        ]
        .into_iter()
        .map(|state| (state, self.nodes.iter().filter(|n| n.state == state).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
    }
}
