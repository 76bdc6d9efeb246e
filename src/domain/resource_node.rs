// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Node
//!
//! One declared unit of infrastructure: identity, type tag, dependencies,
//! property bag, and the per-run lifecycle state owned by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use super::ResourceKind;
use crate::state_machine::{
    NodeInput, NodeState, StateMachine, StateMachineWithHistory, Transition, TransitionResult,
};

/// Opaque key/value property bag
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Stable logical id of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A resource node and its run state
#[derive(Debug, Clone)]
pub struct ResourceNode {
    id: NodeId,
    kind: ResourceKind,
    depends_on: Vec<NodeId>,
    properties: Properties,
    lifecycle: StateMachineWithHistory<NodeState>,
    physical_id: Option<String>,
    attributes: Properties,
    reason: Option<String>,
}

impl ResourceNode {
    /// Create a pending node with no dependencies and no properties
    pub fn new(id: impl Into<NodeId>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            depends_on: Vec::new(),
            properties: Properties::new(),
            lifecycle: StateMachineWithHistory::new(NodeState::Pending),
            physical_id: None,
            attributes: Properties::new(),
            reason: None,
        }
    }

    /// Add a dependency (duplicates are ignored, declaration order is kept)
    pub fn depends_on(mut self, dependency: impl Into<NodeId>) -> Self {
        let dependency = dependency.into();
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    /// Set one property
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Replace the property bag
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.depends_on
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn state(&self) -> NodeState {
        *self.lifecycle.current_state()
    }

    pub fn physical_id(&self) -> Option<&str> {
        self.physical_id.as_deref()
    }

    /// Result data of the last successful response
    pub fn attributes(&self) -> &Properties {
        &self.attributes
    }

    /// Reason recorded with the current state
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn history(&self) -> &[Transition<NodeState, NodeInput>] {
        self.lifecycle.history()
    }

    /// Apply a lifecycle input, recording the reason it produces
    pub fn apply(&mut self, input: NodeInput) -> TransitionResult<NodeState> {
        let reason = self.lifecycle.transition_with_history(input, Utc::now())?;
        self.reason = reason;
        Ok(self.state())
    }

    /// Record the physical id returned by a successful action
    ///
    /// The first id ever assigned is kept; a different id reported later is
    /// ignored and `false` is returned.
    pub fn assign_physical_id(&mut self, physical_id: &str) -> bool {
        match &self.physical_id {
            Some(existing) => existing == physical_id,
            None => {
                self.physical_id = Some(physical_id.to_string());
                true
            }
        }
    }

    pub fn set_attributes(&mut self, attributes: Properties) {
        self.attributes = attributes;
    }

    /// Forget the physical id once the resource has been deleted
    pub fn clear_physical_id(&mut self) {
        self.physical_id = None;
        self.attributes.clear();
    }

    /// Time the node was last started in the current run
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.history()
            .iter()
            .rev()
            .take_while(|t| t.input != NodeInput::Reset)
            .find(|t| t.to == NodeState::InProgress)
            .map(|t| t.timestamp)
    }

    /// Time the node reached its current terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        if !self.state().is_terminal() {
            return None;
        }
        self.history().last().map(|t| t.timestamp)
    }
}
