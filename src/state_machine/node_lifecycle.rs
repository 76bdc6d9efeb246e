// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Node Lifecycle State Machine
//!
//! Mealy machine for the state of one node within a provisioning run. The
//! output of each transition is the reason to record next to the new state.
//!
//! # States
//!
//! - Pending: waiting for dependencies
//! - InProgress: lifecycle event dispatched, waiting for the response
//! - Ready: action succeeded
//! - Failed: action failed, timed out or faulted
//! - Blocked: a dependency failed or the run was aborted; never started
//!
//! # Inputs
//!
//! - Start: Pending → InProgress
//! - Succeed: InProgress → Ready
//! - Fail: InProgress → Failed
//! - Block: Pending → Blocked
//! - Reset: any → Pending (beginning of a new run)

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Node state within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Pending,
    InProgress,
    Ready,
    Failed,
    Blocked,
}

impl NodeState {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle input (FSM input)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeInput {
    /// Dependencies are ready, event is about to be dispatched
    Start,

    /// Action reported success
    Succeed { reason: Option<String> },

    /// Action reported failure, timed out or faulted
    Fail { reason: String },

    /// Node will not be started
    Block { cause: String },

    /// New run over the same graph
    Reset,
}

impl fmt::Display for NodeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeInput::Start => write!(f, "Start"),
            NodeInput::Succeed { .. } => write!(f, "Succeed"),
            NodeInput::Fail { reason } => write!(f, "Fail({})", reason),
            NodeInput::Block { cause } => write!(f, "Block({})", cause),
            NodeInput::Reset => write!(f, "Reset"),
        }
    }
}

impl StateMachine for NodeState {
    type Input = NodeInput;
    type Output = Option<String>;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use NodeInput::*;
        use NodeState::*;

        match (self, input) {
            (_, Reset) => Ok((Pending, None)),
            (Pending, Start) => Ok((InProgress, None)),
            (Pending, Block { cause }) => Ok((Blocked, Some(cause.clone()))),
            (InProgress, Succeed { reason }) => Ok((Ready, reason.clone())),
            (InProgress, Fail { reason }) => Ok((Failed, Some(reason.clone()))),
            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                input: input.to_string(),
            }),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Ready | NodeState::Failed | NodeState::Blocked)
    }
}
