// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic state machine types used to model the lifecycle of a resource node
//! during a provisioning run. Transitions are pure functions; the caller decides
//! when to apply them and records the history.
//!
//! # Mealy Machine
//!
//! Output depends on both current state and input:
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! The node lifecycle uses the output to carry the reason recorded alongside
//! the new state (see [`node_lifecycle`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use cim_provisioning::state_machine::*;
//!
//! let mut fsm = StateMachineWithHistory::new(NodeState::Pending);
//! fsm.transition_with_history(NodeInput::Start, chrono::Utc::now())?;
//! assert_eq!(*fsm.current_state(), NodeState::InProgress);
//! ```

pub mod node_lifecycle;

pub use node_lifecycle::{NodeInput, NodeState};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state with the given input is not allowed
    #[error("Invalid transition from {from} on {input}")]
    InvalidTransition { from: String, input: String },

    /// Precondition not met for transition
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Trait for finite state machines
///
/// Implement this trait to define a state machine with typed states,
/// inputs, and outputs.
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Whether no further transitions are expected within the current run
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Transition metadata
///
/// Records information about a state transition for auditing.
#[derive(Debug, Clone)]
pub struct Transition<S, I> {
    /// State before transition
    pub from: S,

    /// State after transition
    pub to: S,

    /// Input that triggered transition
    pub input: I,

    /// Timestamp of transition
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<S, I> Transition<S, I> {
    /// Create a new transition record
    pub fn new(from: S, to: S, input: I, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
        }
    }
}

/// State machine with history
///
/// Wraps a state machine and tracks transition history.
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    current: FSM,
    history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    /// Create a new state machine with history tracking
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition with history recording
    ///
    /// The state is left untouched and nothing is recorded when the
    /// transition is rejected.
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> TransitionResult<FSM::Output>
    where
        FSM::Input: Clone,
    {
        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;

        self.history
            .push(Transition::new(from, to.clone(), input, timestamp));

        self.current = to;
        Ok(output)
    }

    /// Get transition history
    pub fn history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    /// Get current state
    pub fn current_state(&self) -> &FSM {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Gate {
        Closed,
        Open,
    }

    #[derive(Debug, Clone)]
    enum GateInput {
        Push,
        Lock,
    }

    impl StateMachine for Gate {
        type Input = GateInput;
        type Output = ();

        fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
            match (self, input) {
                (Gate::Closed, GateInput::Push) => Ok((Gate::Open, ())),
                (Gate::Open, GateInput::Push) => Ok((Gate::Closed, ())),
                (Gate::Closed, GateInput::Lock) => Ok((Gate::Closed, ())),
                (Gate::Open, GateInput::Lock) => Err(TransitionError::PreconditionFailed(
                    "gate must be closed".to_string(),
                )),
            }
        }
    }

    #[test]
    fn test_can_transition() {
        assert!(Gate::Closed.can_transition(&GateInput::Lock));
        assert!(!Gate::Open.can_transition(&GateInput::Lock));
    }

    #[test]
    fn test_history_records_accepted_transitions_only() {
        let mut fsm = StateMachineWithHistory::new(Gate::Closed);

        fsm.transition_with_history(GateInput::Push, Utc::now())
            .unwrap();
        assert_eq!(*fsm.current_state(), Gate::Open);

        let rejected = fsm.transition_with_history(GateInput::Lock, Utc::now());
        assert!(rejected.is_err());
        assert_eq!(*fsm.current_state(), Gate::Open);
        assert_eq!(fsm.history().len(), 1);
        assert_eq!(fsm.history()[0].from, Gate::Closed);
        assert_eq!(fsm.history()[0].to, Gate::Open);
    }
}
