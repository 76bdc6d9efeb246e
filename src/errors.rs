//! Error types for provisioning operations
//!
//! The taxonomy follows the way failures are handled during a run:
//!
//! - [`ValidationError`] rejects a declaration before any side effect occurs
//! - [`DeliveryError`] is a transport failure, retried at the transport layer only
//! - [`ActionError`] is reported by a custom action and becomes a FAILED response
//!
//! Deadline overruns and panics inside an action never surface as errors to the
//! caller: the orchestrator records them as FAILED nodes.

use thiserror::Error;

use crate::state_machine::TransitionError;

/// A declaration that cannot be run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A dependency chain returns to the node it started from
    #[error("Dependency cycle detected at node '{node}'")]
    Cycle { node: String },

    /// A declared dependency does not exist in the graph
    #[error("Node '{node}' depends on unknown node '{missing}'")]
    DanglingReference { node: String, missing: String },

    /// Two nodes share the same logical id
    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),

    /// A property references a node that is not a declared dependency
    #[error("Node '{node}' references '{target}' without declaring it as a dependency")]
    UndeclaredReference { node: String, target: String },

    /// No driver is registered for a type that needs a lifecycle action
    #[error("No driver registered for resource type '{resource_type}' (node '{node}')")]
    MissingDriver { node: String, resource_type: String },

    /// Declaration could not be parsed
    #[error("Malformed declaration: {0}")]
    MalformedDeclaration(String),
}

/// Failure to deliver an event or a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network or transport level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Receiving endpoint answered with a non-success status
    #[error("Delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Callback address is unknown, already answered, or withdrawn
    #[error("Unknown callback address: {0}")]
    UnknownAddress(String),

    /// Retry budget exhausted
    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl DeliveryError {
    /// The address is gone; another attempt cannot succeed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UnknownAddress(_) | Self::Rejected { status: 404, .. }
        )
    }
}

/// Failure reported by a custom action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Action inputs are missing or invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The dependency the action talks to could not be reached
    #[error("Dependency unreachable: {0}")]
    Unreachable(String),

    /// The action ran and failed
    #[error("{0}")]
    Failed(String),
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Declaration rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Event or response delivery failed
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Invalid node state transition
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error (listener binding, declaration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for provisioning operations
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

impl From<serde_json::Error> for ProvisioningError {
    fn from(err: serde_json::Error) -> Self {
        ProvisioningError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}
