// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning orchestration for the Composable Information Machine
//!
//! Realizes a declared graph of infrastructure resources in dependency
//! order. Built-in resource types are handed to a generic driver; custom
//! resource types run an out-of-band action that reports completion through
//! a one-shot callback.
//!
//! ```text
//! StackDeclaration ──> ResourceGraph ──> ProvisioningOrchestrator ──> RunReport
//!                                            │            ▲
//!                                  LifecycleEvent   LifecycleResponse
//!                                            ▼            │
//!                                   ResourceDriver ──> ResponseChannel ──> CallbackRegistry
//!                                 (builtin | CustomActionHandler)
//! ```

pub mod channel;
pub mod config;
pub mod domain;
pub mod errors;
pub mod graph;
pub mod handler;
pub mod lifecycle;
pub mod orchestrator;
pub mod retry;
pub mod state_machine;

pub use channel::{
    callback_router, CallbackListener, CallbackRegistry, HttpTransport, LocalTransport,
    ResponseChannel, ResponseTransport,
};
pub use config::{CallbackConfig, ChannelConfig, OrchestratorConfig, ProvisionerConfig};
pub use domain::{
    satellite_image_stack, NodeId, Properties, ResourceDeclaration, ResourceKind, ResourceNode,
    StackDeclaration,
};
pub use errors::{
    ActionError, DeliveryError, ProvisioningError, ProvisioningResult, ValidationError,
};
pub use graph::ResourceGraph;
pub use handler::{ActionOutcome, CustomAction, CustomActionHandler, NoopAction};
pub use lifecycle::{LifecycleEvent, LifecycleResponse, RequestType, ResponseStatus};
pub use orchestrator::{
    AbortHandle, BuiltinDriver, CustomActionDriver, ProvisioningOrchestrator, ResourceDriver,
    RunOutcome, RunReport,
};
pub use retry::RetryPolicy;
pub use state_machine::{NodeInput, NodeState};
