// Copyright (c) 2025 - Cowboy AI, Inc.
//! Custom Action Handler
//!
//! Runs one out-of-band unit of work per [`LifecycleEvent`] and reports the
//! outcome through the [`ResponseChannel`].
//!
//! # Guaranteed response
//!
//! [`CustomActionHandler::handle`] is total. A failing action, an action that
//! overruns its timeout, and an action that panics all become a FAILED
//! [`LifecycleResponse`]; the caller always receives exactly one response.
//!
//! ```text
//! CREATE ──> action.create ─┐
//! UPDATE ──> action.update ─┼─ timeout ─ catch_unwind ──> LifecycleResponse
//! DELETE ──> no-op ─────────┘
//! ```

pub mod noop;
pub mod spatial_extension;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::channel::ResponseChannel;
use crate::domain::Properties;
use crate::errors::{ActionError, DeliveryError};
use crate::lifecycle::{LifecycleEvent, LifecycleResponse, RequestType};

pub use noop::NoopAction;
pub use spatial_extension::{
    ConnectionDefaults, ConnectionSettings, ExtensionBackend, ExtensionStatus, BackendError,
    SpatialExtensionAction, UnreachablePolicy,
};
#[cfg(feature = "postgres")]
pub use spatial_extension::PgExtensionBackend;

/// Default per-invocation action timeout
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Action timeout that leaves a fifth of the node deadline for the response
pub fn action_timeout_within(deadline: Duration) -> Duration {
    DEFAULT_ACTION_TIMEOUT.min(deadline - deadline / 5)
}

/// Result of a successful action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    /// Identifier chosen by the action; the handler derives one when absent
    pub physical_id: Option<String>,
    pub reason: String,
    pub data: Properties,
}

impl ActionOutcome {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            physical_id: None,
            reason: reason.into(),
            data: Properties::new(),
        }
    }

    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_id = Some(physical_id.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// An out-of-band unit of work
///
/// `create` must be idempotent: invoking it twice with the same properties
/// leaves the world as one invocation would.
#[async_trait]
pub trait CustomAction: Send + Sync {
    /// Stable name, used to derive physical identifiers
    fn name(&self) -> &str;

    async fn create(&self, event: &LifecycleEvent) -> Result<ActionOutcome, ActionError>;

    /// Re-applies `create` unless overridden
    async fn update(&self, event: &LifecycleEvent) -> Result<ActionOutcome, ActionError> {
        self.create(event).await
    }
}

/// Guaranteed-response boundary around a [`CustomAction`]
#[derive(Clone)]
pub struct CustomActionHandler {
    action: Arc<dyn CustomAction>,
    channel: ResponseChannel,
    action_timeout: Duration,
}

impl CustomActionHandler {
    pub fn new(action: Arc<dyn CustomAction>, channel: ResponseChannel) -> Self {
        Self {
            action,
            channel,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Override the action timeout; keep it below the orchestrator deadline
    pub fn with_action_timeout(mut self, action_timeout: Duration) -> Self {
        self.action_timeout = action_timeout;
        self
    }

    pub fn action_name(&self) -> &str {
        self.action.name()
    }

    /// Physical identifier used when the action does not report one
    pub fn derived_physical_id(&self, event: &LifecycleEvent) -> String {
        event
            .physical_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{}-{}", self.action.name(), event.logical_id))
    }

    /// Run the action for `event` and build its response
    pub async fn handle(&self, event: &LifecycleEvent) -> LifecycleResponse {
        let fallback_id = self.derived_physical_id(event);
        debug!(
            "{} handling {:?} for {} (request {})",
            self.action.name(),
            event.request_type,
            event.logical_id,
            event.request_id
        );

        let invocation = match event.request_type {
            RequestType::Create => self.action.create(event),
            RequestType::Update => self.action.update(event),
            RequestType::Delete => {
                info!(
                    "Delete of {} ({}) is a no-op",
                    event.logical_id, fallback_id
                );
                return LifecycleResponse::success(
                    event,
                    fallback_id,
                    "Nothing to delete",
                    Properties::new(),
                );
            }
        };

        let guarded = AssertUnwindSafe(invocation).catch_unwind();
        match tokio::time::timeout(self.action_timeout, guarded).await {
            Ok(Ok(Ok(outcome))) => {
                let physical_id = outcome
                    .physical_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or(fallback_id);
                info!(
                    "✅ {} succeeded for {}: {}",
                    self.action.name(),
                    event.logical_id,
                    outcome.reason
                );
                LifecycleResponse::success(event, physical_id, outcome.reason, outcome.data)
            }
            Ok(Ok(Err(e))) => {
                error!(
                    "❌ {} failed for {}: {}",
                    self.action.name(),
                    event.logical_id,
                    e
                );
                LifecycleResponse::failed(event, fallback_id, e.to_string())
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(
                    "❌ {} panicked for {}: {}",
                    self.action.name(),
                    event.logical_id,
                    message
                );
                LifecycleResponse::failed(event, fallback_id, format!("internal fault: {}", message))
            }
            Err(_) => {
                warn!(
                    "{} for {} exceeded {:?}",
                    self.action.name(),
                    event.logical_id,
                    self.action_timeout
                );
                LifecycleResponse::failed(event, fallback_id, "action timed out")
            }
        }
    }

    /// [`handle`](Self::handle), then exactly one delivery to the event's
    /// response address
    pub async fn handle_and_respond(&self, event: &LifecycleEvent) -> Result<u32, DeliveryError> {
        let response = self.handle(event).await;
        self.channel.send(&event.response_address, &response).await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
