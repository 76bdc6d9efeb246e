// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-provisioning
//!
//! Deterministic graphs, drivers and actions shared by the integration tests.
//!
//! # Design Principles
//! - Graphs are built only here; tests ask for them by shape
//! - Drivers record what they were asked to do so tests can assert on
//!   side effects that must not happen
//! - Retry delays are tiny so tests stay fast on a real clock

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cim_provisioning::channel::ResponseTransport;
use cim_provisioning::{
    ActionError, ActionOutcome, BuiltinDriver, CallbackRegistry, CustomAction,
    CustomActionDriver, CustomActionHandler, DeliveryError, LifecycleEvent, LifecycleResponse,
    LocalTransport,
    OrchestratorConfig, ProvisioningOrchestrator, RequestType, ResourceDriver, ResourceGraph,
    ResourceKind, ResourceNode, ResponseChannel, RetryPolicy,
};

pub const STACK_ID: &str = "satellite-image-test";
pub const CALLBACK_BASE: &str = "local://provisioner";
pub const CUSTOM_KIND: &str = "SpatialExtension";
pub const DATABASE_ENDPOINT: &str = "db.internal";

pub const BUILTIN_KINDS: [ResourceKind; 7] = [
    ResourceKind::SecretStore,
    ResourceKind::NetworkBoundary,
    ResourceKind::Database,
    ResourceKind::Compute,
    ResourceKind::Gateway,
    ResourceKind::Bucket,
    ResourceKind::Distribution,
];

/// Millisecond backoff
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

pub fn orchestrator_config(deadline: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        deadline,
        dispatch_retry: fast_retry(3),
    }
}

/// A and B are leaves, C depends on both, D depends on C
///
/// ```text
///   A   B
///    \ /
///     C   (Custom::SpatialExtension)
///     |
///     D
/// ```
pub fn diamond_nodes() -> Vec<ResourceNode> {
    diamond_nodes_reading("Username")
}

/// Diamond whose C reads `attribute` of A through `Fn::GetAtt`
pub fn diamond_nodes_reading(attribute: &str) -> Vec<ResourceNode> {
    vec![
        ResourceNode::new("A", ResourceKind::SecretStore).with_property("Username", json!("postgres")),
        ResourceNode::new("B", ResourceKind::NetworkBoundary),
        ResourceNode::new("C", ResourceKind::custom(CUSTOM_KIND))
            .depends_on("A")
            .depends_on("B")
            .with_property("Username", json!({"Fn::GetAtt": ["A", attribute]}))
            .with_property("Network", json!({"Ref": "B"})),
        ResourceNode::new("D", ResourceKind::Compute).depends_on("C"),
    ]
}

pub fn diamond_graph() -> ResourceGraph {
    ResourceGraph::build(diamond_nodes()).expect("diamond graph is valid")
}

/// Action scripted per test
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed, echoing the event properties as result data
    Succeed,
    Fail(&'static str),
    Panic(&'static str),
}

pub struct ScriptedAction {
    script: Script,
    invocations: AtomicU32,
}

impl ScriptedAction {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            invocations: AtomicU32::new(0),
        }
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CustomAction for ScriptedAction {
    fn name(&self) -> &str {
        "spatial"
    }

    async fn create(&self, event: &LifecycleEvent) -> Result<ActionOutcome, ActionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Succeed => Ok(ActionOutcome {
                physical_id: None,
                reason: "installed".to_string(),
                data: event.properties.clone(),
            }),
            Script::Fail(reason) => Err(ActionError::Failed(reason.to_string())),
            Script::Panic(message) => panic!("{}", message),
        }
    }
}

/// Transport failing its first `failures` attempts
pub struct FlakyTransport {
    inner: Arc<dyn ResponseTransport>,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyTransport {
    pub fn new(inner: Arc<dyn ResponseTransport>, failures: u32) -> Self {
        Self {
            inner,
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseTransport for FlakyTransport {
    async fn put(&self, address: &str, body: &[u8]) -> Result<(), DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(DeliveryError::Transport(format!(
                "connection reset (attempt {})",
                attempt
            )));
        }
        self.inner.put(address, body).await
    }
}

/// Driver whose first `failures` dispatches are refused
pub struct FlakyDispatch {
    inner: Arc<dyn ResourceDriver>,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyDispatch {
    pub fn new(inner: Arc<dyn ResourceDriver>, failures: u32) -> Self {
        Self {
            inner,
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceDriver for FlakyDispatch {
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(DeliveryError::Transport("down".to_string()));
        }
        self.inner.dispatch(event).await
    }
}

/// Driver that provisions normally but answers every DELETE with FAILED
pub struct DeleteRefusingDriver {
    inner: Arc<dyn ResourceDriver>,
    channel: ResponseChannel,
}

#[async_trait]
impl ResourceDriver for DeleteRefusingDriver {
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), DeliveryError> {
        if event.request_type != RequestType::Delete {
            return self.inner.dispatch(event).await;
        }
        let physical_id = event.physical_id.clone().unwrap_or_default();
        let response = LifecycleResponse::failed(&event, physical_id, "cannot delete");
        self.channel
            .send(&event.response_address, &response)
            .await
            .map(|_| ())
    }
}

/// Driver that accepts events and never answers
pub struct SilentDriver;

#[async_trait]
impl ResourceDriver for SilentDriver {
    async fn dispatch(&self, _event: LifecycleEvent) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Log of dispatched events, shared by every recording driver of a harness
pub type DispatchLog = Arc<Mutex<Vec<(String, RequestType)>>>;

/// Records every dispatch before handing it on
pub struct RecordingDriver {
    inner: Arc<dyn ResourceDriver>,
    log: DispatchLog,
}

#[async_trait]
impl ResourceDriver for RecordingDriver {
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), DeliveryError> {
        self.log
            .lock()
            .expect("dispatch log poisoned")
            .push((event.logical_id.clone(), event.request_type));
        self.inner.dispatch(event).await
    }
}

/// How the custom node is realized
pub enum Custom {
    Action(Arc<ScriptedAction>),
    /// Succeeding action whose first `n` response deliveries fail
    FlakyDelivery(u32),
    /// Succeeding action whose first `n` dispatches are refused
    FlakyDispatch(u32),
    /// Succeeding action whose resource refuses to be deleted
    RefusesDelete,
    Silent,
    /// No driver registered for the custom kind
    Unregistered,
}

pub struct Harness {
    pub orchestrator: ProvisioningOrchestrator,
    pub registry: Arc<CallbackRegistry>,
    pub log: DispatchLog,
    pub flaky: Option<Arc<FlakyTransport>>,
    pub flaky_dispatch: Option<Arc<FlakyDispatch>>,
}

impl Harness {
    pub fn new(custom: Custom, deadline: Duration) -> Self {
        let registry = Arc::new(CallbackRegistry::new(CALLBACK_BASE));
        let local: Arc<dyn ResponseTransport> = Arc::new(LocalTransport::new(registry.clone()));
        let channel = ResponseChannel::new(local.clone(), fast_retry(5));
        let log: DispatchLog = Arc::new(Mutex::new(Vec::new()));
        let mut orchestrator = ProvisioningOrchestrator::new(
            STACK_ID,
            orchestrator_config(deadline),
            registry.clone(),
        );

        let builtin: Arc<dyn ResourceDriver> = Arc::new(RecordingDriver {
            inner: Arc::new(BuiltinDriver::new(channel.clone())),
            log: log.clone(),
        });
        for kind in BUILTIN_KINDS {
            orchestrator.register_driver(kind, builtin.clone());
        }

        let mut flaky = None;
        let mut flaky_dispatch = None;
        let succeeding = || -> Arc<dyn ResourceDriver> {
            Arc::new(CustomActionDriver::new(CustomActionHandler::new(
                Arc::new(ScriptedAction::new(Script::Succeed)),
                channel.clone(),
            )))
        };
        let custom_driver: Option<Arc<dyn ResourceDriver>> = match custom {
            Custom::Action(action) => Some(Arc::new(CustomActionDriver::new(
                CustomActionHandler::new(action, channel.clone())
                    .with_action_timeout(Duration::from_secs(2)),
            ))),
            Custom::FlakyDelivery(failures) => {
                let transport = Arc::new(FlakyTransport::new(local.clone(), failures));
                flaky = Some(transport.clone());
                let flaky_channel = ResponseChannel::new(transport, fast_retry(5));
                Some(Arc::new(CustomActionDriver::new(CustomActionHandler::new(
                    Arc::new(ScriptedAction::new(Script::Succeed)),
                    flaky_channel,
                ))))
            }
            Custom::FlakyDispatch(failures) => {
                let driver = Arc::new(FlakyDispatch::new(succeeding(), failures));
                flaky_dispatch = Some(driver.clone());
                Some(driver)
            }
            Custom::RefusesDelete => Some(Arc::new(DeleteRefusingDriver {
                inner: succeeding(),
                channel: channel.clone(),
            })),
            Custom::Silent => Some(Arc::new(SilentDriver)),
            Custom::Unregistered => None,
        };
        if let Some(inner) = custom_driver {
            orchestrator.register_driver(
                ResourceKind::custom(CUSTOM_KIND),
                Arc::new(RecordingDriver {
                    inner,
                    log: log.clone(),
                }),
            );
        }

        Self {
            orchestrator,
            registry,
            log,
            flaky,
            flaky_dispatch,
        }
    }

    /// Logical ids dispatched so far, in dispatch order
    pub fn dispatched(&self) -> Vec<(String, RequestType)> {
        self.log.lock().expect("dispatch log poisoned").clone()
    }

    pub fn was_dispatched(&self, logical_id: &str) -> bool {
        self.dispatched().iter().any(|(id, _)| id == logical_id)
    }
}
