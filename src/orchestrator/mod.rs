// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Orchestrator
//!
//! Walks a [`ResourceGraph`] batch by batch and drives every node to a
//! terminal state.
//!
//! ```text
//!            ┌─────────── batch N ───────────┐
//! run loop ──┤ Start ─ dispatch ─ wait ─ ... ├── join_all ── apply outcomes ── batch N+1
//!            └───────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A node is started only when every dependency is READY (teardown: every
//!   dependent).
//! - A FAILED node blocks its transitive dependents (teardown: dependencies);
//!   their drivers are never invoked.
//! - The deadline covers dispatch and the wait for the response. On expiry
//!   the callback address is withdrawn so a late response is rejected.
//! - Dispatch is retried with backoff; the action itself never is.
//! - Only the run loop mutates node state.

pub mod driver;
pub mod report;

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::channel::{CallbackRegistry, CallbackTicket};
use crate::config::OrchestratorConfig;
use crate::domain::{resolve_properties, NodeId, Properties, ResourceKind};
use crate::errors::{ProvisioningResult, ValidationError};
use crate::graph::ResourceGraph;
use crate::lifecycle::{LifecycleEvent, LifecycleResponse, RequestType};
use crate::retry::retry_with_backoff;
use crate::state_machine::{NodeInput, NodeState};

pub use driver::{BuiltinDriver, CustomActionDriver, ResourceDriver};
pub use report::{NodeReport, RunMode, RunOutcome, RunReport};

pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";
pub const RUN_ABORTED: &str = "run aborted";

/// Cooperative cancellation of a run
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop starting new nodes
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Resolves once [`abort`](Self::abort) has been called
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// What happened to one dispatched node
#[derive(Debug)]
enum NodeOutcome {
    Responded(LifecycleResponse),
    Failed(String),
}

/// Work prepared for one node of a batch
enum Step {
    /// Completes without a driver, with the given result data
    Immediate { attributes: Properties, reason: String },
    /// Needs a round trip through a driver
    Dispatch {
        driver: Arc<dyn ResourceDriver>,
        event: LifecycleEvent,
        ticket: CallbackTicket,
    },
    /// Could not be prepared
    Fail(String),
}

pub struct ProvisioningOrchestrator {
    stack_id: String,
    config: OrchestratorConfig,
    registry: Arc<CallbackRegistry>,
    drivers: HashMap<ResourceKind, Arc<dyn ResourceDriver>>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        stack_id: impl Into<String>,
        config: OrchestratorConfig,
        registry: Arc<CallbackRegistry>,
    ) -> Self {
        Self {
            stack_id: stack_id.into(),
            config,
            registry,
            drivers: HashMap::new(),
        }
    }

    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    pub fn registry(&self) -> Arc<CallbackRegistry> {
        self.registry.clone()
    }

    /// Route events for `kind` to `driver`, replacing any previous driver
    pub fn register_driver(&mut self, kind: ResourceKind, driver: Arc<dyn ResourceDriver>) {
        self.drivers.insert(kind, driver);
    }

    /// Every type that needs a lifecycle action must have a driver
    pub fn validate(&self, graph: &ResourceGraph) -> Result<(), ValidationError> {
        match graph
            .nodes()
            .find(|n| n.kind().requires_lifecycle_action() && !self.drivers.contains_key(n.kind()))
        {
            Some(node) => Err(ValidationError::MissingDriver {
                node: node.id().to_string(),
                resource_type: node.kind().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Create or update every node
    pub async fn run(&self, graph: &mut ResourceGraph) -> ProvisioningResult<RunReport> {
        self.run_with_abort(graph, &AbortHandle::new()).await
    }

    /// [`run`](Self::run) that stops starting nodes once `abort` fires
    pub async fn run_with_abort(
        &self,
        graph: &mut ResourceGraph,
        abort: &AbortHandle,
    ) -> ProvisioningResult<RunReport> {
        self.execute(graph, RunMode::Deploy, abort).await
    }

    /// Delete every realized node, dependents first
    pub async fn teardown(&self, graph: &mut ResourceGraph) -> ProvisioningResult<RunReport> {
        self.execute(graph, RunMode::Teardown, &AbortHandle::new()).await
    }

    async fn execute(
        &self,
        graph: &mut ResourceGraph,
        mode: RunMode,
        abort: &AbortHandle,
    ) -> ProvisioningResult<RunReport> {
        self.validate(graph)?;

        for node in graph.nodes_mut() {
            if node.state() != NodeState::Pending {
                node.apply(NodeInput::Reset)?;
            }
        }

        let mut batches: Vec<Vec<NodeId>> = graph.topological_batches().collect();
        if mode == RunMode::Teardown {
            batches.reverse();
        }

        info!(
            "🚀 {:?} of stack {}: {} nodes in {} batches",
            mode,
            self.stack_id,
            graph.len(),
            batches.len()
        );

        for (number, batch) in batches.into_iter().enumerate() {
            if abort.is_aborted() {
                block_pending(graph, RUN_ABORTED)?;
                break;
            }

            let mut dispatched = Vec::new();
            let mut settled = Vec::new();

            for id in batch {
                let Some(step) = self.prepare(graph, &id, mode).await? else {
                    continue;
                };
                match step {
                    Step::Dispatch {
                        driver,
                        event,
                        ticket,
                    } => {
                        apply(graph, &id, NodeInput::Start)?;
                        dispatched.push((id, driver, event, ticket));
                    }
                    Step::Immediate { attributes, reason } => {
                        apply(graph, &id, NodeInput::Start)?;
                        settled.push((id, Ok((attributes, reason))));
                    }
                    Step::Fail(reason) => {
                        apply(graph, &id, NodeInput::Start)?;
                        settled.push((id, Err(reason)));
                    }
                }
            }

            debug!(
                "Batch {}: {} dispatched, {} settled locally",
                number,
                dispatched.len(),
                settled.len()
            );

            let mut round_trips = Box::pin(join_all(
                dispatched
                    .into_iter()
                    .map(|(id, driver, event, ticket)| async move {
                        let outcome = self.round_trip(driver.as_ref(), event, ticket).await;
                        (id, outcome)
                    }),
            ));

            let outcomes = tokio::select! {
                outcomes = &mut round_trips => outcomes,
                _ = abort.aborted() => {
                    warn!("Run of {} aborted; in-flight nodes finish on their own", self.stack_id);
                    block_pending(graph, RUN_ABORTED)?;
                    round_trips.await
                }
            };

            for (id, result) in settled {
                match result {
                    Ok((attributes, reason)) => self.record_success(graph, &id, mode, None, attributes, reason)?,
                    Err(reason) => self.record_failure(graph, &id, mode, reason)?,
                }
            }
            for (id, outcome) in outcomes {
                match outcome {
                    NodeOutcome::Responded(response) if response.is_success() => self
                        .record_success(
                            graph,
                            &id,
                            mode,
                            Some(response.physical_id),
                            response.data,
                            response.reason,
                        )?,
                    NodeOutcome::Responded(response) => {
                        self.record_failure(graph, &id, mode, response.reason)?
                    }
                    NodeOutcome::Failed(reason) => self.record_failure(graph, &id, mode, reason)?,
                }
            }
        }

        let report = RunReport::from_graph(&self.stack_id, mode, graph);
        match report.outcome {
            RunOutcome::Success => info!("✅ {:?} of {} succeeded", mode, self.stack_id),
            RunOutcome::Failed => error!(
                "❌ {:?} of {} failed: {:?}",
                mode,
                self.stack_id,
                report.summary()
            ),
        }
        Ok(report)
    }

    /// Decide what to do with one node; `None` when it must not start
    async fn prepare(
        &self,
        graph: &mut ResourceGraph,
        id: &NodeId,
        mode: RunMode,
    ) -> ProvisioningResult<Option<Step>> {
        let Some(node) = graph.node(id.as_str()) else {
            return Ok(None);
        };
        if node.state() != NodeState::Pending {
            return Ok(None);
        }

        let gate = match mode {
            RunMode::Deploy => node.dependencies().to_vec(),
            RunMode::Teardown => graph.transitive_dependents(id.as_str()),
        };
        if let Some(unready) = gate.iter().find(|other| {
            graph
                .node(other.as_str())
                .map(|n| n.state() != NodeState::Ready)
                .unwrap_or(true)
        }) {
            let cause = format!("{} is not ready", unready);
            apply(graph, id, NodeInput::Block { cause })?;
            return Ok(None);
        }

        let resolved = resolve_properties(node.properties(), &*graph);
        let kind = node.kind().clone();
        let physical_id = node.physical_id().map(str::to_string);

        let step = match mode {
            RunMode::Deploy => match resolved {
                Err(e) => Step::Fail(format!("unresolved reference: {}", e)),
                Ok(properties) if !kind.requires_lifecycle_action() => Step::Immediate {
                    attributes: properties,
                    reason: "resolved".to_string(),
                },
                Ok(properties) => {
                    let request_type = if physical_id.is_some() {
                        RequestType::Update
                    } else {
                        RequestType::Create
                    };
                    self.dispatch_step(&kind, id, request_type, properties, physical_id)
                        .await
                }
            },
            RunMode::Teardown => match physical_id {
                Some(_) if kind.requires_lifecycle_action() => {
                    let properties =
                        resolved.unwrap_or_else(|_| node.properties().clone());
                    self.dispatch_step(&kind, id, RequestType::Delete, properties, physical_id)
                        .await
                }
                _ => Step::Immediate {
                    attributes: Properties::new(),
                    reason: "nothing to delete".to_string(),
                },
            },
        };
        Ok(Some(step))
    }

    async fn dispatch_step(
        &self,
        kind: &ResourceKind,
        id: &NodeId,
        request_type: RequestType,
        properties: Properties,
        physical_id: Option<String>,
    ) -> Step {
        let Some(driver) = self.drivers.get(kind).cloned() else {
            return Step::Fail(format!("no driver registered for {}", kind));
        };
        let ticket = self.registry.register(id.as_str()).await;
        let event = LifecycleEvent::new(
            request_type,
            self.stack_id.clone(),
            id.as_str(),
            properties,
            physical_id,
            ticket.address.clone(),
        );
        Step::Dispatch {
            driver,
            event,
            ticket,
        }
    }

    /// Dispatch `event` and wait for its response, bounded by the deadline
    async fn round_trip(
        &self,
        driver: &dyn ResourceDriver,
        event: LifecycleEvent,
        ticket: CallbackTicket,
    ) -> NodeOutcome {
        let CallbackTicket {
            token, receiver, ..
        } = ticket;
        let event_ref = &event;

        let exchange = async move {
            if let Err(exhausted) = retry_with_backoff(
                &self.config.dispatch_retry,
                "event dispatch",
                move |_| driver.dispatch(event_ref.clone()),
            )
            .await
            {
                return NodeOutcome::Failed(format!(
                    "dispatch failed after {} attempts: {}",
                    exhausted.attempts, exhausted.last_error
                ));
            }
            debug!("{} dispatched, awaiting response", event_ref.logical_id);

            match receiver.await {
                Ok(response) if response.answers(event_ref) => NodeOutcome::Responded(response),
                Ok(response) => NodeOutcome::Failed(format!(
                    "response for request {} does not answer {}",
                    response.request_id, event_ref.request_id
                )),
                Err(_) => NodeOutcome::Failed("callback closed without a response".to_string()),
            }
        };

        let outcome = match tokio::time::timeout(self.config.deadline, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "⏰ {} exceeded its {:?} deadline",
                    event.logical_id, self.config.deadline
                );
                NodeOutcome::Failed(DEADLINE_EXCEEDED.to_string())
            }
        };

        if !matches!(outcome, NodeOutcome::Responded(_)) {
            self.registry.withdraw(&token).await;
        }
        outcome
    }

    fn record_success(
        &self,
        graph: &mut ResourceGraph,
        id: &NodeId,
        mode: RunMode,
        physical_id: Option<String>,
        attributes: Properties,
        reason: String,
    ) -> ProvisioningResult<()> {
        let Some(node) = graph.node_mut(id.as_str()) else {
            return Ok(());
        };

        match mode {
            RunMode::Deploy => {
                if let Some(physical_id) = physical_id.filter(|p| !p.is_empty()) {
                    if !node.assign_physical_id(&physical_id) {
                        warn!(
                            "{} reported physical id {} but {} is kept",
                            id,
                            physical_id,
                            node.physical_id().unwrap_or_default()
                        );
                    }
                }
                node.set_attributes(attributes);
            }
            RunMode::Teardown => node.clear_physical_id(),
        }

        node.apply(NodeInput::Succeed {
            reason: Some(reason),
        })?;
        info!("✓ {} READY", id);
        Ok(())
    }

    fn record_failure(
        &self,
        graph: &mut ResourceGraph,
        id: &NodeId,
        mode: RunMode,
        reason: String,
    ) -> ProvisioningResult<()> {
        error!("✗ {} FAILED: {}", id, reason);
        apply(graph, id, NodeInput::Fail { reason })?;

        let affected = match mode {
            RunMode::Deploy => graph.transitive_dependents(id.as_str()),
            RunMode::Teardown => graph.transitive_dependencies(id.as_str()),
        };
        let cause = match mode {
            RunMode::Deploy => format!("dependency {} failed", id),
            RunMode::Teardown => format!("dependent {} failed to delete", id),
        };

        for other in affected {
            if graph.node(other.as_str()).map(|n| n.state()) == Some(NodeState::Pending) {
                apply(
                    graph,
                    &other,
                    NodeInput::Block {
                        cause: cause.clone(),
                    },
                )?;
                debug!("{} BLOCKED by {}", other, id);
            }
        }
        Ok(())
    }
}

fn apply(graph: &mut ResourceGraph, id: &NodeId, input: NodeInput) -> ProvisioningResult<()> {
    if let Some(node) = graph.node_mut(id.as_str()) {
        node.apply(input)?;
    }
    Ok(())
}

fn block_pending(graph: &mut ResourceGraph, cause: &str) -> ProvisioningResult<()> {
    for node in graph.nodes_mut() {
        if node.state() == NodeState::Pending {
            node.apply(NodeInput::Block {
                cause: cause.to_string(),
            })?;
        }
    }
    Ok(())
}
