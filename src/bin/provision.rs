// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioner
//!
//! Loads a stack declaration, starts the callback listener and provisions
//! every resource in dependency order. Prints the run report as JSON and
//! exits non-zero when any node did not reach READY.
//!
//! Run with: cargo run --bin provision --features postgres
//!
//! Configuration (environment):
//! - PROVISION_STACK_FILE: declaration JSON; the satellite-image stack when unset
//! - PROVISION_DEADLINE_SECS, PROVISION_DISPATCH_ATTEMPTS
//! - PROVISION_DELIVERY_ATTEMPTS, PROVISION_DELIVERY_BACKOFF_MS
//! - PROVISION_CALLBACK_BIND, PROVISION_CALLBACK_URL
//! - PROVISION_TOLERATE_UNREACHABLE: report success when the database is down
//! - DB_ENDPOINT, DB_PORT, DB_NAME, DB_USERNAME, DB_PASSWORD

use anyhow::{Context, Result};
#[cfg(feature = "postgres")]
use cim_provisioning::config::env_or;
use cim_provisioning::handler::{action_timeout_within, ConnectionDefaults};
use cim_provisioning::{
    satellite_image_stack, AbortHandle, BuiltinDriver, CallbackListener, CustomAction,
    CustomActionDriver, CustomActionHandler, HttpTransport, NoopAction, ProvisionerConfig,
    ProvisioningOrchestrator, ResourceGraph, ResourceKind, ResponseChannel, StackDeclaration,
};
use std::sync::Arc;
use tracing::{info, warn};

const SPATIAL_EXTENSION: &str = "SpatialExtension";

const BUILTIN_KINDS: [ResourceKind; 7] = [
    ResourceKind::SecretStore,
    ResourceKind::NetworkBoundary,
    ResourceKind::Database,
    ResourceKind::Compute,
    ResourceKind::Gateway,
    ResourceKind::Bucket,
    ResourceKind::Distribution,
];

#[cfg(feature = "postgres")]
fn spatial_extension_action(defaults: ConnectionDefaults) -> Result<Arc<dyn CustomAction>> {
    use cim_provisioning::handler::{PgExtensionBackend, SpatialExtensionAction, UnreachablePolicy};

    let policy = if env_or("PROVISION_TOLERATE_UNREACHABLE", false)? {
        UnreachablePolicy::ReportSuccess
    } else {
        UnreachablePolicy::Fail
    };
    info!("🐘 Spatial extension installer: PostgreSQL ({:?} when unreachable)", policy);
    Ok(Arc::new(
        SpatialExtensionAction::new(PgExtensionBackend, defaults).with_unreachable_policy(policy),
    ))
}

#[cfg(not(feature = "postgres"))]
fn spatial_extension_action(_defaults: ConnectionDefaults) -> Result<Arc<dyn CustomAction>> {
    warn!("Built without the postgres feature; the spatial extension step is a no-op");
    Ok(Arc::new(NoopAction::new("postgis-extension")))
}

async fn load_declaration(
    config: &ProvisionerConfig,
    defaults: &ConnectionDefaults,
) -> Result<StackDeclaration> {
    match &config.stack_file {
        Some(path) => {
            info!("📄 Loading declaration from {}", path.display());
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(StackDeclaration::from_json(&json)?)
        }
        None => {
            info!("📄 Using the built-in satellite-image stack");
            let endpoint = defaults.endpoint.as_deref().unwrap_or("localhost");
            Ok(satellite_image_stack("satellite-image", endpoint))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting provisioner");

    let config = ProvisionerConfig::from_env().context("Invalid configuration")?;
    let defaults = ConnectionDefaults::from_env().context("Invalid database configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Deadline per node: {:?}", config.orchestrator.deadline);
    info!("  - Dispatch attempts: {}", config.orchestrator.dispatch_retry.max_attempts);
    info!("  - Delivery attempts: {}", config.channel.retry.max_attempts);
    info!("  - Callback bind: {}", config.callback.bind_addr);
    info!("  - Database: {:?}", defaults);

    let declaration = load_declaration(&config, &defaults).await?;
    let stack_id = declaration.stack_id.clone();
    let mut graph = ResourceGraph::build(declaration.into_nodes())
        .context("Declaration failed validation")?;
    info!("✅ Graph of {} nodes validated", graph.len());

    let listener = CallbackListener::bind(&config.callback)
        .await
        .context("Failed to start callback listener")?;

    let transport = Arc::new(
        HttpTransport::new(config.channel.request_timeout)
            .context("Failed to build HTTP client")?,
    );
    let channel = ResponseChannel::new(transport, config.channel.retry.clone());

    let mut orchestrator =
        ProvisioningOrchestrator::new(stack_id, config.orchestrator.clone(), listener.registry());

    let builtin = Arc::new(BuiltinDriver::new(channel.clone()));
    for kind in BUILTIN_KINDS {
        orchestrator.register_driver(kind, builtin.clone());
    }

    let action_timeout = action_timeout_within(config.orchestrator.deadline);
    let custom_kinds: Vec<ResourceKind> = graph
        .nodes()
        .map(|n| n.kind().clone())
        .filter(ResourceKind::is_custom)
        .collect();
    for kind in custom_kinds {
        let action: Arc<dyn CustomAction> = if kind == ResourceKind::custom(SPATIAL_EXTENSION) {
            spatial_extension_action(defaults.clone())?
        } else {
            warn!("No action implemented for {}; acknowledging without side effects", kind);
            Arc::new(NoopAction::new(kind.to_string()))
        };
        let handler =
            CustomActionHandler::new(action, channel.clone()).with_action_timeout(action_timeout);
        orchestrator.register_driver(kind, Arc::new(CustomActionDriver::new(handler)));
    }

    let abort = AbortHandle::new();
    let on_interrupt = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted; no further nodes will be started");
            on_interrupt.abort();
        }
    });

    let report = orchestrator
        .run_with_abort(&mut graph, &abort)
        .await
        .context("Provisioning run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    listener.shutdown().await;

    if report.is_success() {
        info!("🎉 Stack {} provisioned", orchestrator.stack_id());
        Ok(())
    } else {
        anyhow::bail!(
            "Stack {} did not provision: {:?}",
            orchestrator.stack_id(),
            report.summary()
        )
    }
}
