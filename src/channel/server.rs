// Copyright (c) 2025 - Cowboy AI, Inc.
//! Callback listener
//!
//! Serves `PUT /callbacks/{logical_id}/{token}` so that handlers running
//! outside this process can deliver their response over HTTP.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::CallbackRegistry;
use crate::config::CallbackConfig;
use crate::errors::{DeliveryError, ProvisioningResult};
use crate::lifecycle::LifecycleResponse;

/// Router accepting responses for `registry`
pub fn callback_router(registry: Arc<CallbackRegistry>) -> Router {
    Router::new()
        .route("/callbacks/{logical_id}/{token}", put(receive_response))
        .with_state(registry)
}

async fn receive_response(
    State(registry): State<Arc<CallbackRegistry>>,
    Path((logical_id, token)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, String) {
    let response: LifecycleResponse = match serde_json::from_slice(&body) {
        Ok(response) => response,
        Err(e) => {
            warn!("Malformed response for {}: {}", logical_id, e);
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match registry.deliver(&logical_id, &token, response).await {
        Ok(()) => (StatusCode::OK, String::new()),
        Err(DeliveryError::UnknownAddress(reason)) => (StatusCode::NOT_FOUND, reason),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// Running callback listener
pub struct CallbackListener {
    local_addr: SocketAddr,
    registry: Arc<CallbackRegistry>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind and start serving
    pub async fn bind(config: &CallbackConfig) -> ProvisioningResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(CallbackRegistry::new(config.base_url(local_addr)));
        let router = callback_router(registry.clone());
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = served {
                error!("Callback listener stopped: {}", e);
            }
        });

        info!(
            "📮 Callback listener on {} (base URL {})",
            local_addr,
            registry.base_url()
        );

        Ok(Self {
            local_addr,
            registry,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<CallbackRegistry> {
        self.registry.clone()
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("Callback listener task failed: {}", e);
        }
    }
}
