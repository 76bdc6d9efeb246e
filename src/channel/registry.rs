// Copyright (c) 2025 - Cowboy AI, Inc.
//! Callback Registry
//!
//! Maps one-shot response addresses to the orchestrator task waiting on them.
//! Each address accepts exactly one response; later deliveries to the same
//! address are rejected as unknown.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use super::ResponseTransport;
use crate::errors::DeliveryError;
use crate::lifecycle::LifecycleResponse;

const CALLBACK_PATH: &str = "/callbacks/";

struct PendingCallback {
    logical_id: String,
    sender: oneshot::Sender<LifecycleResponse>,
}

/// Address handed out for one event, plus the receiving end
pub struct CallbackTicket {
    pub address: String,
    pub token: String,
    pub receiver: oneshot::Receiver<LifecycleResponse>,
}

/// Outstanding response addresses
pub struct CallbackRegistry {
    base_url: String,
    pending: Mutex<HashMap<String, PendingCallback>>,
}

impl CallbackRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Allocate a fresh address for `logical_id`
    pub async fn register(&self, logical_id: &str) -> CallbackTicket {
        let token = Uuid::now_v7().simple().to_string();
        let address = format!(
            "{}{}{}/{}",
            self.base_url,
            CALLBACK_PATH,
            urlencoding::encode(logical_id),
            token
        );
        let (sender, receiver) = oneshot::channel();

        self.pending.lock().await.insert(
            token.clone(),
            PendingCallback {
                logical_id: logical_id.to_string(),
                sender,
            },
        );
        debug!("Registered callback {} for {}", token, logical_id);

        CallbackTicket {
            address,
            token,
            receiver,
        }
    }

    /// Hand `response` to the task waiting on `token`
    ///
    /// The first delivery consumes the address.
    pub async fn deliver(
        &self,
        logical_id: &str,
        token: &str,
        response: LifecycleResponse,
    ) -> Result<(), DeliveryError> {
        let mut pending = self.pending.lock().await;

        match pending.get(token) {
            None => {
                return Err(DeliveryError::UnknownAddress(format!(
                    "no pending callback {}",
                    token
                )))
            }
            Some(entry) if entry.logical_id != logical_id || response.logical_id != logical_id => {
                return Err(DeliveryError::Rejected {
                    status: 400,
                    body: format!(
                        "callback {} belongs to {}, not {}",
                        token, entry.logical_id, response.logical_id
                    ),
                });
            }
            Some(_) => {}
        }

        let Some(entry) = pending.remove(token) else {
            return Err(DeliveryError::UnknownAddress(token.to_string()));
        };
        drop(pending);

        entry.sender.send(response).map_err(|_| {
            warn!("Waiter for callback {} ({}) is gone", token, logical_id);
            DeliveryError::UnknownAddress(format!("callback {} abandoned", token))
        })
    }

    /// Deliver to a full address previously returned by [`register`](Self::register)
    pub async fn deliver_to(
        &self,
        address: &str,
        response: LifecycleResponse,
    ) -> Result<(), DeliveryError> {
        let (logical_id, token) = self
            .parse_address(address)
            .ok_or_else(|| DeliveryError::UnknownAddress(address.to_string()))?;
        self.deliver(&logical_id, &token, response).await
    }

    /// Forget `token`; returns whether it was still pending
    pub async fn withdraw(&self, token: &str) -> bool {
        self.pending.lock().await.remove(token).is_some()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn parse_address(&self, address: &str) -> Option<(String, String)> {
        let rest = address
            .strip_prefix(self.base_url.as_str())?
            .strip_prefix(CALLBACK_PATH)?;
        let (logical, token) = rest.rsplit_once('/')?;
        let logical = urlencoding::decode(logical).ok()?.into_owned();
        Some((logical, token.to_string()))
    }
}

/// In-process transport delivering straight into a [`CallbackRegistry`]
///
/// Handlers hosted by the orchestrator use this instead of HTTP.
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<CallbackRegistry>,
}

impl LocalTransport {
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResponseTransport for LocalTransport {
    async fn put(&self, address: &str, body: &[u8]) -> Result<(), DeliveryError> {
        let response: LifecycleResponse =
            serde_json::from_slice(body).map_err(|e| DeliveryError::Rejected {
                status: 400,
                body: e.to_string(),
            })?;
        self.registry.deliver_to(address, response).await
    }
}
