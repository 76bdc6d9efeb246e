// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource drivers
//!
//! A driver accepts a [`LifecycleEvent`] and arranges for exactly one
//! response to reach the event's response address. `dispatch` returns once
//! the event has been handed over, not when the work is done.

use async_trait::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use crate::channel::ResponseChannel;
use crate::errors::DeliveryError;
use crate::handler::CustomActionHandler;
use crate::lifecycle::{LifecycleEvent, LifecycleResponse, RequestType};

/// Hands lifecycle events to whatever realizes a resource type
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), DeliveryError>;
}

/// Driver for collaborators this crate does not implement
///
/// Assigns a deterministic physical id and reports the resolved properties
/// as the result data, so later nodes can read them with `Fn::GetAtt`.
#[derive(Clone)]
pub struct BuiltinDriver {
    channel: ResponseChannel,
}

impl BuiltinDriver {
    pub fn new(channel: ResponseChannel) -> Self {
        Self { channel }
    }

    /// Physical id for `event`: the recorded one, else UUID v5 of
    /// `<stack>/<logical>`
    pub fn physical_id_for(event: &LifecycleEvent) -> String {
        event.physical_id.clone().unwrap_or_else(|| {
            let name = format!("{}/{}", event.stack_id, event.logical_id);
            Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
        })
    }

    fn respond(event: &LifecycleEvent) -> LifecycleResponse {
        let physical_id = Self::physical_id_for(event);
        match event.request_type {
            RequestType::Delete => {
                LifecycleResponse::success(event, physical_id, "deleted", Default::default())
            }
            RequestType::Create | RequestType::Update => LifecycleResponse::success(
                event,
                physical_id,
                "provisioned",
                event.properties.clone(),
            ),
        }
    }
}

#[async_trait]
impl ResourceDriver for BuiltinDriver {
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), DeliveryError> {
        let channel = self.channel.clone();
        debug!("Built-in {:?} of {}", event.request_type, event.logical_id);

        tokio::spawn(async move {
            let response = Self::respond(&event);
            if let Err(e) = channel.send(&event.response_address, &response).await {
                error!("Response for {} was not delivered: {}", event.logical_id, e);
            }
        });
        Ok(())
    }
}

/// Driver running a [`CustomActionHandler`] in its own task
#[derive(Clone)]
pub struct CustomActionDriver {
    handler: CustomActionHandler,
}

impl CustomActionDriver {
    pub fn new(handler: CustomActionHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl ResourceDriver for CustomActionDriver {
    async fn dispatch(&self, event: LifecycleEvent) -> Result<(), DeliveryError> {
        let handler = self.handler.clone();
        debug!(
            "Dispatching {:?} of {} to {}",
            event.request_type,
            event.logical_id,
            handler.action_name()
        );

        tokio::spawn(async move {
            // delivery failures are already logged by the channel
            let _ = handler.handle_and_respond(&event).await;
        });
        Ok(())
    }
}
