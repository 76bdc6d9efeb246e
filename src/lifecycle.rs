// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle Event / Response Protocol
//!
//! The orchestrator realizes a node by sending a [`LifecycleEvent`] to the
//! node's driver and waiting for exactly one [`LifecycleResponse`] at the
//! event's one-shot callback address.
//!
//! # Wire format
//!
//! ```json
//! {"requestType": "CREATE", "properties": {}, "requestId": "…", "stackId": "…",
//!  "logicalId": "PostgisExtension", "responseAddress": "http://…/callbacks/…"}
//!
//! {"status": "SUCCESS", "reason": "…", "physicalId": "…", "requestId": "…",
//!  "stackId": "…", "logicalId": "PostgisExtension", "data": {}}
//! ```
//!
//! The response schema is fixed: receivers other than this orchestrator rely
//! on the exact field set.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Properties;

/// Kind of lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// Outcome reported by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Request dispatched to the driver of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    pub request_id: String,
    pub stack_id: String,
    pub logical_id: String,
    pub response_address: String,
}

impl LifecycleEvent {
    /// New event with a fresh correlation id
    pub fn new(
        request_type: RequestType,
        stack_id: impl Into<String>,
        logical_id: impl Into<String>,
        properties: Properties,
        physical_id: Option<String>,
        response_address: impl Into<String>,
    ) -> Self {
        Self {
            request_type,
            properties,
            physical_id,
            request_id: Uuid::now_v7().to_string(),
            stack_id: stack_id.into(),
            logical_id: logical_id.into(),
            response_address: response_address.into(),
        }
    }
}

/// Completion status for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_id: String,
    pub request_id: String,
    pub stack_id: String,
    pub logical_id: String,
    pub data: Properties,
}

impl LifecycleResponse {
    /// Successful response correlated with `event`
    pub fn success(
        event: &LifecycleEvent,
        physical_id: impl Into<String>,
        reason: impl Into<String>,
        data: Properties,
    ) -> Self {
        Self::correlated(event, ResponseStatus::Success, physical_id.into(), reason.into(), data)
    }

    /// Failed response correlated with `event`
    ///
    /// A physical id is still required so that retries stay idempotent.
    pub fn failed(
        event: &LifecycleEvent,
        physical_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::correlated(
            event,
            ResponseStatus::Failed,
            physical_id.into(),
            reason.into(),
            Properties::new(),
        )
    }

    fn correlated(
        event: &LifecycleEvent,
        status: ResponseStatus,
        physical_id: String,
        reason: String,
        data: Properties,
    ) -> Self {
        Self {
            status,
            reason,
            physical_id,
            request_id: event.request_id.clone(),
            stack_id: event.stack_id.clone(),
            logical_id: event.logical_id.clone(),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Whether this response answers `event`
    pub fn answers(&self, event: &LifecycleEvent) -> bool {
        self.request_id == event.request_id
            && self.stack_id == event.stack_id
            && self.logical_id == event.logical_id
    }
}
