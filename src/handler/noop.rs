// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stub action that always succeeds without side effects

use async_trait::async_trait;

use super::{ActionOutcome, CustomAction};
use crate::errors::ActionError;
use crate::lifecycle::LifecycleEvent;

#[derive(Debug, Clone)]
pub struct NoopAction {
    name: String,
}

impl NoopAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NoopAction {
    fn default() -> Self {
        Self::new("noop")
    }
}

#[async_trait]
impl CustomAction for NoopAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self, event: &LifecycleEvent) -> Result<ActionOutcome, ActionError> {
        Ok(ActionOutcome::new(format!("{} acknowledged", event.logical_id))
            .with_data("Message", "no action performed"))
    }
}
