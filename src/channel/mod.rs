// Copyright (c) 2025 - Cowboy AI, Inc.
//! Response Channel
//!
//! One-shot, URL-addressed delivery of a [`LifecycleResponse`] from a handler
//! back to the orchestrator.
//!
//! ```text
//! Handler ──send()──> ResponseChannel ──PUT──> ResponseTransport ──> CallbackRegistry
//!                      (retry/backoff)          (http | local)        (one-shot per address)
//! ```
//!
//! The channel owns its own retry budget, separate from the orchestrator's
//! dispatch budget and node deadline, so a delivery failure and a deadline
//! overrun stay distinguishable. After the budget is spent the failure is
//! logged and the handler's invocation is complete: the orchestrator's
//! deadline is the backstop.

pub mod http;
pub mod registry;
pub mod server;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::errors::DeliveryError;
use crate::lifecycle::LifecycleResponse;
use crate::retry::{retry_with_backoff_while, RetryPolicy};

pub use http::HttpTransport;
pub use registry::{CallbackRegistry, CallbackTicket, LocalTransport};
pub use server::{callback_router, CallbackListener};

/// A single delivery attempt of a serialized response
#[async_trait]
pub trait ResponseTransport: Send + Sync {
    /// PUT `body` to `address` once
    async fn put(&self, address: &str, body: &[u8]) -> Result<(), DeliveryError>;
}

/// Typed client delivering exactly one response per call
#[derive(Clone)]
pub struct ResponseChannel {
    transport: Arc<dyn ResponseTransport>,
    retry: RetryPolicy,
}

impl ResponseChannel {
    pub fn new(transport: Arc<dyn ResponseTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Deliver `response` to `address`
    ///
    /// Returns the number of attempts used, or [`DeliveryError::Exhausted`]
    /// once the retry budget is spent or the address turns out to be gone.
    pub async fn send(
        &self,
        address: &str,
        response: &LifecycleResponse,
    ) -> Result<u32, DeliveryError> {
        let serialized = serde_json::to_vec(response)
            .map_err(|e| DeliveryError::Transport(format!("unserializable response: {}", e)))?;
        let body: &[u8] = &serialized;
        let transport = self.transport.as_ref();

        debug!(
            "Delivering {:?} response for {} ({} bytes)",
            response.status,
            response.logical_id,
            body.len()
        );

        match retry_with_backoff_while(
            &self.retry,
            "response delivery",
            move |_| transport.put(address, body),
            |error: &DeliveryError| !error.is_terminal(),
        )
        .await
        {
            Ok(((), attempts)) => Ok(attempts),
            Err(exhausted) => {
                error!(
                    "Giving up delivering response for {} (request {}) after {} attempts: {}",
                    response.logical_id,
                    response.request_id,
                    exhausted.attempts,
                    exhausted.last_error
                );
                Err(DeliveryError::Exhausted {
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleEvent, RequestType};
    use crate::domain::Properties;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CountingTransport {
        failures_before_success: u32,
        failure: DeliveryError,
        calls: AtomicU32,
        bodies: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl ResponseTransport for CountingTransport {
        async fn put(&self, _address: &str, body: &[u8]) -> Result<(), DeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.bodies.lock().unwrap().push(body.to_vec());
            if call <= self.failures_before_success {
                Err(self.failure.clone())
            } else {
                Ok(())
            }
        }
    }

    fn channel(failures_before_success: u32, max_attempts: u32) -> (Arc<CountingTransport>, ResponseChannel) {
        failing_channel(
            DeliveryError::Transport("connection reset".to_string()),
            failures_before_success,
            max_attempts,
        )
    }

    fn failing_channel(
        failure: DeliveryError,
        failures_before_success: u32,
        max_attempts: u32,
    ) -> (Arc<CountingTransport>, ResponseChannel) {
        let transport = Arc::new(CountingTransport {
            failures_before_success,
            failure,
            calls: AtomicU32::new(0),
            bodies: Mutex::new(Vec::new()),
        });
        let retry = RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        (transport.clone(), ResponseChannel::new(transport, retry))
    }

    fn response() -> LifecycleResponse {
        let event = LifecycleEvent::new(
            RequestType::Create,
            "satellite-image",
            "PostgisExtension",
            Properties::new(),
            None,
            "local://callbacks/PostgisExtension/t",
        );
        LifecycleResponse::success(&event, "postgis-1", "installed", Properties::new())
    }

    #[tokio::test]
    async fn test_retries_transient_failures_with_identical_body() {
        let (transport, channel) = channel(2, 5);
        let attempts = channel.send("local://a", &response()).await.unwrap();

        assert_eq!(attempts, 3);
        let bodies = transport.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|b| b == &bodies[0]));
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_reported() {
        let (transport, channel) = channel(10, 2);
        let err = channel.send("local://a", &response()).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 2, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gone_address_is_not_retried() {
        let (transport, channel) = failing_channel(
            DeliveryError::UnknownAddress("local://callbacks/PostgisExtension/t".to_string()),
            10,
            5,
        );
        let err = channel.send("local://a", &response()).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 1, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_status_is_not_retried_but_server_errors_are() {
        let (gone, channel) = failing_channel(
            DeliveryError::Rejected { status: 404, body: String::new() },
            10,
            5,
        );
        assert!(channel.send("local://a", &response()).await.is_err());
        assert_eq!(gone.calls.load(Ordering::SeqCst), 1);

        let (busy, channel) = failing_channel(
            DeliveryError::Rejected { status: 503, body: String::new() },
            2,
            5,
        );
        assert_eq!(channel.send("local://a", &response()).await.unwrap(), 3);
        assert_eq!(busy.calls.load(Ordering::SeqCst), 3);
    }
}
