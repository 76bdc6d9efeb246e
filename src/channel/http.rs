// Copyright (c) 2025 - Cowboy AI, Inc.
//! HTTP response transport
//!
//! PUTs the serialized response to the callback URL. The request carries an
//! empty `Content-Type` and an explicit `Content-Length`, which pre-signed
//! callback URLs require.

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::ResponseTransport;
use crate::errors::DeliveryError;

/// reqwest-backed [`ResponseTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(DeliveryError::from)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResponseTransport for HttpTransport {
    async fn put(&self, address: &str, body: &[u8]) -> Result<(), DeliveryError> {
        let response = self
            .client
            .put(address)
            .header(CONTENT_TYPE, "")
            .header(CONTENT_LENGTH, body.len())
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        debug!("PUT {} -> {}", address, status);

        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
