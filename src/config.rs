// Copyright (c) 2025 - Cowboy AI, Inc.
//! Configuration
//!
//! Every component receives its configuration at construction. Nothing is
//! read from the environment after start-up; `from_env` loaders exist for the
//! binary's single initialization point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::retry::RetryPolicy;

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Hard deadline for one node, from dispatch to response
    pub deadline: Duration,
    /// Budget for delivering an event to a driver
    pub dispatch_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(15 * 60),
            dispatch_retry: RetryPolicy {
                max_attempts: 3,
                ..RetryPolicy::default()
            },
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> ProvisioningResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            deadline: Duration::from_secs(env_or(
                "PROVISION_DEADLINE_SECS",
                defaults.deadline.as_secs(),
            )?),
            dispatch_retry: RetryPolicy {
                max_attempts: env_or(
                    "PROVISION_DISPATCH_ATTEMPTS",
                    defaults.dispatch_retry.max_attempts,
                )?,
                ..defaults.dispatch_retry
            },
        })
    }
}

/// Response channel settings
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Budget for delivering one response
    pub retry: RetryPolicy,
    /// Timeout of a single PUT
    pub request_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ChannelConfig {
    pub fn from_env() -> ProvisioningResult<Self> {
        let defaults = Self::default();
        let backoff_ms = env_or(
            "PROVISION_DELIVERY_BACKOFF_MS",
            defaults.retry.initial_delay.as_millis() as u64,
        )?;
        Ok(Self {
            retry: RetryPolicy {
                max_attempts: env_or("PROVISION_DELIVERY_ATTEMPTS", defaults.retry.max_attempts)?,
                initial_delay: Duration::from_millis(backoff_ms),
                ..defaults.retry
            },
            ..defaults
        })
    }
}

/// Callback listener settings
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackConfig {
    /// Address the listener binds to
    pub bind_addr: SocketAddr,
    /// Base URL handlers use to reach the listener; derived from the bound
    /// address when absent
    pub public_base_url: Option<String>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            public_base_url: None,
        }
    }
}

impl CallbackConfig {
    pub fn from_env() -> ProvisioningResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: env_or("PROVISION_CALLBACK_BIND", defaults.bind_addr)?,
            public_base_url: std::env::var("PROVISION_CALLBACK_URL").ok(),
        })
    }

    /// Base URL for a listener bound to `local_addr`
    pub fn base_url(&self, local_addr: SocketAddr) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", local_addr))
    }
}

/// Everything the `provision` binary needs
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionerConfig {
    pub orchestrator: OrchestratorConfig,
    pub channel: ChannelConfig,
    pub callback: CallbackConfig,
    /// Declaration file; the built-in satellite-image stack when absent
    pub stack_file: Option<PathBuf>,
}

impl ProvisionerConfig {
    pub fn from_env() -> ProvisioningResult<Self> {
        Ok(Self {
            orchestrator: OrchestratorConfig::from_env()?,
            channel: ChannelConfig::from_env()?,
            callback: CallbackConfig::from_env()?,
            stack_file: std::env::var("PROVISION_STACK_FILE").ok().map(PathBuf::from),
        })
    }
}

/// Read `key`, falling back to `default` when unset
///
/// A value that is set but does not parse is a configuration error rather
/// than a silent fallback.
pub fn env_or<T>(key: &str, default: T) -> ProvisioningResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| {
            ProvisioningError::Configuration(format!("{}={:?}: {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}
