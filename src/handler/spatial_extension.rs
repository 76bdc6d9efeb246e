// Copyright (c) 2025 - Cowboy AI, Inc.
//! Spatial extension installer
//!
//! Ensures a PostgreSQL extension (PostGIS by default) is present on the
//! database a node depends on. Connection settings come from the event's
//! property bag and fall back to the [`ConnectionDefaults`] given at
//! construction.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::{ActionOutcome, CustomAction};
use crate::config::env_or;
use crate::domain::Properties;
use crate::errors::{ActionError, ProvisioningResult};
use crate::lifecycle::LifecycleEvent;

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "postgres";
pub const DEFAULT_EXTENSION: &str = "postgis";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Result data keys
pub const DATA_EXTENSION_VERSION: &str = "ExtensionVersion";
pub const DATA_MESSAGE: &str = "Message";

const MAX_IDENTIFIER_LEN: usize = 63;

/// Process-level connection settings used when a property is absent
#[derive(Clone, Default, PartialEq)]
pub struct ConnectionDefaults {
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionDefaults {
    /// Read `DB_ENDPOINT`, `DB_PORT`, `DB_NAME`, `DB_USERNAME`, `DB_PASSWORD`
    pub fn from_env() -> ProvisioningResult<Self> {
        Ok(Self {
            endpoint: std::env::var("DB_ENDPOINT").ok(),
            port: match std::env::var("DB_PORT") {
                Ok(_) => Some(env_or("DB_PORT", DEFAULT_PORT)?),
                Err(_) => None,
            },
            database: std::env::var("DB_NAME").ok(),
            username: std::env::var("DB_USERNAME").ok(),
            password: std::env::var("DB_PASSWORD").ok(),
        })
    }
}

impl fmt::Debug for ConnectionDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDefaults")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Fully resolved settings for one invocation
#[derive(Clone, PartialEq)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub extension: String,
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("extension", &self.extension)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionSettings {
    /// Resolve settings from `properties`, then `defaults`, then built-in
    /// defaults
    pub fn from_properties(
        properties: &Properties,
        defaults: &ConnectionDefaults,
    ) -> Result<Self, ActionError> {
        let endpoint = text(properties, "Endpoint")?
            .or_else(|| defaults.endpoint.clone())
            .ok_or_else(|| ActionError::InvalidConfiguration("missing Endpoint".to_string()))?;

        let port = match text(properties, "Port")? {
            Some(raw) => raw.parse::<u16>().map_err(|e| {
                ActionError::InvalidConfiguration(format!("Port {:?}: {}", raw, e))
            })?,
            None => defaults.port.unwrap_or(DEFAULT_PORT),
        };

        let database = text(properties, "DatabaseName")?
            .or_else(|| defaults.database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let username = text(properties, "Username")?
            .or_else(|| defaults.username.clone())
            .ok_or_else(|| ActionError::InvalidConfiguration("missing Username".to_string()))?;

        let password = text(properties, "Password")?
            .or_else(|| defaults.password.clone())
            .unwrap_or_default();

        let extension =
            text(properties, "Extension")?.unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        validate_identifier(&extension)?;

        let connect_timeout = match text(properties, "ConnectTimeoutSecs")? {
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|e| {
                ActionError::InvalidConfiguration(format!("ConnectTimeoutSecs {:?}: {}", raw, e))
            })?),
            None => Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            endpoint,
            port,
            database,
            username,
            password,
            extension,
            connect_timeout,
        })
    }
}

/// Read a scalar property as text; numbers are accepted in their JSON form
fn text(properties: &Properties, key: &str) -> Result<Option<String>, ActionError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(ActionError::InvalidConfiguration(format!(
            "{} must be a scalar, got {}",
            key, other
        ))),
    }
}

/// Extension names end up in DDL and must be plain identifiers
pub fn validate_identifier(name: &str) -> Result<(), ActionError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(())
    } else {
        Err(ActionError::InvalidConfiguration(format!(
            "invalid extension name {:?}",
            name
        )))
    }
}

/// State of the extension after `ensure_extension`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionStatus {
    AlreadyInstalled { version: String },
    Installed { version: String },
}

impl ExtensionStatus {
    pub fn version(&self) -> &str {
        match self {
            Self::AlreadyInstalled { version } | Self::Installed { version } => version,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("database unreachable: {0}")]
    Unreachable(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Database side of the installer
#[async_trait]
pub trait ExtensionBackend: Send + Sync {
    /// Check for the extension and install it when missing, on one
    /// connection local to this call
    async fn ensure_extension(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<ExtensionStatus, BackendError>;
}

/// What an unreachable database means for the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreachablePolicy {
    /// Report FAILED and block dependents
    #[default]
    Fail,
    /// Report SUCCESS with a message so the deployment proceeds
    ReportSuccess,
}

/// Installs a database extension
pub struct SpatialExtensionAction<B> {
    backend: B,
    defaults: ConnectionDefaults,
    unreachable: UnreachablePolicy,
}

impl<B: ExtensionBackend> SpatialExtensionAction<B> {
    pub fn new(backend: B, defaults: ConnectionDefaults) -> Self {
        Self {
            backend,
            defaults,
            unreachable: UnreachablePolicy::default(),
        }
    }

    pub fn with_unreachable_policy(mut self, policy: UnreachablePolicy) -> Self {
        self.unreachable = policy;
        self
    }
}

#[async_trait]
impl<B: ExtensionBackend> CustomAction for SpatialExtensionAction<B> {
    fn name(&self) -> &str {
        "postgis-extension"
    }

    async fn create(&self, event: &LifecycleEvent) -> Result<ActionOutcome, ActionError> {
        let settings = ConnectionSettings::from_properties(&event.properties, &self.defaults)?;
        info!(
            "Ensuring extension {} on {}:{}/{}",
            settings.extension, settings.endpoint, settings.port, settings.database
        );

        match self.backend.ensure_extension(&settings).await {
            Ok(status) => {
                let message = match &status {
                    ExtensionStatus::AlreadyInstalled { version } => format!(
                        "{} extension already installed (version {})",
                        settings.extension, version
                    ),
                    ExtensionStatus::Installed { version } => format!(
                        "{} extension installed (version {})",
                        settings.extension, version
                    ),
                };
                Ok(ActionOutcome::new(message.clone())
                    .with_data(DATA_EXTENSION_VERSION, status.version())
                    .with_data(DATA_MESSAGE, message))
            }
            Err(BackendError::Unreachable(cause))
                if self.unreachable == UnreachablePolicy::ReportSuccess =>
            {
                warn!(
                    "Database {} unreachable, reporting success: {}",
                    settings.endpoint, cause
                );
                let message = format!(
                    "database not reachable during deployment; {} must be installed once the database is reachable",
                    settings.extension
                );
                Ok(ActionOutcome::new(message.clone()).with_data(DATA_MESSAGE, message))
            }
            Err(BackendError::Unreachable(cause)) => Err(ActionError::Unreachable(cause)),
            Err(e @ BackendError::Query(_)) => Err(ActionError::Failed(e.to_string())),
        }
    }
}

/// sqlx-backed [`ExtensionBackend`]
#[cfg(feature = "postgres")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PgExtensionBackend;

#[cfg(feature = "postgres")]
impl PgExtensionBackend {
    fn classify(error: sqlx::Error) -> BackendError {
        match error {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                BackendError::Unreachable(error.to_string())
            }
            other => BackendError::Query(other.to_string()),
        }
    }

    async fn installed_version(
        conn: &mut sqlx::PgConnection,
        extension: &str,
    ) -> Result<Option<String>, BackendError> {
        sqlx::query_scalar::<_, String>("SELECT extversion FROM pg_extension WHERE extname = $1")
            .bind(extension)
            .fetch_optional(conn)
            .await
            .map_err(Self::classify)
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl ExtensionBackend for PgExtensionBackend {
    async fn ensure_extension(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<ExtensionStatus, BackendError> {
        use sqlx::postgres::PgConnectOptions;
        use sqlx::{Connection, PgConnection};

        let options = PgConnectOptions::new()
            .host(&settings.endpoint)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.username)
            .password(&settings.password);

        let mut conn = tokio::time::timeout(
            settings.connect_timeout,
            PgConnection::connect_with(&options),
        )
        .await
        .map_err(|_| {
            BackendError::Unreachable(format!(
                "connect to {}:{} timed out after {:?}",
                settings.endpoint, settings.port, settings.connect_timeout
            ))
        })?
        .map_err(Self::classify)?;

        let status = match Self::installed_version(&mut conn, &settings.extension).await? {
            Some(version) => ExtensionStatus::AlreadyInstalled { version },
            None => {
                let ddl = format!("CREATE EXTENSION IF NOT EXISTS \"{}\"", settings.extension);
                sqlx::query(&ddl)
                    .execute(&mut conn)
                    .await
                    .map_err(Self::classify)?;
                let version = Self::installed_version(&mut conn, &settings.extension)
                    .await?
                    .ok_or_else(|| {
                        BackendError::Query(format!(
                            "{} missing from pg_extension after install",
                            settings.extension
                        ))
                    })?;
                ExtensionStatus::Installed { version }
            }
        };

        if let Err(e) = conn.close().await {
            warn!("Closing connection to {} failed: {}", settings.endpoint, e);
        }
        Ok(status)
    }
}
