// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Type Taxonomy
//!
//! Type tags for the nodes of a stack declaration. The tag selects the driver
//! that realizes a node; custom actions carry their own name after the
//! `Custom::` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

const CUSTOM_PREFIX: &str = "Custom::";

/// Resource type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceKind {
    /// Credential material (leaf)
    SecretStore,
    /// Reachability rules (leaf)
    NetworkBoundary,
    /// Stateful database cluster
    Database,
    /// Compute function or service
    Compute,
    /// API gateway
    Gateway,
    /// Object storage bucket
    Bucket,
    /// Content distribution
    Distribution,
    /// Declarative output value, no lifecycle action
    Output,
    /// Custom action, realized by a custom action handler
    Custom(String),
}

impl ResourceKind {
    /// Custom resource type with the given action name
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Whether nodes of this type are realized through a lifecycle event
    pub fn requires_lifecycle_action(&self) -> bool {
        !matches!(self, Self::Output)
    }

    /// Whether this is a custom action type
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Canonical string form
    pub fn as_string(&self) -> String {
        match self {
            Self::SecretStore => "SecretStore".to_string(),
            Self::NetworkBoundary => "NetworkBoundary".to_string(),
            Self::Database => "Database".to_string(),
            Self::Compute => "Compute".to_string(),
            Self::Gateway => "Gateway".to_string(),
            Self::Bucket => "Bucket".to_string(),
            Self::Distribution => "Distribution".to_string(),
            Self::Output => "Output".to_string(),
            Self::Custom(name) => format!("{}{}", CUSTOM_PREFIX, name),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SecretStore" => Ok(Self::SecretStore),
            "NetworkBoundary" => Ok(Self::NetworkBoundary),
            "Database" => Ok(Self::Database),
            "Compute" => Ok(Self::Compute),
            "Gateway" => Ok(Self::Gateway),
            "Bucket" => Ok(Self::Bucket),
            "Distribution" => Ok(Self::Distribution),
            "Output" => Ok(Self::Output),
            other => match other.strip_prefix(CUSTOM_PREFIX) {
                Some(name) if !name.is_empty() => Ok(Self::Custom(name.to_string())),
                _ => Err(ValidationError::MalformedDeclaration(format!(
                    "unknown resource type '{}'",
                    other
                ))),
            },
        }
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_string()
    }
}
