// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Declarations
//!
//! A deployment is declared once, as a flat list of resources:
//!
//! ```json
//! {
//!   "stackId": "satellite-image",
//!   "resources": [
//!     {"id": "DBCredentials", "type": "SecretStore", "properties": {"Username": "postgres"}},
//!     {"id": "SatelliteImageDb", "type": "Database", "dependsOn": ["DBCredentials"]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{NodeId, Properties, ResourceKind, ResourceNode};
use crate::errors::ValidationError;

/// One declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDeclaration {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(default)]
    pub depends_on: Vec<NodeId>,
    #[serde(default)]
    pub properties: Properties,
}

impl ResourceDeclaration {
    pub fn into_node(self) -> ResourceNode {
        self.depends_on
            .into_iter()
            .fold(ResourceNode::new(self.id, self.kind), |node, dep| {
                node.depends_on(dep)
            })
            .with_properties(self.properties)
    }
}

/// A whole deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDeclaration {
    pub stack_id: String,
    pub resources: Vec<ResourceDeclaration>,
}

impl StackDeclaration {
    /// Parse a declaration from JSON
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let declaration: StackDeclaration = serde_json::from_str(json)
            .map_err(|e| ValidationError::MalformedDeclaration(e.to_string()))?;

        if declaration.stack_id.trim().is_empty() {
            return Err(ValidationError::MalformedDeclaration(
                "stackId must not be empty".to_string(),
            ));
        }
        Ok(declaration)
    }

    /// Nodes in declaration order
    pub fn into_nodes(self) -> Vec<ResourceNode> {
        self.resources
            .into_iter()
            .map(ResourceDeclaration::into_node)
            .collect()
    }
}

fn resource(id: &str, kind: ResourceKind, depends_on: &[&str], properties: serde_json::Value) -> ResourceDeclaration {
    ResourceDeclaration {
        id: NodeId::from(id),
        kind,
        depends_on: depends_on.iter().map(|d| NodeId::from(*d)).collect(),
        properties: properties.as_object().cloned().unwrap_or_default(),
    }
}

/// The satellite-image point-annotation stack
///
/// Credentials and the network boundary come first, then the database, then
/// the spatial extension installer; the API function is gated on the
/// extension being installed.
pub fn satellite_image_stack(stack_id: &str, database_endpoint: &str) -> StackDeclaration {
    let resources = vec![
        resource(
            "DBCredentials",
            ResourceKind::SecretStore,
            &[],
            json!({
                "SecretName": "satellite-image-db-credentials",
                "Username": "postgres",
                "GenerateStringKey": "password",
                "ExcludePunctuation": true
            }),
        ),
        resource(
            "SatelliteImageVpc",
            ResourceKind::NetworkBoundary,
            &[],
            json!({"MaxAzs": 2, "NatGateways": 1}),
        ),
        resource(
            "LambdaSG",
            ResourceKind::NetworkBoundary,
            &["SatelliteImageVpc"],
            json!({"VpcId": {"Ref": "SatelliteImageVpc"}}),
        ),
        resource(
            "SatelliteImageDb",
            ResourceKind::Database,
            &["DBCredentials", "SatelliteImageVpc", "LambdaSG"],
            json!({
                "Engine": "aurora-postgresql",
                "EngineVersion": "14.12",
                "Endpoint": database_endpoint,
                "Port": 5432,
                "DefaultDatabaseName": "satellite_image_db",
                "CredentialsSecret": {"Ref": "DBCredentials"},
                "AllowFrom": {"Ref": "LambdaSG"},
                "ServerlessV2MinCapacity": 0,
                "ServerlessV2MaxCapacity": 2
            }),
        ),
        resource(
            "PostgisExtension",
            ResourceKind::custom("SpatialExtension"),
            &["SatelliteImageDb", "DBCredentials"],
            json!({
                "DbClusterIdentifier": {"Ref": "SatelliteImageDb"},
                "Endpoint": {"Fn::GetAtt": ["SatelliteImageDb", "Endpoint"]},
                "Port": {"Fn::GetAtt": ["SatelliteImageDb", "Port"]},
                "DatabaseName": {"Fn::GetAtt": ["SatelliteImageDb", "DefaultDatabaseName"]},
                "Username": {"Fn::GetAtt": ["DBCredentials", "Username"]},
                "Extension": "postgis"
            }),
        ),
        resource(
            "SatelliteImageApiFunction",
            ResourceKind::Compute,
            &["SatelliteImageDb", "DBCredentials", "PostgisExtension"],
            json!({
                "DatabaseSecret": {"Ref": "DBCredentials"},
                "DatabaseName": "satellite_image_db",
                "DbClusterIdentifier": {"Ref": "SatelliteImageDb"},
                "MemorySize": 1024,
                "TimeoutSecs": 30
            }),
        ),
        resource(
            "SatelliteImageApi",
            ResourceKind::Gateway,
            &["SatelliteImageApiFunction"],
            json!({
                "Handler": {"Ref": "SatelliteImageApiFunction"},
                "StageName": "prod",
                "BinaryMediaTypes": ["image/jpeg"]
            }),
        ),
        resource(
            "SatelliteImageUiBucket",
            ResourceKind::Bucket,
            &[],
            json!({"BlockPublicAccess": true, "AutoDeleteObjects": true}),
        ),
        resource(
            "SatelliteImageDistribution",
            ResourceKind::Distribution,
            &["SatelliteImageUiBucket", "SatelliteImageApi"],
            json!({
                "DefaultOrigin": {"Ref": "SatelliteImageUiBucket"},
                "ApiOrigin": {"Ref": "SatelliteImageApi"},
                "DefaultRootObject": "index.html"
            }),
        ),
        resource(
            "ApiEndpoint",
            ResourceKind::Output,
            &["SatelliteImageApi"],
            json!({"Value": {"Ref": "SatelliteImageApi"}}),
        ),
        resource(
            "UiEndpoint",
            ResourceKind::Output,
            &["SatelliteImageDistribution"],
            json!({"Value": {"Ref": "SatelliteImageDistribution"}}),
        ),
        resource(
            "DatabaseSecretArn",
            ResourceKind::Output,
            &["DBCredentials"],
            json!({"Value": {"Ref": "DBCredentials"}}),
        ),
        resource(
            "DatabaseEndpoint",
            ResourceKind::Output,
            &["SatelliteImageDb"],
            json!({"Value": {"Fn::GetAtt": ["SatelliteImageDb", "Endpoint"]}}),
        ),
    ];

    StackDeclaration {
        stack_id: stack_id.to_string(),
        resources,
    }
}
