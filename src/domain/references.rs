// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property References
//!
//! A property value may point at another node instead of carrying a literal:
//!
//! ```text
//! {"Ref": "SatelliteImageDb"}                        → physical id
//! {"Fn::GetAtt": ["SatelliteImageDb", "Endpoint"]}   → attribute from result data
//! ```
//!
//! References are resolved just before a lifecycle event is built, when every
//! referenced node is already READY. A referenced node must also be a declared
//! dependency; the graph rejects declarations that rely on a reference alone.

use serde_json::Value;

use super::{NodeId, Properties};

const REF_KEY: &str = "Ref";
const GET_ATT_KEY: &str = "Fn::GetAtt";

/// A reference found inside a property bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Physical id of the target
    PhysicalId(NodeId),
    /// Named attribute of the target's result data
    Attribute(NodeId, String),
}

impl Reference {
    pub fn target(&self) -> &NodeId {
        match self {
            Reference::PhysicalId(id) | Reference::Attribute(id, _) => id,
        }
    }

    fn parse(value: &Value) -> Option<Reference> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        if let Some(target) = object.get(REF_KEY).and_then(Value::as_str) {
            return Some(Reference::PhysicalId(NodeId::from(target)));
        }
        match object.get(GET_ATT_KEY)?.as_array()?.as_slice() {
            [Value::String(target), Value::String(attribute)] => Some(Reference::Attribute(
                NodeId::from(target.as_str()),
                attribute.clone(),
            )),
            _ => None,
        }
    }
}

/// Why a reference could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("'{0}' has no physical id")]
    MissingPhysicalId(NodeId),

    #[error("'{0}' has no attribute '{1}'")]
    MissingAttribute(NodeId, String),
}

/// Read access to realized nodes, used while resolving references
pub trait ReferenceSource {
    fn physical_id_of(&self, id: &NodeId) -> Option<String>;
    fn attribute_of(&self, id: &NodeId, attribute: &str) -> Option<Value>;
}

/// Collect every reference in a property bag, ordered by key at each level
pub fn collect_references(properties: &Properties) -> Vec<Reference> {
    let mut found = Vec::new();
    for value in properties.values() {
        walk(value, &mut found);
    }
    found
}

fn walk(value: &Value, found: &mut Vec<Reference>) {
    if let Some(reference) = Reference::parse(value) {
        found.push(reference);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|item| walk(item, found)),
        Value::Object(map) => map.values().for_each(|item| walk(item, found)),
        _ => {}
    }
}

/// Replace every reference with the value it points at
pub fn resolve_properties(
    properties: &Properties,
    source: &impl ReferenceSource,
) -> Result<Properties, ResolveError> {
    properties
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(value, source)?)))
        .collect()
}

fn resolve_value(value: &Value, source: &impl ReferenceSource) -> Result<Value, ResolveError> {
    if let Some(reference) = Reference::parse(value) {
        return match reference {
            Reference::PhysicalId(id) => source
                .physical_id_of(&id)
                .map(Value::String)
                .ok_or(ResolveError::MissingPhysicalId(id)),
            Reference::Attribute(id, attribute) => source
                .attribute_of(&id, &attribute)
                .ok_or(ResolveError::MissingAttribute(id, attribute)),
        };
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, source))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| Ok((key.clone(), resolve_value(item, source)?)))
            .collect::<Result<Properties, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    struct Realized(HashMap<&'static str, (String, Value)>);

    impl ReferenceSource for Realized {
        fn physical_id_of(&self, id: &NodeId) -> Option<String> {
            self.0.get(id.as_str()).map(|(physical, _)| physical.clone())
        }

        fn attribute_of(&self, id: &NodeId, attribute: &str) -> Option<Value> {
            self.0
                .get(id.as_str())
                .and_then(|(_, data)| data.get(attribute).cloned())
        }
    }

    fn realized() -> Realized {
        Realized(HashMap::from([(
            "SatelliteImageDb",
            (
                "satellite-image-db-cluster".to_string(),
                json!({"Endpoint": "db.internal", "Port": 5432}),
            ),
        )]))
    }

    fn bag(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_collects_nested_references() {
        let properties = bag(json!({
            "DbClusterIdentifier": {"Ref": "SatelliteImageDb"},
            "Connection": {
                "Endpoint": {"Fn::GetAtt": ["SatelliteImageDb", "Endpoint"]},
                "Extras": [{"Ref": "DBCredentials"}, "literal"]
            }
        }));

        let targets: Vec<_> = collect_references(&properties)
            .iter()
            .map(|r| r.target().to_string())
            .collect();
        assert_eq!(
            targets,
            vec!["SatelliteImageDb", "DBCredentials", "SatelliteImageDb"]
        );
    }

    #[test]
    fn test_resolves_ref_and_get_att() {
        let properties = bag(json!({
            "DbClusterIdentifier": {"Ref": "SatelliteImageDb"},
            "Endpoint": {"Fn::GetAtt": ["SatelliteImageDb", "Endpoint"]},
            "Port": {"Fn::GetAtt": ["SatelliteImageDb", "Port"]},
            "DatabaseName": "satellite_image_db"
        }));

        let resolved = resolve_properties(&properties, &realized()).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({
                "DbClusterIdentifier": "satellite-image-db-cluster",
                "Endpoint": "db.internal",
                "Port": 5432,
                "DatabaseName": "satellite_image_db"
            })
        );
    }

    #[test]
    fn test_missing_attribute_is_reported() {
        let properties = bag(json!({
            "Version": {"Fn::GetAtt": ["SatelliteImageDb", "EngineVersion"]}
        }));
        let err = resolve_properties(&properties, &realized()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingAttribute(
                NodeId::from("SatelliteImageDb"),
                "EngineVersion".to_string()
            )
        );
    }

    #[test]
    fn test_objects_with_extra_keys_are_literals() {
        let properties = bag(json!({
            "Tag": {"Ref": "SatelliteImageDb", "Note": "not a reference"}
        }));
        assert!(collect_references(&properties).is_empty());
    }
}
