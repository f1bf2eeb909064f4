//! JSON Schema validation of the merged document

use crate::config::key_path::KeyPath;
use crate::config::merge::key_to_string;
use crate::error::{CompileError, Diagnostic};
use jsonschema::{Draft, Validator};
use serde_json::{Map, Number, Value as Json};
use serde_yaml::Value;

/// The embedded draft-7 schema for version 2 network documents
pub const SCHEMA: &str = include_str!("../../schema/netplan.schema.json");

/// Compile the embedded schema
///
/// # Errors
///
/// Returns an error if:
/// - The embedded schema is not valid JSON or not a valid draft-7 schema
pub fn compile_schema() -> Result<Validator, CompileError> {
    let schema: Json = serde_json::from_str(SCHEMA)
        .map_err(|e| CompileError::internal("<schema>", format!("Failed to parse embedded JSON schema: {e}")))?;

    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(&schema)
        .map_err(|e| CompileError::internal("<schema>", format!("Failed to compile JSON schema: {e}")))
}

/// Check the merged tree against the schema, collecting every violation
///
/// # Errors
///
/// Returns an error if:
/// - The embedded schema cannot be compiled
pub fn check(tree: &Value) -> Result<Vec<Diagnostic>, CompileError> {
    let validator = compile_schema()?;
    let instance = to_json(tree);

    let mut diagnostics: Vec<Diagnostic> = validator
        .iter_errors(&instance)
        .map(|error| {
            let pointer = error.instance_path.to_string();
            Diagnostic::schema(KeyPath::from_json_pointer(&pointer), error.to_string())
        })
        .collect();
    diagnostics.sort_by(|a, b| a.key_path.cmp(&b.key_path));
    diagnostics.dedup();
    Ok(diagnostics)
}

/// Convert a YAML tree into JSON, stringifying non-string mapping keys
#[must_use]
pub fn to_json(value: &Value) -> Json {
    match *value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Number(ref n) => {
            if let Some(u) = n.as_u64() {
                Json::Number(u.into())
            } else if let Some(i) = n.as_i64() {
                Json::Number(i.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map_or(Json::Null, Json::Number)
            }
        }
        Value::String(ref s) => Json::String(s.clone()),
        Value::Sequence(ref items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Mapping(ref mapping) => {
            let mut object = Map::with_capacity(mapping.len());
            for (key, child) in mapping {
                object.insert(key_to_string(key), to_json(child));
            }
            Json::Object(object)
        }
        Value::Tagged(ref tagged) => to_json(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics(text: &str) -> Vec<Diagnostic> {
        let tree: Value = serde_yaml::from_str(text).unwrap();
        check(&tree).unwrap()
    }

    #[test]
    fn embedded_schema_compiles() {
        assert!(compile_schema().is_ok());
    }

    #[test]
    fn minimal_document_is_valid() {
        assert!(diagnostics("network: {version: 2, ethernets: {eth0: {dhcp4: true}}}").is_empty());
    }

    #[test]
    fn version_must_be_two() {
        let found = diagnostics("network: {version: 3}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key_path.to_string(), "network.version");
    }

    #[test]
    fn vlan_id_upper_bound() {
        assert!(diagnostics("network: {version: 2, vlans: {v: {id: 4094, link: eth0}}}").is_empty());

        let found = diagnostics("network: {version: 2, vlans: {v: {id: 4095, link: eth0}}}");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key_path.to_string(), "network.vlans.v.id");
    }

    #[test]
    fn yaml_one_one_booleans_are_accepted() {
        assert!(diagnostics("network: {version: 2, ethernets: {eth0: {dhcp4: yes, dhcp6: off}}}").is_empty());
        assert_eq!(
            diagnostics("network: {version: 2, ethernets: {eth0: {dhcp4: maybe}}}").len(),
            1
        );
    }

    #[test]
    fn unrelated_errors_are_all_reported() {
        let found = diagnostics(
            "network:
  version: 2
  ethernets:
    eth0: {mtu: 0}
  bonds:
    bond0: {parameters: {mode: round-robin}}
",
        );
        let paths: Vec<String> = found.iter().map(|d| d.key_path.to_string()).collect();
        assert!(paths.contains(&"network.ethernets.eth0.mtu".to_owned()), "{paths:?}");
        assert!(paths.contains(&"network.bonds.bond0.parameters.mode".to_owned()), "{paths:?}");
    }

    #[test]
    fn numeric_keys_become_strings() {
        let tree: Value = serde_yaml::from_str("10: {a: 1}").unwrap();
        assert_eq!(to_json(&tree), serde_json::json!({"10": {"a": 1}}));
    }
}
