//! Building typed definitions from the merged tree

use crate::config::KeyPath;
use crate::config::merge::key_to_string;
use crate::error::Diagnostic;
use crate::model::properties::GlobalOvs;
use crate::model::values::Backend;
use crate::model::{DeviceKind, DeviceType, NetDefinition, NetworkModel};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Model plus the problems found while building it
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub model: NetworkModel,
    pub diagnostics: Vec<Diagnostic>,
}

/// Convert the `network` subtree into typed definitions
///
/// Definitions at or below a path in `failed` are recorded as placeholders
/// rather than parsed. IDs declared in more than one section are reported
/// once per extra declaration; the first declaration in section order wins.
#[must_use]
pub fn build_model(tree: &Value, failed: &BTreeSet<KeyPath>) -> BuildOutput {
    let mut output = BuildOutput::default();
    let Some(network) = tree.get("network") else {
        return output;
    };

    let is_failed = |path: &KeyPath| {
        failed
            .iter()
            .any(|f| f.components().starts_with(path.components()))
    };

    let root = KeyPath::new(["network"]);
    output.model.renderer = network
        .get("renderer")
        .and_then(|r| serde_yaml::from_value::<Backend>(r.clone()).ok());

    if let Some(ovs) = network.get("openvswitch") {
        let path = root.child("openvswitch");
        if !is_failed(&path) {
            match serde_yaml::from_value::<Option<GlobalOvs>>(ovs.clone()) {
                Ok(settings) => output.model.openvswitch = Some(settings.unwrap_or_default()),
                Err(e) => output.diagnostics.push(Diagnostic::schema(path, e.to_string())),
            }
        }
    }

    let mut declared: BTreeMap<String, KeyPath> = BTreeMap::new();
    for device_type in DeviceType::ALL {
        let Some(Value::Mapping(section)) = network.get(device_type.section()) else {
            continue;
        };
        let section_path = root.child(device_type.section());
        let section_renderer = section
            .get("renderer")
            .and_then(|r| serde_yaml::from_value::<Backend>(r.clone()).ok());

        for (key, value) in section {
            let id = key_to_string(key);
            if id == "renderer" {
                continue;
            }
            let key_path = section_path.child(id.as_str());

            if let Some(first) = declared.get(&id) {
                output.diagnostics.push(Diagnostic::schema(
                    key_path,
                    format!("duplicate ID '{id}': already defined at {first}"),
                ));
                continue;
            }
            declared.insert(id.clone(), key_path.clone());

            if is_failed(&key_path) {
                output.model.placeholders.insert(id, device_type);
                continue;
            }

            let kind = match DeviceKind::from_value(device_type, value.clone()) {
                Ok(kind) => kind,
                Err(e) => {
                    output
                        .diagnostics
                        .push(Diagnostic::schema(key_path, e.to_string()));
                    output.model.placeholders.insert(id, device_type);
                    continue;
                }
            };

            let backend = kind
                .common()
                .renderer
                .or(section_renderer)
                .or(output.model.renderer)
                .unwrap_or(Backend::Networkd);
            debug!("Built {} '{}' rendered by {}", device_type, id, backend);

            output.model.definitions.insert(
                id.clone(),
                NetDefinition {
                    id,
                    backend,
                    key_path,
                    kind,
                },
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(text: &str) -> BuildOutput {
        let tree: Value = serde_yaml::from_str(text).unwrap();
        build_model(&tree, &BTreeSet::new())
    }

    #[test]
    fn renderer_inheritance() {
        let output = build(
            "network:
  version: 2
  renderer: NetworkManager
  ethernets:
    renderer: networkd
    eth0: {}
    eth1: {renderer: NetworkManager}
  bonds:
    bond0: {}
",
        );
        let defs = &output.model.definitions;
        assert_eq!(defs["eth0"].backend, Backend::Networkd);
        assert_eq!(defs["eth1"].backend, Backend::NetworkManager);
        assert_eq!(defs["bond0"].backend, Backend::NetworkManager);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn default_renderer_is_networkd() {
        let output = build("network: {version: 2, dummy-devices: {dm0: {}}}");
        assert_eq!(output.model.definitions["dm0"].backend, Backend::Networkd);
    }

    #[test]
    fn ids_are_unique_across_sections() {
        let output = build(
            "network:
  version: 2
  ethernets: {x: {}}
  bonds: {x: {}}
",
        );
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].key_path.to_string(), "network.bonds.x");
        assert_eq!(output.model.definitions["x"].device_type(), DeviceType::Ethernet);
    }

    #[test]
    fn failed_definitions_become_placeholders() {
        let tree: Value =
            serde_yaml::from_str("network: {version: 2, vlans: {v: {id: 5000, link: eth0}}}").unwrap();
        let failed = BTreeSet::from([KeyPath::new(["network", "vlans", "v", "id"])]);
        let output = build_model(&tree, &failed);
        assert!(output.model.definitions.is_empty());
        assert_eq!(output.model.placeholders.get("v"), Some(&DeviceType::Vlan));
        assert!(output.model.is_declared("v"));
    }

    #[test]
    fn global_openvswitch_block() {
        let output = build(
            "network:
  version: 2
  openvswitch:
    ports: [[patch0-1, patch1-0]]
",
        );
        let ports: Vec<_> = output.model.patch_ports().collect();
        assert_eq!(ports, ["patch0-1", "patch1-0"]);
    }
}
