//! Reference resolution and dependency ordering
//!
//! Composition edges come from `interfaces` (member before owner), `link`
//! (parent before child) and `peer` (mutual, no ordering). Definitions are
//! emitted in a topological order with ties broken by ID, so rendering is
//! deterministic.

use crate::error::Diagnostic;
use crate::model::values::Backend;
use crate::model::{DeviceKind, DeviceType, NetDefinition, NetworkModel};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A model whose references all resolve, in dependency order
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    model: NetworkModel,
    order: Vec<String>,
    /// member -> bond or bridge
    owners: BTreeMap<String, String>,
    /// member -> VRF
    vrfs: BTreeMap<String, String>,
    openvswitch: BTreeSet<String>,
    vf_counts: BTreeMap<String, u32>,
}

impl ResolvedModel {
    /// Definitions in dependency order
    pub fn definitions(&self) -> impl Iterator<Item = &NetDefinition> {
        self.order
            .iter()
            .filter_map(|id| self.model.definitions.get(id))
    }

    #[must_use]
    #[inline]
    pub fn get(&self, id: &str) -> Option<&NetDefinition> {
        self.model.definitions.get(id)
    }

    #[must_use]
    #[inline]
    pub const fn model(&self) -> &NetworkModel {
        &self.model
    }

    /// IDs in dependency order
    #[must_use]
    #[inline]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Bond or bridge `id` is a member of
    #[must_use]
    pub fn owner(&self, id: &str) -> Option<&NetDefinition> {
        self.owners.get(id).and_then(|owner| self.get(owner))
    }

    /// VRF `id` is enslaved to
    #[must_use]
    pub fn vrf(&self, id: &str) -> Option<&NetDefinition> {
        self.vrfs.get(id).and_then(|vrf| self.get(vrf))
    }

    /// Definitions whose `link` names `id`, in dependency order
    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a NetDefinition> + 'a {
        self.definitions()
            .filter(move |def| def.parent() == Some(id))
    }

    /// Whether `id` is handled by the Open vSwitch path
    #[must_use]
    #[inline]
    pub fn is_openvswitch(&self, id: &str) -> bool {
        self.openvswitch.contains(id)
    }

    /// Number of SR-IOV virtual functions to allocate on physical function `id`
    #[must_use]
    #[inline]
    pub fn vf_count(&self, id: &str) -> Option<u32> {
        self.vf_counts.get(id).copied()
    }

    /// Physical functions with their VF counts, by ID
    pub fn physical_functions(&self) -> impl Iterator<Item = (&str, u32)> {
        self.vf_counts.iter().map(|(id, count)| (id.as_str(), *count))
    }

    /// Definitions rendered by `backend`
    pub fn rendered_by(&self, backend: Backend) -> impl Iterator<Item = &NetDefinition> {
        self.definitions().filter(move |def| def.backend == backend)
    }
}

/// Resolve references and order the model
///
/// # Errors
///
/// Returns every reference diagnostic found: undefined IDs, conflicting
/// memberships, mismatched peers and dependency cycles.
pub fn resolve(mut model: NetworkModel) -> Result<ResolvedModel, Vec<Diagnostic>> {
    let (order, owners, vrfs, openvswitch, vf_counts, diagnostics) = {
        let mut resolver = Resolver::new(&model);
        resolver.collect_edges();
        let openvswitch = resolver.openvswitch_set();
        resolver.check_backends(&openvswitch);
        let vf_counts = resolver.sriov_counts();
        let order = resolver.order();
        (
            order,
            resolver.owners,
            resolver.vrfs,
            openvswitch,
            vf_counts,
            resolver.diagnostics,
        )
    };
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    for id in &openvswitch {
        if let Some(def) = model.definitions.get_mut(id)
            && def.backend != Backend::Networkd
        {
            debug!("'{}' is an Open vSwitch device; networkd carries its IP configuration", id);
            def.backend = Backend::Networkd;
        }
    }

    Ok(ResolvedModel {
        model,
        order,
        owners,
        vrfs,
        openvswitch,
        vf_counts,
    })
}

struct Resolver<'m> {
    model: &'m NetworkModel,
    diagnostics: Vec<Diagnostic>,
    /// prerequisite -> dependents
    edges: BTreeMap<&'m str, BTreeSet<&'m str>>,
    owners: BTreeMap<String, String>,
    vrfs: BTreeMap<String, String>,
}

impl<'m> Resolver<'m> {
    fn new(model: &'m NetworkModel) -> Self {
        Self {
            model,
            diagnostics: Vec::new(),
            edges: BTreeMap::new(),
            owners: BTreeMap::new(),
            vrfs: BTreeMap::new(),
        }
    }

    fn is_patch_port(&self, id: &str) -> bool {
        self.model.patch_ports().any(|port| port == id)
    }

    fn collect_edges(&mut self) {
        let model = self.model;
        for def in model.definitions.values() {
            self.edges.entry(def.id.as_str()).or_default();
            self.member_edges(def);
            self.parent_edge(def);
            self.peer_check(def);
        }

        for (member, vrf) in &self.vrfs {
            if let Some(owner) = self.owners.get(member) {
                let path = model.definitions[vrf].path("interfaces");
                self.diagnostics.push(Diagnostic::reference(
                    path,
                    format!("'{member}' is a member of '{owner}' and cannot also join VRF '{vrf}'"),
                ));
            }
        }
    }

    fn member_edges(&mut self, def: &'m NetDefinition) {
        let model = self.model;
        let is_vrf = def.device_type() == DeviceType::Vrf;
        for (index, member) in def.members().iter().enumerate() {
            let path = def.path("interfaces").index(index);

            if member == &def.id {
                self.diagnostics.push(Diagnostic::reference(
                    path,
                    format!("{} '{}' cannot be a member of itself", def.device_type(), def.id),
                ));
                continue;
            }
            if !model.is_declared(member) {
                if def.declares_openvswitch() && self.is_patch_port(member) {
                    continue;
                }
                self.diagnostics.push(Diagnostic::reference(
                    path,
                    format!(
                        "{} '{}' references undefined interface '{}'",
                        def.device_type(),
                        def.id,
                        member
                    ),
                ));
                continue;
            }

            let memberships = if is_vrf { &mut self.vrfs } else { &mut self.owners };
            if let Some(previous) = memberships.get(member.as_str()) {
                self.diagnostics.push(Diagnostic::reference(
                    path,
                    format!("interface '{member}' is already a member of '{previous}'"),
                ));
                continue;
            }
            memberships.insert(member.clone(), def.id.clone());

            if let Some((member_id, _)) = model.definitions.get_key_value(member.as_str()) {
                self.edges
                    .entry(member_id.as_str())
                    .or_default()
                    .insert(def.id.as_str());
            }
        }
    }

    fn parent_edge(&mut self, def: &'m NetDefinition) {
        let model = self.model;
        let Some(parent) = def.parent() else {
            return;
        };
        let path = def.path("link");

        if !model.is_declared(parent) {
            self.diagnostics.push(Diagnostic::reference(
                path,
                format!(
                    "{} '{}' links to undefined interface '{}'",
                    def.device_type(),
                    def.id,
                    parent
                ),
            ));
            return;
        }

        if let DeviceKind::Ethernet(_) = def.kind
            && let Some(pf) = model.definitions.get(parent)
            && (pf.device_type() != DeviceType::Ethernet || pf.parent().is_some())
        {
            self.diagnostics.push(Diagnostic::reference(
                path.clone(),
                format!(
                    "SR-IOV virtual function '{}' must link to an ethernet physical function, not '{}'",
                    def.id, parent
                ),
            ));
        }

        if let Some((parent_id, _)) = model.definitions.get_key_value(parent) {
            self.edges
                .entry(parent_id.as_str())
                .or_default()
                .insert(def.id.as_str());
        }
    }

    fn peer_check(&mut self, def: &'m NetDefinition) {
        let DeviceKind::Veth(ref props) = def.kind else {
            return;
        };
        let path = def.path("peer");
        let peer = props.peer.as_str();

        if peer == def.id {
            self.diagnostics.push(Diagnostic::reference(
                path,
                format!("virtual ethernet '{}' cannot peer with itself", def.id),
            ));
            return;
        }
        if !self.model.is_declared(peer) {
            self.diagnostics.push(Diagnostic::reference(
                path,
                format!("virtual ethernet '{}' peers with undefined interface '{}'", def.id, peer),
            ));
            return;
        }
        match self.model.definitions.get(peer).map(|p| &p.kind) {
            Some(DeviceKind::Veth(other)) if other.peer != def.id => {
                self.diagnostics.push(Diagnostic::reference(
                    path,
                    format!(
                        "virtual ethernet '{}' peers with '{}', but '{}' peers with '{}'",
                        def.id, peer, peer, other.peer
                    ),
                ));
            }
            Some(DeviceKind::Veth(_)) | None => {}
            Some(_) => {
                self.diagnostics.push(Diagnostic::reference(
                    path,
                    format!("virtual ethernet '{}' peers with '{}', which is not a virtual ethernet", def.id, peer),
                ));
            }
        }
    }

    /// Bonds and bridges with `openvswitch` settings, their OVS bonds, and
    /// VLANs on OVS bridges
    fn openvswitch_set(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self
            .model
            .definitions
            .values()
            .filter(|def| def.declares_openvswitch())
            .map(|def| def.id.clone())
            .collect();

        // A bond whose owner is an OVS bridge is an OVS bond even without settings
        for (member, owner) in &self.owners {
            if set.contains(owner)
                && let Some(def) = self.model.definitions.get(member)
                && def.device_type() == DeviceType::Bond
            {
                set.insert(member.clone());
            }
        }

        for def in self.model.definitions.values() {
            if def.device_type() == DeviceType::Vlan
                && def.parent().is_some_and(|link| set.contains(link))
            {
                set.insert(def.id.clone());
            }
        }
        set
    }

    fn check_backends(&mut self, openvswitch: &BTreeSet<String>) {
        for (member, owner) in self.owners.iter().chain(self.vrfs.iter()) {
            if openvswitch.contains(owner) || openvswitch.contains(member) {
                continue;
            }
            let (Some(member_def), Some(owner_def)) = (
                self.model.definitions.get(member),
                self.model.definitions.get(owner),
            ) else {
                continue;
            };
            if member_def.backend != owner_def.backend {
                self.diagnostics.push(Diagnostic::reference(
                    member_def.path("renderer"),
                    format!(
                        "'{}' is rendered by {} but its {} '{}' is rendered by {}",
                        member,
                        member_def.backend,
                        owner_def.device_type(),
                        owner,
                        owner_def.backend
                    ),
                ));
            }
        }

        // a veth pair is one netdev, so both ends need the same backend
        let model = self.model;
        for def in model.definitions.values() {
            if let DeviceKind::Veth(ref props) = def.kind
                && def.id < props.peer
                && let Some(peer) = model.definitions.get(&props.peer)
                && peer.backend != def.backend
            {
                self.diagnostics.push(Diagnostic::reference(
                    def.path("renderer"),
                    format!(
                        "'{}' is rendered by {} but its peer '{}' is rendered by {}",
                        def.id, def.backend, peer.id, peer.backend
                    ),
                ));
            }
        }
    }

    fn sriov_counts(&mut self) -> BTreeMap<String, u32> {
        let model = self.model;
        let mut vfs: BTreeMap<&str, u32> = BTreeMap::new();
        for def in model.definitions.values() {
            if let DeviceKind::Ethernet(ref props) = def.kind
                && let Some(pf) = props.link.as_deref()
                && model.definitions.contains_key(pf)
            {
                *vfs.entry(pf).or_default() += 1;
            }
        }

        let mut counts = BTreeMap::new();
        for def in model.definitions.values() {
            let DeviceKind::Ethernet(ref props) = def.kind else {
                continue;
            };
            let allocated = vfs.get(def.id.as_str()).copied().unwrap_or(0);
            let declared = props.virtual_function_count;
            if let Some(declared) = declared
                && declared < allocated
            {
                self.diagnostics.push(Diagnostic::reference(
                    def.path("virtual-function-count"),
                    format!(
                        "more virtual functions allocated to '{}' than its virtual-function-count: {} > {}",
                        def.id, allocated, declared
                    ),
                ));
            }
            let count = declared.unwrap_or(0).max(allocated);
            if count > 0 {
                counts.insert(def.id.clone(), count);
            }
        }
        counts
    }

    /// Kahn's algorithm with an ordered ready set
    fn order(&mut self) -> Vec<String> {
        let mut indegree: BTreeMap<&str, usize> =
            self.edges.keys().map(|id| (*id, 0)).collect();
        for dependents in self.edges.values() {
            for dependent in dependents {
                *indegree.entry(*dependent).or_default() += 1;
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(indegree.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_owned());
            if let Some(dependents) = self.edges.get(id) {
                for dependent in dependents {
                    if let Some(degree) = indegree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*dependent);
                        }
                    }
                }
            }
        }

        if order.len() < indegree.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            let remaining: BTreeSet<&str> = indegree
                .keys()
                .copied()
                .filter(|id| !placed.contains(id))
                .collect();
            self.report_cycles(&remaining);
        }
        order
    }

    fn report_cycles(&mut self, remaining: &BTreeSet<&'m str>) {
        // prerequisites among the unplaced nodes
        let mut depends_on: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (prerequisite, dependents) in &self.edges {
            for dependent in dependents {
                if remaining.contains(dependent) && remaining.contains(prerequisite) {
                    depends_on.entry(*dependent).or_default().insert(*prerequisite);
                }
            }
        }

        let mut handled: BTreeSet<&str> = BTreeSet::new();
        for start in remaining {
            if handled.contains(start) {
                continue;
            }
            let mut walk: Vec<&str> = vec![*start];
            let mut current = *start;
            let cycle_start = loop {
                let Some(next) = depends_on
                    .get(current)
                    .and_then(|prereqs| prereqs.iter().next().copied())
                else {
                    break None;
                };
                if let Some(position) = walk.iter().position(|id| *id == next) {
                    break Some(position);
                }
                walk.push(next);
                current = next;
            };
            let newly_handled = walk.iter().all(|id| !handled.contains(id));
            handled.extend(walk.iter().copied());

            let Some(position) = cycle_start else {
                continue;
            };
            if !newly_handled {
                continue;
            }
            let mut cycle: Vec<&str> = walk[position..].to_vec();
            let first = cycle[0];
            cycle.push(first);

            let path = self.model.definitions[first].key_path.clone();
            self.diagnostics.push(Diagnostic::reference(
                path,
                format!("dependency cycle: {}", cycle.join(" -> ")),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build_model;
    use serde_yaml::Value;

    fn model(text: &str) -> NetworkModel {
        let tree: Value = serde_yaml::from_str(text).unwrap();
        let output = build_model(&tree, &BTreeSet::new());
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        output.model
    }

    fn messages(result: Result<ResolvedModel, Vec<Diagnostic>>) -> Vec<String> {
        result
            .unwrap_err()
            .into_iter()
            .map(|d| format!("{}: {}", d.key_path, d.message))
            .collect()
    }

    #[test]
    fn vlan_follows_its_bond_and_bond_follows_members() {
        let resolved = resolve(model(
            "network:
  version: 2
  ethernets: {eth0: {}, eth1: {}}
  bonds: {abond: {interfaces: [eth0, eth1]}}
  vlans: {avlan: {id: 10, link: abond}}
",
        ))
        .unwrap();
        assert_eq!(resolved.order(), ["eth0", "eth1", "abond", "avlan"]);
        assert_eq!(resolved.owner("eth0").map(|d| d.id.as_str()), Some("abond"));
        let children: Vec<_> = resolved.children("abond").map(|d| d.id.as_str()).collect();
        assert_eq!(children, ["avlan"]);
    }

    #[test]
    fn vlan_cycle_names_both_ids() {
        let found = messages(resolve(model(
            "network:
  version: 2
  vlans:
    v1: {id: 1, link: v2}
    v2: {id: 2, link: v1}
",
        )));
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].contains("v1 -> v2 -> v1"), "{found:?}");
    }

    #[test]
    fn self_link_is_a_cycle() {
        let found = messages(resolve(model(
            "network: {version: 2, vlans: {v: {id: 1, link: v}}}",
        )));
        assert!(found[0].contains("v -> v"), "{found:?}");
    }

    #[test]
    fn undefined_member_is_named() {
        let found = messages(resolve(model(
            "network: {version: 2, bridges: {br0: {interfaces: [ghost0]}}}",
        )));
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("network.bridges.br0.interfaces.0"), "{found:?}");
        assert!(found[0].contains("br0") && found[0].contains("ghost0"), "{found:?}");
    }

    #[test]
    fn glob_matched_members_resolve_by_id() {
        let resolved = resolve(model(
            "network:
  version: 2
  ethernets:
    sw1: {match: {name: 'enp2*'}}
    sw2: {match: {name: 'enp2*'}}
  bridges:
    br0: {interfaces: [sw1, sw2]}
",
        ))
        .unwrap();
        assert_eq!(resolved.owner("sw2").map(|d| d.id.as_str()), Some("br0"));
    }

    #[test]
    fn exclusive_membership() {
        let found = messages(resolve(model(
            "network:
  version: 2
  ethernets: {eth0: {}}
  bonds: {bond0: {interfaces: [eth0]}}
  bridges: {br0: {interfaces: [eth0]}}
",
        )));
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("already a member of 'bond0'"), "{found:?}");
    }

    #[test]
    fn veth_peers_share_a_backend() {
        for (first, second) in [("NetworkManager", "networkd"), ("networkd", "NetworkManager")] {
            let found = messages(resolve(model(&format!(
                "network:
  version: 2
  virtual-ethernets:
    veth-a: {{peer: veth-b, renderer: {first}}}
    veth-b: {{peer: veth-a, renderer: {second}}}
"
            ))));
            assert_eq!(found.len(), 1, "{found:?}");
            assert!(found[0].starts_with("network.virtual-ethernets.veth-a.renderer"), "{found:?}");
            assert!(found[0].contains("its peer 'veth-b'"), "{found:?}");
        }
    }

    #[test]
    fn veth_peers_must_be_mutual() {
        assert!(resolve(model(
            "network: {version: 2, virtual-ethernets: {a: {peer: b}, b: {peer: a}}}",
        ))
        .is_ok());

        let found = messages(resolve(model(
            "network: {version: 2, virtual-ethernets: {a: {peer: b}, b: {peer: c}, c: {peer: b}}}",
        )));
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].starts_with("network.virtual-ethernets.a.peer"), "{found:?}");
    }

    #[test]
    fn members_share_the_owner_backend() {
        let found = messages(resolve(model(
            "network:
  version: 2
  ethernets: {eth0: {renderer: NetworkManager}}
  bridges: {br0: {interfaces: [eth0]}}
",
        )));
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("NetworkManager"), "{found:?}");
    }

    #[test]
    fn openvswitch_devices_are_rendered_by_networkd() {
        let resolved = resolve(model(
            "network:
  version: 2
  renderer: NetworkManager
  openvswitch: {ports: [[patch0, patch1]]}
  ethernets: {eth0: {}}
  bridges: {ovs0: {interfaces: [eth0, patch0], openvswitch: {}}}
  vlans: {vlan5: {id: 5, link: ovs0}}
",
        ))
        .unwrap();
        assert!(resolved.is_openvswitch("ovs0"));
        assert!(resolved.is_openvswitch("vlan5"));
        assert!(!resolved.is_openvswitch("eth0"));
        assert_eq!(resolved.get("ovs0").unwrap().backend, Backend::Networkd);
        assert_eq!(resolved.get("eth0").unwrap().backend, Backend::NetworkManager);
    }

    #[test]
    fn sriov_vf_counts() {
        let resolved = resolve(model(
            "network:
  version: 2
  ethernets:
    pf0: {virtual-function-count: 4}
    pf1: {}
    vf0: {link: pf0}
    vf1: {link: pf1}
    vf2: {link: pf1}
",
        ))
        .unwrap();
        assert_eq!(resolved.vf_count("pf0"), Some(4));
        assert_eq!(resolved.vf_count("pf1"), Some(2));
        assert_eq!(resolved.vf_count("vf0"), None);

        let found = messages(resolve(model(
            "network:
  version: 2
  ethernets:
    pf0: {virtual-function-count: 1}
    vf0: {link: pf0}
    vf1: {link: pf0}
",
        )));
        assert!(found[0].contains("2 > 1"), "{found:?}");
    }

    #[test]
    fn references_to_placeholders_resolve() {
        let mut model = model("network: {version: 2, vlans: {v: {id: 1, link: eth0}}}");
        model.placeholders.insert("eth0".to_owned(), DeviceType::Ethernet);
        assert!(resolve(model).is_ok());
    }
}
