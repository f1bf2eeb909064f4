//! Open vSwitch renderer
//!
//! Bridges, bonds on OVS bridges and VLANs over them become oneshot units
//! running `ovs-vsctl`. networkd still carries their IP configuration.

use crate::model::properties::{GlobalOvs, OvsSettings};
use crate::model::values::{BondMode, OpenFlow, OvsConnectionMode};
use crate::model::{DeviceKind, NetDefinition};
use crate::render::ini::{IniFile, shell_escape};
use crate::render::networkd::UNIT_DIR;
use crate::render::{ArtifactSet, RenderContext, RenderError, Renderer, Unsupported, wanted_by_networkd};
use std::collections::BTreeMap;
use tracing::debug;

pub const OVS_VSCTL: &str = "/usr/bin/ovs-vsctl";

const OVSDB_UNIT: &str = "ovsdb-server.service";

/// Unit name for the configuration of `id`
#[must_use]
pub fn unit_name(id: &str) -> String {
    format!("netplan-ovs-{id}.service")
}

/// Renderer for bridges, bonds and VLANs handled by Open vSwitch
#[derive(Debug, Default)]
pub struct OvsRenderer {
    units: Vec<String>,
}

impl OvsRenderer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

/// `ovs-vsctl` invocations of one unit
#[derive(Debug, Default)]
struct Commands(Vec<Vec<String>>);

impl Commands {
    fn run(&mut self, args: &[&str]) {
        self.0.push(args.iter().map(|a| (*a).to_owned()).collect());
    }

    fn push(&mut self, args: Vec<String>) {
        self.0.push(args);
    }

    /// `set <table> <record> <column>:<key>=<value>` for every map entry
    fn set_map<V: ToString>(&mut self, table: &str, record: &str, column: &str, map: &BTreeMap<String, V>) {
        for (key, value) in map {
            self.run(&["set", table, record, &format!("{column}:{key}={}", value.to_string())]);
        }
    }

    fn exec_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(|args| {
            let words: Vec<String> = args.iter().map(|a| shell_escape(a)).collect();
            format!("{OVS_VSCTL} {}", words.join(" "))
        })
    }
}

fn ifname(def: &NetDefinition) -> &str {
    def.interface_name().unwrap_or(&def.id)
}

/// The patch port paired with `port`, if it is one
fn patch_peer<'a>(global: Option<&'a GlobalOvs>, port: &str) -> Option<&'a str> {
    global?.patch_ports().find_map(|(a, b)| {
        if a == port {
            Some(b)
        } else if b == port {
            Some(a)
        } else {
            None
        }
    })
}

fn protocols_value(protocols: &[OpenFlow]) -> String {
    protocols
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn bridge_commands(
    def: &NetDefinition,
    members: &[String],
    ovs: Option<&OvsSettings>,
    ctx: &RenderContext<'_>,
    commands: &mut Commands,
) {
    let global = ctx.model.model().openvswitch.as_ref();
    let bridge = def.id.as_str();
    commands.run(&["--may-exist", "add-br", bridge]);

    for member in members {
        if let Some(peer) = patch_peer(global, member) {
            commands.run(&[
                "--may-exist",
                "add-port",
                bridge,
                member,
                "--",
                "set",
                "Interface",
                member,
                "type=patch",
                &format!("options:peer={peer}"),
            ]);
            continue;
        }
        match ctx.model.get(member) {
            // bonds attach themselves with add-bond
            Some(m) if matches!(m.kind, DeviceKind::Bond(_)) => {}
            Some(m) => commands.run(&["--may-exist", "add-port", bridge, ifname(m)]),
            None => commands.run(&["--may-exist", "add-port", bridge, member]),
        }
    }

    let own_protocols = ovs.map(|o| o.protocols.as_slice()).unwrap_or_default();
    let protocols = if own_protocols.is_empty() {
        global.map(|g| g.protocols.as_slice()).unwrap_or_default()
    } else {
        own_protocols
    };

    if let Some(ovs) = ovs {
        if let Some(mode) = ovs.fail_mode {
            commands.run(&["set-fail-mode", bridge, mode.as_str()]);
        }
        if let Some(snooping) = ovs.mcast_snooping {
            commands.run(&["set", "Bridge", bridge, &format!("mcast_snooping_enable={snooping}")]);
        }
        if let Some(rstp) = ovs.rstp {
            commands.run(&["set", "Bridge", bridge, &format!("rstp_enable={rstp}")]);
        }
    }
    if !protocols.is_empty() {
        commands.run(&["set", "Bridge", bridge, &format!("protocols={}", protocols_value(protocols))]);
    }
    if let Some(controller) = ovs.and_then(|o| o.controller.as_ref()) {
        if !controller.addresses.is_empty() {
            let mut args = vec!["set-controller".to_owned(), bridge.to_owned()];
            args.extend(controller.addresses.iter().cloned());
            commands.push(args);
        }
        if let Some(mode) = controller.connection_mode {
            let mode = match mode {
                OvsConnectionMode::InBand => "in-band",
                OvsConnectionMode::OutOfBand => "out-of-band",
            };
            commands.run(&["set", "Controller", bridge, &format!("connection-mode={mode}")]);
        }
    }
    if let Some(ovs) = ovs {
        commands.set_map("Bridge", bridge, "external-ids", &ovs.external_ids);
        commands.set_map("Bridge", bridge, "other-config", &ovs.other_config);
    }
    commands.run(&["set", "Bridge", bridge, "external-ids:netplan=true"]);
}

fn bond_mode(mode: BondMode) -> Option<&'static str> {
    match mode {
        BondMode::ActiveBackup => Some("active-backup"),
        BondMode::Lacp => Some("balance-tcp"),
        BondMode::BalanceRr
        | BondMode::BalanceXor
        | BondMode::Broadcast
        | BondMode::BalanceTlb
        | BondMode::BalanceAlb => None,
    }
}

impl Renderer for OvsRenderer {
    fn name(&self) -> &'static str {
        "openvswitch"
    }

    fn owns(&self, def: &NetDefinition, ctx: &RenderContext<'_>) -> bool {
        ctx.model.is_openvswitch(&def.id)
    }

    fn render(
        &mut self,
        def: &NetDefinition,
        ctx: &RenderContext<'_>,
        out: &mut ArtifactSet,
    ) -> Result<(), RenderError> {
        let mut unsupported = Unsupported::default();
        let mut commands = Commands::default();
        let mut requires: Option<String> = None;

        match def.kind {
            DeviceKind::Bridge(ref props) => {
                bridge_commands(def, &props.interfaces, props.common.ovs(), ctx, &mut commands);
            }
            DeviceKind::Bond(ref props) => {
                let bridge = ctx
                    .model
                    .owner(&def.id)
                    .filter(|o| matches!(o.kind, DeviceKind::Bridge(_)) && ctx.model.is_openvswitch(&o.id));
                match bridge {
                    Some(bridge) => {
                        let mut args = vec![
                            "--may-exist".to_owned(),
                            "add-bond".to_owned(),
                            bridge.id.clone(),
                            def.id.clone(),
                        ];
                        args.extend(
                            props
                                .interfaces
                                .iter()
                                .map(|m| ctx.model.get(m).map_or(m.as_str(), ifname).to_owned()),
                        );
                        commands.push(args);
                        requires = Some(bridge.id.clone());
                    }
                    None => unsupported.push(
                        def,
                        "openvswitch",
                        "an Open vSwitch bond must be a member of an Open vSwitch bridge".to_owned(),
                    ),
                }
                if let Some(mode) = props.parameters.mode {
                    match bond_mode(mode) {
                        Some(ovs_mode) => {
                            commands.run(&["set", "Port", &def.id, &format!("bond_mode={ovs_mode}")]);
                        }
                        None => unsupported.push(
                            def,
                            "parameters.mode",
                            format!("bond mode '{mode}' is not supported by Open vSwitch"),
                        ),
                    }
                }
                if let Some(ovs) = props.common.ovs() {
                    if let Some(lacp) = ovs.lacp {
                        commands.run(&["set", "Port", &def.id, &format!("lacp={lacp}")]);
                    }
                    commands.set_map("Port", &def.id, "external-ids", &ovs.external_ids);
                    commands.set_map("Port", &def.id, "other-config", &ovs.other_config);
                }
                commands.run(&["set", "Port", &def.id, "external-ids:netplan=true"]);
            }
            DeviceKind::Vlan(ref props) => {
                let parent = ctx
                    .model
                    .get(&props.link)
                    .filter(|p| matches!(p.kind, DeviceKind::Bridge(_)));
                match parent {
                    Some(parent) => {
                        commands.run(&["--may-exist", "add-br", &def.id, &parent.id, &props.id.to_string()]);
                        requires = Some(parent.id.clone());
                    }
                    None => unsupported.push(
                        def,
                        "link",
                        "VLANs on Open vSwitch must link to an Open vSwitch bridge".to_owned(),
                    ),
                }
            }
            DeviceKind::Ethernet(_)
            | DeviceKind::Wifi(_)
            | DeviceKind::Modem(_)
            | DeviceKind::Vrf(_)
            | DeviceKind::Tunnel(_)
            | DeviceKind::Dummy(_)
            | DeviceKind::Veth(_)
            | DeviceKind::NmDevice(_) => {
                return Err(RenderError::internal(
                    &def.id,
                    format!("{} cannot be an Open vSwitch device", def.device_type()),
                ));
            }
        }
        unsupported.finish()?;

        let name = unit_name(&def.id);
        let unit = service_unit(
            &format!("OpenVSwitch configuration for {}", def.id),
            requires.as_deref().map(unit_name).as_deref(),
            &commands,
        );
        out.insert(format!("{UNIT_DIR}/{name}"), unit);
        debug!("Rendered Open vSwitch unit {} with {} commands", name, commands.0.len());
        self.units.push(name);
        Ok(())
    }

    fn finish(&mut self, ctx: &RenderContext<'_>, out: &mut ArtifactSet) -> Result<(), RenderError> {
        if let Some(global) = ctx.model.model().openvswitch.as_ref() {
            let mut commands = Commands::default();
            commands.set_map("open_vswitch", ".", "external-ids", &global.external_ids);
            commands.set_map("open_vswitch", ".", "other-config", &global.other_config);
            if let Some(ssl) = global.ssl.as_ref()
                && let (Some(key), Some(cert), Some(ca)) =
                    (ssl.private_key.as_deref(), ssl.certificate.as_deref(), ssl.ca_cert.as_deref())
            {
                commands.run(&["set-ssl", key, cert, ca]);
            }
            if !commands.0.is_empty() {
                let name = unit_name("global");
                out.insert(
                    format!("{UNIT_DIR}/{name}"),
                    service_unit("OpenVSwitch configuration for global settings", None, &commands),
                );
                self.units.push(name);
            }
        }
        wanted_by_networkd(out, "ovs", &self.units);
        Ok(())
    }
}

fn service_unit(description: &str, requires: Option<&str>, commands: &Commands) -> String {
    let mut unit = IniFile::new();
    let section = unit.section("Unit");
    section
        .push("Description", description)
        .push("DefaultDependencies", "no")
        .push("Wants", OVSDB_UNIT)
        .push("After", OVSDB_UNIT)
        .push("Before", "network.target");
    if let Some(requires) = requires {
        section.push("Requires", requires).push("After", requires);
    }
    let service = unit.section("Service");
    service.push("Type", "oneshot").push("RemainAfterExit", "yes");
    for line in commands.exec_lines() {
        service.push("ExecStart", line);
    }
    unit.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileContext;
    use crate::error::CompileError;
    use crate::render::render_text;

    fn render(text: &str) -> Result<ArtifactSet, CompileError> {
        render_text(text, &CompileContext::default())
    }

    fn unit(set: &ArtifactSet, id: &str) -> String {
        let path = format!("{UNIT_DIR}/{}", unit_name(id));
        set.contents(&path)
            .unwrap_or_else(|| panic!("{path} missing"))
            .to_owned()
    }

    #[test]
    fn bridge_with_bond_and_patch_port() {
        let set = render(
            "network:
  version: 2
  openvswitch:
    ports: [[patch0-1, patch1-0]]
  ethernets: {eth0: {}, eth1: {}, eth2: {}}
  bonds:
    bond0:
      interfaces: [eth1, eth2]
      parameters: {mode: active-backup}
      openvswitch: {lacp: off}
  bridges:
    br0:
      interfaces: [eth0, bond0, patch0-1]
      dhcp4: true
      openvswitch:
        fail-mode: secure
        protocols: [OpenFlow10, OpenFlow13]
        controller: {addresses: ['tcp:127.0.0.1:6653'], connection-mode: out-of-band}
",
        )
        .unwrap();

        let bridge = unit(&set, "br0");
        assert!(bridge.contains("Type=oneshot\n"));
        let lines: Vec<&str> = bridge.lines().filter(|l| l.starts_with("ExecStart=")).collect();
        assert_eq!(
            lines,
            [
                "ExecStart=/usr/bin/ovs-vsctl --may-exist add-br br0",
                "ExecStart=/usr/bin/ovs-vsctl --may-exist add-port br0 eth0",
                "ExecStart=/usr/bin/ovs-vsctl --may-exist add-port br0 patch0-1 -- set Interface patch0-1 type=patch options:peer=patch1-0",
                "ExecStart=/usr/bin/ovs-vsctl set-fail-mode br0 secure",
                "ExecStart=/usr/bin/ovs-vsctl set Bridge br0 protocols=OpenFlow10,OpenFlow13",
                "ExecStart=/usr/bin/ovs-vsctl set-controller br0 tcp:127.0.0.1:6653",
                "ExecStart=/usr/bin/ovs-vsctl set Controller br0 connection-mode=out-of-band",
                "ExecStart=/usr/bin/ovs-vsctl set Bridge br0 external-ids:netplan=true",
            ]
        );

        let bond = unit(&set, "bond0");
        assert!(bond.contains("Requires=netplan-ovs-br0.service\nAfter=netplan-ovs-br0.service\n"));
        assert!(bond.contains("ExecStart=/usr/bin/ovs-vsctl --may-exist add-bond br0 bond0 eth1 eth2\n"));
        assert!(bond.contains("set Port bond0 bond_mode=active-backup\n"));
        assert!(bond.contains("set Port bond0 lacp=off\n"));

        // networkd still carries the IP configuration, but creates no netdev
        assert!(set.contains("run/systemd/network/10-netplan-br0.network"));
        assert!(!set.contains("run/systemd/network/10-netplan-br0.netdev"));
    }

    #[test]
    fn vlan_becomes_fake_bridge() {
        let set = render(
            "network:
  version: 2
  bridges: {ovs0: {openvswitch: {}}}
  vlans: {vlan5: {id: 5, link: ovs0, addresses: [10.5.0.1/24]}}
",
        )
        .unwrap();
        assert!(unit(&set, "vlan5").contains("ExecStart=/usr/bin/ovs-vsctl --may-exist add-br vlan5 ovs0 5\n"));
        let parent = set.contents("run/systemd/network/10-netplan-ovs0.network").unwrap();
        assert!(!parent.contains("VLAN="));
    }

    #[test]
    fn unsupported_bond_mode() {
        let err = render(
            "network:
  version: 2
  ethernets: {eth0: {}, eth1: {}}
  bonds:
    bond0: {interfaces: [eth0, eth1], parameters: {mode: balance-rr}, openvswitch: {}}
  bridges: {br0: {interfaces: [bond0], openvswitch: {}}}
",
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.diagnostics()[0].key_path.to_string(),
            "network.bonds.bond0.parameters.mode"
        );
    }

    #[test]
    fn global_settings_unit() {
        let set = render(
            "network:
  version: 2
  openvswitch:
    external-ids: {system-id: host1}
    other-config: {disable-in-band: true}
  bridges: {br0: {openvswitch: {}}}
",
        )
        .unwrap();
        let global = unit(&set, "global");
        assert!(global.contains("set open_vswitch . external-ids:system-id=host1\n"));
        assert!(global.contains("set open_vswitch . other-config:disable-in-band=true\n"));
        let dropin = set
            .contents("run/systemd/system/systemd-networkd.service.d/10-netplan-ovs.conf")
            .unwrap();
        assert!(dropin.contains("Wants=netplan-ovs-br0.service\n"));
        assert!(dropin.contains("Wants=netplan-ovs-global.service\n"));
    }

    #[test]
    fn values_are_shell_escaped() {
        let mut commands = Commands::default();
        commands.run(&["set", "Bridge", "br0", "external-ids:note=two words"]);
        assert_eq!(
            commands.exec_lines().collect::<Vec<_>>(),
            [r#"/usr/bin/ovs-vsctl set Bridge br0 "external-ids:note=two words""#]
        );
    }
}
