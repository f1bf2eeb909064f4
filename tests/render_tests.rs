//! Backend selection, capability and feature gating tests

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "This is a test module")]
mod tests {

use netplanc::config::{CompileContext, RawSource};
use netplanc::error::{CompileError, DiagnosticKind};
use netplanc::features::{FeatureSet, Version};
use netplanc::operations::compile_documents;
use netplanc::render::ArtifactSet;

fn compile_with(text: &str, ctx: &CompileContext) -> Result<ArtifactSet, CompileError> {
    compile_documents(&[RawSource::new("/etc/netplan/50-test.yaml", text)], ctx)
        .map(|compilation| compilation.artifacts)
}

fn compile(text: &str) -> Result<ArtifactSet, CompileError> {
    compile_with(text, &CompileContext::default())
}

fn capability_paths(err: &CompileError) -> Vec<String> {
    let CompileError::Unsupported { diagnostics } = err else {
        panic!("expected a capability error, got {err:?}");
    };
    assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::Capability));
    diagnostics.iter().map(|d| d.key_path.to_string()).collect()
}

#[test]
fn mii_monitor_interval_in_each_backend_unit() {
    let bond = |renderer: &str| {
        format!(
            "network:
  version: 2
  renderer: {renderer}
  ethernets: {{eth0: {{}}, eth1: {{}}}}
  bonds:
    bond0: {{interfaces: [eth0, eth1], parameters: {{mode: active-backup, mii-monitor-interval: 2s}}}}
"
        )
    };
    let networkd = compile(&bond("networkd")).unwrap();
    let netdev = networkd
        .contents("run/systemd/network/10-netplan-bond0.netdev")
        .unwrap();
    assert!(netdev.contains("MIIMonitorSec=2000ms\n"), "{netdev}");

    let nm = compile(&bond("NetworkManager")).unwrap();
    let keyfile = nm
        .contents("run/NetworkManager/system-connections/netplan-bond0.nmconnection")
        .unwrap();
    assert!(keyfile.contains("miimon=2000\n"), "{keyfile}");
}

#[test]
fn renderer_is_inherited_from_the_section() {
    let set = compile(
        "network:
  version: 2
  ethernets:
    renderer: NetworkManager
    eth0: {dhcp4: true}
    eth1: {dhcp4: true, renderer: networkd}
",
    )
    .unwrap();
    assert!(set.contains("run/NetworkManager/system-connections/netplan-eth0.nmconnection"));
    assert!(!set.contains("run/systemd/network/10-netplan-eth0.network"));
    assert!(set.contains("run/systemd/network/10-netplan-eth1.network"));
}

// Properties of the other backend are dropped without complaint.
#[test]
fn backend_exclusive_properties_are_skipped() {
    let set = compile(
        "network:
  version: 2
  ethernets:
    eth0:
      dhcp4: true
      optional: true
      critical: true
      networkmanager: {passthrough: {ethernet.wake-on-lan: '0'}}
    eth1:
      renderer: NetworkManager
      dhcp4: true
      optional: true
      critical: true
      ignore-carrier: true
",
    )
    .unwrap();
    let network = set.contents("run/systemd/network/10-netplan-eth0.network").unwrap();
    assert!(!network.contains("wake-on-lan"));
    let keyfile = set
        .contents("run/NetworkManager/system-connections/netplan-eth1.nmconnection")
        .unwrap();
    assert!(!keyfile.contains("critical"));
    assert!(!keyfile.contains("carrier"));
}

// Properties the selected backend cannot express are rejected.
#[test]
fn inexpressible_properties_are_rejected() {
    let err = compile(
        "network:
  version: 2
  modems: {wwan0: {apn: internet}}
",
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert_eq!(capability_paths(&err), ["network.modems.wwan0"]);

    let err = compile(
        "network:
  version: 2
  renderer: NetworkManager
  ethernets:
    eth0:
      addresses: [10.0.0.2/24]
      routes: [{to: 10.9.0.0/16, via: 10.0.0.1, scope: host}]
",
    )
    .unwrap_err();
    assert_eq!(capability_paths(&err), ["network.ethernets.eth0.routes.0.scope"]);
}

#[test]
fn on_link_routes_need_recent_networkmanager() {
    let yaml = "network:
  version: 2
  renderer: NetworkManager
  ethernets:
    eth0:
      addresses: [10.0.0.2/24]
      routes: [{to: default, via: 10.9.9.1, on-link: true}]
";
    let old = CompileContext::default().with_nm_version(Version::new(1, 16, 0));
    let err = compile_with(yaml, &old).unwrap_err();
    let CompileError::Unsupported { diagnostics } = &err else {
        panic!("expected a capability error, got {err:?}");
    };
    assert!(diagnostics[0].message.contains("1.18.0"), "{}", diagnostics[0]);
    assert_eq!(diagnostics[0].file.as_deref(), Some(std::path::Path::new("/etc/netplan/50-test.yaml")));

    compile(yaml).unwrap();
}

#[test]
fn nm_device_passthrough() {
    let set = compile(
        "network:
  version: 2
  nm-devices:
    vpn0:
      renderer: NetworkManager
      networkmanager:
        uuid: 9b1f0e5a-0d3c-4a59-9d7b-5c1f3a2e8f11
        name: office
        passthrough:
          connection.type: vpn
          vpn.service-type: org.freedesktop.NetworkManager.openvpn
",
    )
    .unwrap();
    let keyfile = set
        .contents("run/NetworkManager/system-connections/netplan-vpn0.nmconnection")
        .unwrap();
    assert!(keyfile.contains("uuid=9b1f0e5a-0d3c-4a59-9d7b-5c1f3a2e8f11\n"));
    assert!(keyfile.contains("type=vpn\n"));
    assert!(keyfile.contains("[vpn]\nservice-type=org.freedesktop.NetworkManager.openvpn\n"));
}

#[test]
fn disabled_feature_rejects_its_properties() {
    let ctx = CompileContext::new(FeatureSet::compiled().without("vrf"));
    let err = compile_with(
        "network:
  version: 2
  vrfs: {vrf0: {table: 10}}
",
        &ctx,
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.diagnostics()[0].message.contains("requires feature 'vrf'"));

    compile("network:\n  version: 2\n  vrfs: {vrf0: {table: 10}}\n").unwrap();
}

#[cfg(feature = "openvswitch")]
#[test]
fn openvswitch_devices_get_units() {
    let set = compile(
        "network:
  version: 2
  ethernets: {eth0: {}}
  bridges:
    ovs0: {interfaces: [eth0], openvswitch: {}}
  vlans:
    vlan7: {id: 7, link: ovs0}
",
    )
    .unwrap();
    let bridge = set.contents("run/systemd/system/netplan-ovs-ovs0.service").unwrap();
    assert!(bridge.contains("ExecStart=/usr/bin/ovs-vsctl --may-exist add-port ovs0 eth0\n"));
    let vlan = set.contents("run/systemd/system/netplan-ovs-vlan7.service").unwrap();
    assert!(vlan.contains("Requires=netplan-ovs-ovs0.service\n"));
    assert!(!set.contains("run/systemd/network/10-netplan-vlan7.netdev"));
}

#[cfg(feature = "sriov")]
#[test]
fn sriov_virtual_functions() {
    let set = compile(
        "network:
  version: 2
  ethernets:
    enp3s0:
      embedded-switch-mode: switchdev
      delay-virtual-functions-rebind: true
    vf1: {link: enp3s0}
    vf2: {link: enp3s0}
",
    )
    .unwrap();
    let link = set.contents("run/systemd/network/10-netplan-enp3s0.link").unwrap();
    assert!(link.contains("SR-IOVVirtualFunctions=2\n"), "{link}");
    let unit = set
        .contents("run/systemd/system/netplan-sriov-rebind.service")
        .unwrap();
    assert!(unit.contains("ExecStart=/usr/sbin/netplan rebind enp3s0\n"));
}

}
