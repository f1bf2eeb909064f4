//! systemd-networkd renderer
//!
//! Emits `.network`, `.netdev` and `.link` files under
//! `run/systemd/network`, plus a wpa_supplicant configuration and service
//! unit for wireless and 802.1x-authenticated wired devices.

use crate::model::properties::{
    AccessPoint, AuthConfig, BondParameters, BridgeParameters, CommonProperties, DhcpOverrides,
    PhysicalProperties, TunnelProperties,
};
use crate::model::values::{
    ActivationMode, ApMode, DhcpIdentifier, EapMethod, KeyManagement, LinkLocal, Millis,
    OptionalAddress, RouteType, TunnelMode, WifiBand,
};
use crate::model::{Backend, DeviceKind, NetDefinition};
use crate::render::ini::{IniFile, Section};
use crate::render::{
    ArtifactSet, RenderContext, RenderError, Renderer, Unsupported, escape_unit_component,
    wanted_by_networkd,
};
use core::net::IpAddr;
use tracing::debug;

pub const NETWORK_DIR: &str = "run/systemd/network";
pub const UNIT_DIR: &str = "run/systemd/system";
pub const WPA_DIR: &str = "run/netplan";

/// Renderer for definitions whose backend is networkd
#[derive(Debug, Default)]
pub struct NetworkdRenderer {
    wpa_units: Vec<String>,
}

impl NetworkdRenderer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for NetworkdRenderer {
    fn name(&self) -> &'static str {
        "networkd"
    }

    fn owns(&self, def: &NetDefinition, _ctx: &RenderContext<'_>) -> bool {
        def.backend == Backend::Networkd
    }

    fn render(
        &mut self,
        def: &NetDefinition,
        ctx: &RenderContext<'_>,
        out: &mut ArtifactSet,
    ) -> Result<(), RenderError> {
        check_capabilities(def).finish()?;

        let base = format!("{NETWORK_DIR}/10-netplan-{}", def.id);
        if let Some(link) = link_file(def, ctx) {
            out.insert(format!("{base}.link"), link.render());
        }
        if let Some((netdev, private)) = netdev_file(def, ctx)? {
            if private {
                out.insert_with_mode(format!("{base}.netdev"), netdev.render(), 0o640);
            } else {
                out.insert(format!("{base}.netdev"), netdev.render());
            }
        }
        out.insert(format!("{base}.network"), network_file(def, ctx).render());

        match def.kind {
            DeviceKind::Wifi(ref props) => {
                let networks: Vec<String> = props
                    .access_points()
                    .map(|(ssid, ap)| wpa_network(ssid, &ap))
                    .collect();
                let unit = write_wpa(def, props.regulatory_domain.as_deref(), &networks, false, out)?;
                self.wpa_units.push(unit);
            }
            DeviceKind::Ethernet(ref props) => {
                if let Some(auth) = props.auth.as_ref() {
                    let network = wpa_block(&[], auth);
                    let unit = write_wpa(def, None, &[network], true, out)?;
                    self.wpa_units.push(unit);
                }
            }
            DeviceKind::Modem(_)
            | DeviceKind::Bond(_)
            | DeviceKind::Bridge(_)
            | DeviceKind::Vlan(_)
            | DeviceKind::Vrf(_)
            | DeviceKind::Tunnel(_)
            | DeviceKind::Dummy(_)
            | DeviceKind::Veth(_)
            | DeviceKind::NmDevice(_) => {}
        }
        debug!("Rendered '{}' for networkd", def.id);
        Ok(())
    }

    fn finish(&mut self, _ctx: &RenderContext<'_>, out: &mut ArtifactSet) -> Result<(), RenderError> {
        wanted_by_networkd(out, "wpa", &self.wpa_units);
        Ok(())
    }
}

fn check_capabilities(def: &NetDefinition) -> Unsupported {
    let mut unsupported = Unsupported::default();
    match def.kind {
        DeviceKind::Modem(_) => unsupported.push(
            def,
            "",
            "modems are only supported by NetworkManager".to_owned(),
        ),
        DeviceKind::NmDevice(_) => unsupported.push(
            def,
            "",
            "nm-devices are only supported by NetworkManager".to_owned(),
        ),
        DeviceKind::Tunnel(ref props) if props.mode == TunnelMode::Isatap => unsupported.push(
            def,
            "mode",
            "isatap tunnels are not supported by networkd".to_owned(),
        ),
        DeviceKind::Wifi(ref props) => {
            if def.interface_name().is_none() {
                unsupported.push(
                    def,
                    "match",
                    "networkd needs a fixed interface name to run wpa_supplicant for a wifi device".to_owned(),
                );
            }
            for (ssid, ap) in props.access_points() {
                if ap.mode() == ApMode::Ap {
                    unsupported.push(
                        def,
                        &format!("access-points.{ssid}.mode"),
                        "access point mode is not supported by networkd".to_owned(),
                    );
                }
            }
        }
        DeviceKind::Ethernet(ref props) => {
            if props.infiniband_mode.is_some() {
                unsupported.push(
                    def,
                    "infiniband-mode",
                    "infiniband-mode is only supported by NetworkManager".to_owned(),
                );
            }
            if props.auth.is_some() && def.interface_name().is_none() {
                unsupported.push(
                    def,
                    "auth",
                    "networkd needs a fixed interface name to run wpa_supplicant for 802.1x".to_owned(),
                );
            }
        }
        DeviceKind::Bond(_)
        | DeviceKind::Bridge(_)
        | DeviceKind::Vlan(_)
        | DeviceKind::Vrf(_)
        | DeviceKind::Tunnel(_)
        | DeviceKind::Dummy(_)
        | DeviceKind::Veth(_) => {}
    }
    unsupported
}

/// `[Match]` for a `.network` (`for_link == false`) or `.link` file
fn match_section(file: &mut IniFile, def: &NetDefinition, for_link: bool) {
    let section = file.section("Match");
    let Some(physical) = def.physical() else {
        section.push("Name", def.interface_name().unwrap_or(&def.id));
        return;
    };
    let name_key = if for_link { "OriginalName" } else { "Name" };
    if !for_link && let Some(name) = physical.set_name.as_deref() {
        section.push("Name", name);
        return;
    }
    match physical.match_config.as_ref().filter(|m| !m.is_empty()) {
        None => {
            section.push(name_key, &def.id);
        }
        Some(m) => {
            section.push_opt("MACAddress", m.macaddress.as_deref());
            section.push_opt(name_key, m.name.as_deref());
            if let Some(driver) = m.driver.as_ref() {
                section.push("Driver", driver.patterns().join(" "));
            }
        }
    }
}

fn link_file(def: &NetDefinition, ctx: &RenderContext<'_>) -> Option<IniFile> {
    let physical: &PhysicalProperties = def.physical()?;
    let offloads = physical.offloads();
    let vfs = ctx.model.vf_count(&def.id);
    if physical.set_name.is_none() && physical.wakeonlan.is_none() && offloads.is_empty() && vfs.is_none() {
        return None;
    }

    let mut file = IniFile::new();
    match_section(&mut file, def, true);
    let link = file.section("Link");
    link.push_opt("Name", physical.set_name.as_deref());
    if let Some(wol) = physical.wakeonlan {
        link.push("WakeOnLan", if wol { "magic" } else { "off" });
    }
    for (key, _, value) in offloads {
        link.push(key, value);
    }
    link.push_opt("SR-IOVVirtualFunctions", vfs);
    Some(file)
}

/// Bond and bond-timer spans are always written in milliseconds
fn bond_span(span: Millis) -> String {
    format!("{}ms", span.0)
}

/// Bridge timers keep whole seconds in seconds
fn bridge_span(span: Millis) -> String {
    span.whole_seconds()
        .map_or_else(|| format!("{}ms", span.0), |s| format!("{s}s"))
}

fn netdev_file(def: &NetDefinition, ctx: &RenderContext<'_>) -> Result<Option<(IniFile, bool)>, RenderError> {
    if def.physical().is_some() || ctx.model.is_openvswitch(&def.id) {
        return Ok(None);
    }
    let common = def.common();
    let mut file = IniFile::new();
    let mut private = false;
    let netdev = file.section("NetDev");
    netdev.push("Name", &def.id);

    match def.kind {
        DeviceKind::Bond(ref props) => {
            netdev.push("Kind", "bond");
            netdev.push_opt("MACAddress", common.macaddress.as_deref());
            bond_section(file.section("Bond"), &props.parameters);
        }
        DeviceKind::Bridge(ref props) => {
            netdev.push("Kind", "bridge");
            netdev.push_opt("MACAddress", common.macaddress.as_deref());
            bridge_section(file.section("Bridge"), &props.parameters);
        }
        DeviceKind::Vlan(ref props) => {
            netdev.push("Kind", "vlan");
            netdev.push_opt("MACAddress", common.macaddress.as_deref());
            file.section("VLAN").push("Id", props.id);
        }
        DeviceKind::Vrf(ref props) => {
            netdev.push("Kind", "vrf");
            file.section("VRF").push("Table", props.table);
        }
        DeviceKind::Dummy(_) => {
            netdev.push("Kind", "dummy");
            netdev.push_opt("MACAddress", common.macaddress.as_deref());
        }
        DeviceKind::Veth(ref props) => {
            // the pair is created once, from the side whose ID sorts first
            if props.peer < def.id {
                return Ok(None);
            }
            netdev.push("Kind", "veth");
            netdev.push_opt("MACAddress", common.macaddress.as_deref());
            file.section("Peer").push("Name", &props.peer);
        }
        DeviceKind::Tunnel(ref props) => {
            private = props.mode == TunnelMode::Wireguard;
            tunnel_sections(&mut file, def, props)?;
        }
        DeviceKind::NmDevice(_)
        | DeviceKind::Ethernet(_)
        | DeviceKind::Wifi(_)
        | DeviceKind::Modem(_) => return Ok(None),
    }
    Ok(Some((file, private)))
}

fn bond_section(section: &mut Section, params: &BondParameters) {
    section
        .push_opt("Mode", params.mode)
        .push_opt("LACPTransmitRate", params.lacp_rate)
        .push_opt("MIIMonitorSec", params.mii_monitor_interval.map(bond_span))
        .push_opt("MinLinks", params.min_links)
        .push_opt("TransmitHashPolicy", params.transmit_hash_policy)
        .push_opt("AdSelect", params.ad_select)
        .push_opt("AllSlavesActive", params.all_members_active)
        .push_opt("ARPIntervalSec", params.arp_interval.map(bond_span));
    if !params.arp_ip_targets.is_empty() {
        section.push("ARPIPTargets", params.arp_ip_targets.join(" "));
    }
    section
        .push_opt("ARPValidate", params.arp_validate)
        .push_opt("ARPAllTargets", params.arp_all_targets)
        .push_opt("UpDelaySec", params.up_delay.map(bond_span))
        .push_opt("DownDelaySec", params.down_delay.map(bond_span))
        .push_opt("FailOverMACPolicy", params.fail_over_mac_policy)
        .push_opt("GratuitousARP", params.gratuitous_arp)
        .push_opt("PacketsPerSlave", params.packets_per_member)
        .push_opt("PrimaryReselectPolicy", params.primary_reselect_policy)
        .push_opt("ResendIGMP", params.resend_igmp)
        .push_opt("LearnPacketIntervalSec", params.learn_packet_interval.map(bridge_span));
}

fn bridge_section(section: &mut Section, params: &BridgeParameters) {
    section
        .push_opt("AgeingTimeSec", params.ageing_time.map(bridge_span))
        .push_opt("Priority", params.priority)
        .push_opt("ForwardDelaySec", params.forward_delay.map(bridge_span))
        .push_opt("HelloTimeSec", params.hello_time.map(bridge_span))
        .push_opt("MaxAgeSec", params.max_age.map(bridge_span))
        .push_opt("STP", params.stp);
}

fn tunnel_sections(file: &mut IniFile, def: &NetDefinition, props: &TunnelProperties) -> Result<(), RenderError> {
    let kind = match props.mode {
        TunnelMode::Ipip6 | TunnelMode::Ip6Ip6 => "ip6tnl",
        TunnelMode::Sit
        | TunnelMode::Gre
        | TunnelMode::Ip6Gre
        | TunnelMode::Ipip
        | TunnelMode::Vti
        | TunnelMode::Vti6
        | TunnelMode::Wireguard
        | TunnelMode::GreTap
        | TunnelMode::Ip6GreTap
        | TunnelMode::Vxlan => props.mode.as_str(),
        TunnelMode::Isatap => {
            return Err(RenderError::internal(&def.id, "isatap tunnel reached the networkd renderer"));
        }
    };
    file.unique_section("NetDev")
        .push("Kind", kind)
        .push_opt("MACAddress", def.common().macaddress.as_deref());

    match props.mode {
        TunnelMode::Wireguard => {
            let wireguard = file.section("WireGuard");
            if let Some(key) = props.private_key() {
                let key_name = if key.starts_with('/') { "PrivateKeyFile" } else { "PrivateKey" };
                wireguard.push(key_name, key);
            }
            wireguard
                .push_opt("ListenPort", props.port)
                .push_opt("FirewallMark", props.mark);
            for peer in &props.peers {
                let section = file.section("WireGuardPeer");
                if let Some(keys) = peer.keys.as_ref() {
                    section.push_opt("PublicKey", keys.public.as_deref());
                    if let Some(shared) = keys.shared.as_deref() {
                        let key_name = if shared.starts_with('/') { "PresharedKeyFile" } else { "PresharedKey" };
                        section.push(key_name, shared);
                    }
                }
                if !peer.allowed_ips.is_empty() {
                    section.push("AllowedIPs", peer.allowed_ips.join(","));
                }
                section
                    .push_opt("Endpoint", peer.endpoint.as_deref())
                    .push_opt("PersistentKeepalive", peer.keepalive);
            }
        }
        TunnelMode::Vxlan => {
            let vxlan = file.section("VXLAN");
            vxlan
                .push_opt("VNI", props.id)
                .push_opt("Local", props.local.as_deref())
                .push_opt("Remote", props.remote.as_deref())
                .push_opt("DestinationPort", props.port)
                .push_opt("TTL", props.ttl);
            if props.link.is_none() {
                vxlan.push("Independent", true);
            }
        }
        TunnelMode::Sit
        | TunnelMode::Gre
        | TunnelMode::Ip6Gre
        | TunnelMode::Ipip
        | TunnelMode::Ipip6
        | TunnelMode::Ip6Ip6
        | TunnelMode::Vti
        | TunnelMode::Vti6
        | TunnelMode::GreTap
        | TunnelMode::Ip6GreTap
        | TunnelMode::Isatap => {
            let tunnel = file.section("Tunnel");
            if props.link.is_none() {
                tunnel.push("Independent", true);
            }
            tunnel
                .push_opt("Local", props.local.as_deref())
                .push_opt("Remote", props.remote.as_deref())
                .push_opt("TTL", props.ttl);
            if matches!(props.mode, TunnelMode::Ipip6 | TunnelMode::Ip6Ip6) {
                tunnel.push("Mode", props.mode.as_str());
            }
            match (props.shared_key(), props.input_key(), props.output_key()) {
                (Some(key), _, _) => {
                    tunnel.push("Key", key);
                }
                (None, input, output) => {
                    tunnel.push_opt("InputKey", input).push_opt("OutputKey", output);
                }
            }
        }
    }
    Ok(())
}

fn dhcp_value(common: &CommonProperties) -> Option<&'static str> {
    match (common.dhcp4_enabled(), common.dhcp6_enabled()) {
        (true, true) => Some("yes"),
        (true, false) => Some("ipv4"),
        (false, true) => Some("ipv6"),
        (false, false) => None,
    }
}

fn link_local_value(families: &[LinkLocal]) -> &'static str {
    match (families.contains(&LinkLocal::Ipv4), families.contains(&LinkLocal::Ipv6)) {
        (true, true) => "yes",
        (true, false) => "ipv4",
        (false, true) => "ipv6",
        (false, false) => "no",
    }
}

fn network_file(def: &NetDefinition, ctx: &RenderContext<'_>) -> IniFile {
    let common = def.common();
    let mut file = IniFile::new();
    match_section(&mut file, def, false);

    let owner = ctx.model.owner(&def.id);
    let enslaved = owner.is_some_and(|o| !ctx.model.is_openvswitch(&o.id));

    let link = file.section("Link");
    if def.physical().is_some() {
        link.push_opt("MACAddress", common.macaddress.as_deref());
    }
    link.push_opt("MTUBytes", common.mtu);
    if common.optional == Some(true) {
        link.push("RequiredForOnline", "no");
    } else if let Some(family) = required_family(&common.optional_addresses) {
        link.push("RequiredFamilyForOnline", family);
    }
    if let Some(mode) = common.activation_mode {
        link.push(
            "ActivationPolicy",
            match mode {
                ActivationMode::Manual => "manual",
                ActivationMode::Off => "down",
            },
        );
    }

    let network = file.section("Network");
    network.push_opt("DHCP", dhcp_value(common));
    if enslaved {
        network.push("LinkLocalAddressing", "no");
    } else if let Some(families) = common.link_local.as_deref() {
        network.push("LinkLocalAddressing", link_local_value(families));
    }
    for entry in common.addresses.iter().filter(|e| e.options().is_none()) {
        network.push("Address", entry.address());
    }
    network
        .push_opt("Gateway", common.gateway4.as_deref())
        .push_opt("Gateway", common.gateway6.as_deref());
    if let Some(nameservers) = common.nameservers.as_ref() {
        for server in &nameservers.addresses {
            network.push("DNS", server);
        }
        if !nameservers.search.is_empty() {
            network.push("Domains", nameservers.search.join(" "));
        }
    }
    network
        .push_opt("IPv6AcceptRA", common.accept_ra)
        .push_opt("IPv6PrivacyExtensions", common.ipv6_privacy)
        .push_opt("IPv6LinkLocalAddressGenerationMode", common.ipv6_address_generation)
        .push_opt("IPv6MTUBytes", common.ipv6_mtu);
    if common.ignore_carrier == Some(true) {
        network.push("ConfigureWithoutCarrier", true);
    }
    if common.critical == Some(true) {
        network.push("KeepConfiguration", true);
    }
    if let DeviceKind::Ethernet(ref props) = def.kind {
        network.push_opt("EmitLLDP", props.emit_lldp);
    }
    if let Some(owner) = owner.filter(|_| enslaved) {
        let key = if matches!(owner.kind, DeviceKind::Bond(_)) { "Bond" } else { "Bridge" };
        network.push(key, &owner.id);
        if let DeviceKind::Bond(ref bond) = owner.kind
            && bond.parameters.primary.as_deref() == Some(def.id.as_str())
        {
            network.push("PrimarySlave", true);
        }
    }
    if let Some(vrf) = ctx.model.vrf(&def.id) {
        network.push("VRF", &vrf.id);
    }
    for child in ctx.model.children(&def.id) {
        if ctx.model.is_openvswitch(&child.id) {
            continue;
        }
        match child.kind {
            DeviceKind::Vlan(_) => {
                network.push("VLAN", &child.id);
            }
            DeviceKind::Tunnel(ref tunnel) if tunnel.mode == TunnelMode::Vxlan => {
                network.push("VXLAN", &child.id);
            }
            DeviceKind::Tunnel(_) => {
                network.push("Tunnel", &child.id);
            }
            DeviceKind::Ethernet(_)
            | DeviceKind::Wifi(_)
            | DeviceKind::Modem(_)
            | DeviceKind::Bond(_)
            | DeviceKind::Bridge(_)
            | DeviceKind::Vrf(_)
            | DeviceKind::Dummy(_)
            | DeviceKind::Veth(_)
            | DeviceKind::NmDevice(_) => {}
        }
    }

    if let Some(token) = common.ipv6_address_token.as_deref() {
        file.section("IPv6AcceptRA").push("Token", format!("static:{token}"));
    }

    for entry in &common.addresses {
        let Some(options) = entry.options() else {
            continue;
        };
        file.section("Address")
            .push("Address", entry.address())
            .push_opt("PreferredLifetime", options.lifetime.as_ref().map(|l| l.as_str().to_owned()))
            .push_opt("Label", options.label.as_deref());
    }

    let vrf_table = match def.kind {
        DeviceKind::Vrf(ref vrf) => Some(vrf.table),
        _ => None,
    };
    for route in &common.routes {
        let section = file.section("Route");
        section.push("Destination", destination(&route.to, route.via.as_deref()));
        section.push_opt("Gateway", route.via.as_deref());
        if route.on_link == Some(true) {
            section.push("GatewayOnLink", true);
        }
        section.push_opt("PreferredSource", route.from.as_deref());
        section.push_opt("Metric", route.metric);
        if route.kind() != RouteType::Unicast {
            section.push("Type", route.kind());
        }
        section
            .push_opt("Scope", route.scope)
            .push_opt("Table", route.table.or(vrf_table))
            .push_opt("MTUBytes", route.mtu)
            .push_opt("InitialCongestionWindow", route.congestion_window)
            .push_opt("InitialAdvertisedReceiveWindow", route.advertised_receive_window);
    }
    for rule in &common.routing_policy {
        file.section("RoutingPolicyRule")
            .push_opt("From", rule.from.as_deref())
            .push_opt("To", rule.to.as_deref())
            .push_opt("Table", rule.table.or(vrf_table))
            .push_opt("Priority", rule.priority)
            .push_opt("FirewallMark", rule.mark)
            .push_opt("TypeOfService", rule.type_of_service);
    }

    if common.dhcp4_enabled() {
        let section = file.section("DHCPv4");
        if common.dhcp_identifier == Some(DhcpIdentifier::Mac) {
            section.push("ClientIdentifier", "mac");
        }
        if let Some(overrides) = common.dhcp4_overrides.as_ref() {
            dhcp_overrides(section, overrides, true);
        }
    }
    if common.dhcp6_enabled()
        && let Some(overrides) = common.dhcp6_overrides.as_ref()
    {
        dhcp_overrides(file.section("DHCPv6"), overrides, false);
        // DHCPv6 carries no routes; gateway, prefix routes and MTU come from RAs
        file.unique_section("IPv6AcceptRA")
            .push_opt("UseMTU", overrides.use_mtu)
            .push_opt("UseGateway", overrides.use_routes)
            .push_opt("UseRoutePrefix", overrides.use_routes)
            .push_opt("RouteMetric", overrides.route_metric);
    }

    if let Some(owner) = owner.filter(|_| enslaved)
        && let DeviceKind::Bridge(ref bridge) = owner.kind
    {
        file.section("Bridge")
            .push_opt("Priority", bridge.parameters.port_priority.get(&def.id))
            .push_opt("Cost", bridge.parameters.path_cost.get(&def.id));
    }

    file
}

fn required_family(optional: &[OptionalAddress]) -> Option<&'static str> {
    let v4 = optional
        .iter()
        .any(|a| matches!(a, OptionalAddress::Ipv4LinkLocal | OptionalAddress::Dhcp4 | OptionalAddress::Static));
    let v6 = optional
        .iter()
        .any(|a| matches!(a, OptionalAddress::Ipv6Ra | OptionalAddress::Dhcp6));
    match (v4, v6) {
        (true, true) => Some("any"),
        (true, false) => Some("ipv6"),
        (false, true) => Some("ipv4"),
        (false, false) => None,
    }
}

/// Destination of a route, spelling out the default route of its family
fn destination(to: &str, via: Option<&str>) -> String {
    if to != "default" {
        return to.to_owned();
    }
    let ipv6 = via.and_then(|v| v.parse::<IpAddr>().ok()).is_some_and(|v| v.is_ipv6());
    if ipv6 { "::/0".to_owned() } else { "0.0.0.0/0".to_owned() }
}

fn dhcp_overrides(section: &mut Section, overrides: &DhcpOverrides, ipv4: bool) {
    section
        .push_opt("UseDNS", overrides.use_dns)
        .push_opt("UseNTP", overrides.use_ntp)
        .push_opt("SendHostname", overrides.send_hostname)
        .push_opt("UseHostname", overrides.use_hostname)
        .push_opt("UseDomains", overrides.use_domains.map(|d| d.as_networkd()))
        .push_opt("Hostname", overrides.hostname.as_deref());
    if ipv4 {
        section
            .push_opt("UseMTU", overrides.use_mtu)
            .push_opt("UseRoutes", overrides.use_routes)
            .push_opt("RouteMetric", overrides.route_metric);
    }
}

fn write_wpa(
    def: &NetDefinition,
    country: Option<&str>,
    networks: &[String],
    wired: bool,
    out: &mut ArtifactSet,
) -> Result<String, RenderError> {
    let interface = def
        .interface_name()
        .ok_or_else(|| RenderError::internal(&def.id, "wpa_supplicant needs an interface name"))?;

    let mut conf = String::from("ctrl_interface=/run/wpa_supplicant\n");
    if let Some(country) = country {
        conf.push_str(&format!("country={country}\n"));
    }
    for network in networks {
        conf.push('\n');
        conf.push_str(network);
    }
    let conf_path = format!("{WPA_DIR}/wpa-{}.conf", def.id);

    let device = format!("sys-subsystem-net-devices-{}.device", escape_unit_component(interface));
    let mut unit = IniFile::new();
    unit.section("Unit")
        .push("Description", format!("WPA supplicant for netplan {}", def.id))
        .push("DefaultDependencies", "no")
        .push("Requires", &device)
        .push("After", &device)
        .push("Before", "network.target")
        .push("Wants", "network.target");
    let driver = if wired { " -Dwired" } else { "" };
    unit.section("Service")
        .push("Type", "simple")
        .push(
            "ExecStart",
            format!("/sbin/wpa_supplicant -c /{conf_path} -i{interface}{driver}"),
        );

    let name = format!("netplan-wpa-{}.service", def.id);
    out.insert_private(conf_path, conf);
    out.insert(format!("{UNIT_DIR}/{name}"), unit.render());
    Ok(name)
}

/// Quoted wpa_supplicant string, or hex when it cannot be quoted
fn wpa_string(text: &str) -> String {
    if text.chars().all(|c| (c.is_ascii_graphic() && c != '"') || c == ' ') {
        format!("\"{text}\"")
    } else {
        text.bytes().map(|b| format!("{b:02x}")).collect()
    }
}

fn frequency(band: WifiBand, channel: u32) -> u32 {
    match band {
        WifiBand::TwoPointFourGhz if channel == 14 => 2484,
        WifiBand::TwoPointFourGhz => 2407 + 5 * channel,
        WifiBand::FiveGhz => 5000 + 5 * channel,
    }
}

fn wpa_network(ssid: &str, ap: &AccessPoint) -> String {
    let mut lines = vec![format!("ssid={}", wpa_string(ssid))];
    if ap.hidden == Some(true) {
        lines.push("scan_ssid=1".to_owned());
    }
    if let Some(bssid) = ap.bssid.as_deref() {
        lines.push(format!("bssid={bssid}"));
    }
    if ap.mode() == ApMode::Adhoc {
        lines.push("mode=1".to_owned());
    }
    if let (Some(band), Some(channel)) = (ap.band, ap.channel) {
        lines.push(format!("frequency={}", frequency(band, channel)));
    }
    match ap.effective_auth() {
        Some(auth) => wpa_block(&lines, &auth),
        None => {
            lines.push("key_mgmt=NONE".to_owned());
            wrap_network(&lines)
        }
    }
}

fn wpa_block(head: &[String], auth: &AuthConfig) -> String {
    let mut lines = head.to_vec();
    let key_mgmt = match auth.effective_key_management() {
        KeyManagement::None => "NONE",
        KeyManagement::Psk => "WPA-PSK",
        KeyManagement::Sae => "SAE",
        KeyManagement::Eap => "WPA-EAP",
        KeyManagement::EapSha256 => "WPA-EAP-SHA256",
        KeyManagement::EapSuiteB192 => "WPA-EAP-SUITE-B-192",
        KeyManagement::Ieee8021x => "IEEE8021X",
    };
    lines.push(format!("key_mgmt={key_mgmt}"));

    let password = auth.password.as_ref().map(|p| p.as_str());
    match auth.effective_key_management() {
        KeyManagement::Psk => {
            if let Some(password) = password {
                if password.len() == 64 && password.chars().all(|c| c.is_ascii_hexdigit()) {
                    lines.push(format!("psk={password}"));
                } else {
                    lines.push(format!("psk={}", wpa_string(password)));
                }
            }
        }
        KeyManagement::Sae => {
            lines.push("ieee80211w=2".to_owned());
            if let Some(password) = password {
                lines.push(format!("sae_password={}", wpa_string(password)));
            }
        }
        KeyManagement::Eap
        | KeyManagement::EapSha256
        | KeyManagement::EapSuiteB192
        | KeyManagement::Ieee8021x => {
            if let Some(method) = auth.method {
                let eap = match method {
                    EapMethod::Tls => "TLS",
                    EapMethod::Peap => "PEAP",
                    EapMethod::Ttls => "TTLS",
                    EapMethod::Leap => "LEAP",
                    EapMethod::Pwd => "PWD",
                };
                lines.push(format!("eap={eap}"));
            }
            let quoted = [
                ("identity", auth.identity.as_deref()),
                ("anonymous_identity", auth.anonymous_identity.as_deref()),
                ("password", password),
                ("ca_cert", auth.ca_certificate.as_deref()),
                ("client_cert", auth.client_certificate.as_deref()),
                ("private_key", auth.client_key.as_deref()),
                (
                    "private_key_passwd",
                    auth.client_key_password.as_ref().map(|p| p.as_str()),
                ),
            ];
            for (key, value) in quoted {
                if let Some(value) = value {
                    lines.push(format!("{key}={}", wpa_string(value)));
                }
            }
            if let Some(phase2) = auth.phase2_auth.as_deref() {
                lines.push(format!("phase2=\"auth={phase2}\""));
            }
        }
        KeyManagement::None => {}
    }
    wrap_network(&lines)
}

fn wrap_network(lines: &[String]) -> String {
    let mut block = String::from("network={\n");
    for line in lines {
        block.push_str("  ");
        block.push_str(line);
        block.push('\n');
    }
    block.push_str("}\n");
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileContext;
    use crate::error::CompileError;
    use crate::render::render_text;

    fn render(text: &str) -> ArtifactSet {
        render_text(text, &CompileContext::default()).unwrap()
    }

    fn file<'a>(set: &'a ArtifactSet, name: &str) -> &'a str {
        set.contents(format!("{NETWORK_DIR}/{name}"))
            .unwrap_or_else(|| panic!("{name} missing; have {:?}", set.paths().collect::<Vec<_>>()))
    }

    #[test]
    fn dhcp4_ethernet() {
        let set = render("network: {version: 2, ethernets: {eth0: {dhcp4: true}}}");
        assert_eq!(
            file(&set, "10-netplan-eth0.network"),
            "[Match]\nName=eth0\n\n[Network]\nDHCP=ipv4\n"
        );
        assert!(!set.contains(format!("{NETWORK_DIR}/10-netplan-eth0.link")));
    }

    #[test]
    fn bond_timers_in_milliseconds() {
        let set = render(
            "network:
  version: 2
  ethernets: {eth0: {}, eth1: {}}
  bonds:
    bond0:
      interfaces: [eth0, eth1]
      parameters: {mode: active-backup, mii-monitor-interval: 100, up-delay: 2s, primary: eth0}
",
        );
        let netdev = file(&set, "10-netplan-bond0.netdev");
        assert!(netdev.contains("Kind=bond\n"));
        assert!(netdev.contains("Mode=active-backup\nMIIMonitorSec=100ms\n"));
        assert!(netdev.contains("UpDelaySec=2000ms\n"));

        let member = file(&set, "10-netplan-eth0.network");
        assert!(member.contains("LinkLocalAddressing=no\n"));
        assert!(member.contains("Bond=bond0\nPrimarySlave=true\n"));
        assert!(!file(&set, "10-netplan-eth1.network").contains("PrimarySlave"));
    }

    #[test]
    fn bridge_timers_keep_units() {
        let set = render(
            "network:
  version: 2
  ethernets: {eth0: {}}
  bridges:
    br0:
      interfaces: [eth0]
      parameters: {forward-delay: 15, hello-time: 500ms, stp: false, path-cost: {eth0: 50}}
",
        );
        let netdev = file(&set, "10-netplan-br0.netdev");
        assert!(netdev.contains("ForwardDelaySec=15s\n"));
        assert!(netdev.contains("HelloTimeSec=500ms\n"));
        assert!(netdev.contains("STP=false\n"));
        assert!(file(&set, "10-netplan-eth0.network").ends_with("[Bridge]\nCost=50\n"));
    }

    #[test]
    fn vlan_on_parent() {
        let set = render(
            "network:
  version: 2
  ethernets: {eth0: {}}
  vlans:
    vlan10: {id: 10, link: eth0, addresses: [192.168.10.2/24]}
",
        );
        assert!(file(&set, "10-netplan-eth0.network").contains("VLAN=vlan10\n"));
        assert!(file(&set, "10-netplan-vlan10.netdev").contains("[VLAN]\nId=10\n"));
        assert!(file(&set, "10-netplan-vlan10.network").contains("Address=192.168.10.2/24\n"));
    }

    #[test]
    fn routes_and_rules() {
        let set = render(
            "network:
  version: 2
  ethernets:
    eth0:
      addresses: [10.0.0.2/24]
      routes:
        - {to: default, via: 10.0.0.1, metric: 100}
        - {to: 192.168.0.0/16, type: blackhole}
      routing-policy:
        - {from: 10.0.0.0/24, table: 100, priority: 10}
",
        );
        let network = file(&set, "10-netplan-eth0.network");
        assert!(network.contains("[Route]\nDestination=0.0.0.0/0\nGateway=10.0.0.1\nMetric=100\n"));
        assert!(network.contains("[Route]\nDestination=192.168.0.0/16\nType=blackhole\n"));
        assert!(network.contains("[RoutingPolicyRule]\nFrom=10.0.0.0/24\nTable=100\nPriority=10\n"));
    }

    #[test]
    fn renamed_device_gets_link_file() {
        let set = render(
            "network:
  version: 2
  ethernets:
    lan:
      match: {macaddress: '00:11:22:33:44:55'}
      set-name: lan0
      wakeonlan: true
",
        );
        assert_eq!(
            file(&set, "10-netplan-lan.link"),
            "[Match]\nMACAddress=00:11:22:33:44:55\n\n[Link]\nName=lan0\nWakeOnLan=magic\n"
        );
        assert!(file(&set, "10-netplan-lan.network").starts_with("[Match]\nName=lan0\n"));
    }

    #[test]
    fn wifi_uses_wpa_supplicant() {
        let set = render(
            "network:
  version: 2
  wifis:
    wlan0:
      dhcp4: true
      access-points:
        home: {password: correct-horse}
",
        );
        let conf = set.get("run/netplan/wpa-wlan0.conf").unwrap();
        assert_eq!(conf.mode, 0o600);
        assert!(conf.contents.contains("  ssid=\"home\"\n  key_mgmt=WPA-PSK\n  psk=\"correct-horse\"\n"));
        let unit = set
            .contents("run/systemd/system/netplan-wpa-wlan0.service")
            .unwrap();
        assert!(unit.contains("ExecStart=/sbin/wpa_supplicant -c /run/netplan/wpa-wlan0.conf -iwlan0\n"));
        assert_eq!(
            set.contents("run/systemd/system/systemd-networkd.service.d/10-netplan-wpa.conf"),
            Some("[Unit]\nWants=netplan-wpa-wlan0.service\n")
        );
    }

    #[test]
    fn backend_exclusive_properties_are_rejected() {
        let err = render_text(
            "network:
  version: 2
  modems: {cdc0: {}}
  wifis:
    wlan0:
      access-points: {hotspot: {mode: ap}}
",
            &CompileContext::default(),
        )
        .unwrap_err();
        let CompileError::Unsupported { diagnostics } = err else {
            panic!("expected a capability error, got {err:?}");
        };
        let paths: Vec<String> = diagnostics.iter().map(|d| d.key_path.to_string()).collect();
        assert_eq!(
            paths,
            ["network.modems.cdc0", "network.wifis.wlan0.access-points.hotspot.mode"]
        );
    }

    #[test]
    fn networkmanager_settings_are_skipped() {
        let set = render(
            "network:
  version: 2
  ethernets:
    eth0: {dhcp4: true, networkmanager: {name: office, passthrough: {ethernet.mtu: '9000'}}}
",
        );
        assert!(!file(&set, "10-netplan-eth0.network").contains("9000"));
    }

    #[test]
    fn veth_pair_is_created_once() {
        let set = render(
            "network:
  version: 2
  virtual-ethernets:
    veth0: {peer: veth1}
    veth1: {peer: veth0}
",
        );
        assert!(set.contains(format!("{NETWORK_DIR}/10-netplan-veth0.netdev")));
        assert!(!set.contains(format!("{NETWORK_DIR}/10-netplan-veth1.netdev")));
        assert!(file(&set, "10-netplan-veth0.netdev").contains("[Peer]\nName=veth1\n"));
    }

    #[test]
    fn wireguard_netdev_is_private() {
        let set = render(
            "network:
  version: 2
  tunnels:
    wg0:
      mode: wireguard
      key: /etc/wireguard/private.key
      port: 51820
      peers:
        - keys: {public: cHVibGlj}
          allowed-ips: [0.0.0.0/0]
          endpoint: 203.0.113.1:51820
",
        );
        let netdev = set.get(format!("{NETWORK_DIR}/10-netplan-wg0.netdev")).unwrap();
        assert_eq!(netdev.mode, 0o640);
        assert!(netdev.contents.contains("[WireGuard]\nPrivateKeyFile=/etc/wireguard/private.key\nListenPort=51820\n"));
        assert!(netdev.contents.contains("[WireGuardPeer]\nPublicKey=cHVibGlj\nAllowedIPs=0.0.0.0/0\nEndpoint=203.0.113.1:51820\n"));
    }
}
