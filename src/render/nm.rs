//! NetworkManager keyfile renderer
//!
//! One `.nmconnection` keyfile per definition (per access point for wifis)
//! under `run/NetworkManager/system-connections`, plus a `conf.d` snippet
//! telling NetworkManager to leave networkd's devices alone.
//!
//! Keyfiles may carry secrets and are written with mode 0600. Connection
//! UUIDs are stable: either `networkmanager.uuid` or a name-based UUIDv5.

use crate::features::NmCapability;
use crate::model::properties::{
    AccessPoint, AuthConfig, BondParameters, BridgeParameters, CommonProperties, NmSettings,
    TunnelProperties,
};
use crate::model::values::{
    AddressGeneration, ApMode, Cidr, DhcpIdentifier, EapMethod, EswitchMode, KeyManagement,
    LinkLocal, Millis, RouteScope, RouteType, TunnelMode, WifiBand, parse_cidr, parse_destination,
};
use crate::model::{Backend, DeviceKind, NetDefinition};
use crate::render::ini::{IniFile, Section, keyfile_list};
use crate::render::{
    ArtifactSet, RenderContext, RenderError, Renderer, Unsupported, escape_file_component,
};
use core::net::IpAddr;
use tracing::debug;
use uuid::Uuid;

pub const CONNECTION_DIR: &str = "run/NetworkManager/system-connections";
pub const CONF_PATH: &str = "run/NetworkManager/conf.d/netplan.conf";

/// Namespace of the name-based connection UUIDs
const UUID_NAMESPACE: Uuid = Uuid::from_u128(0x6e65_7470_6c61_6e63_8000_0000_0000_0001);

/// Route types NetworkManager can express
const ROUTE_TYPES: [RouteType; 6] = [
    RouteType::Unicast,
    RouteType::Local,
    RouteType::Blackhole,
    RouteType::Unreachable,
    RouteType::Prohibit,
    RouteType::Throw,
];

/// Renderer for definitions whose backend is NetworkManager
#[derive(Debug, Default)]
pub struct NmRenderer;

impl NmRenderer {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Renderer for NmRenderer {
    fn name(&self) -> &'static str {
        "NetworkManager"
    }

    fn owns(&self, def: &NetDefinition, _ctx: &RenderContext<'_>) -> bool {
        def.backend == Backend::NetworkManager
    }

    fn render(
        &mut self,
        def: &NetDefinition,
        ctx: &RenderContext<'_>,
        out: &mut ArtifactSet,
    ) -> Result<(), RenderError> {
        check_capabilities(def, ctx).finish()?;

        if let DeviceKind::Wifi(ref props) = def.kind {
            for (ssid, ap) in props.access_points() {
                let nm = ap.networkmanager.as_ref().or(def.common().networkmanager.as_ref());
                let name = ap
                    .networkmanager
                    .as_ref()
                    .and_then(|nm| nm.name.clone())
                    .unwrap_or_else(|| format!("netplan-{}-{ssid}", def.id));
                let mut file = Keyfile::new(def, ctx, &name, nm.and_then(|nm| nm.uuid.as_deref()));
                file.device(def, ctx)?;
                wifi_section(&mut file.ini, def, ssid, &ap, props.wakeonwlan.as_slice());
                if let Some(auth) = ap.effective_auth() {
                    security_sections(&mut file.ini, &auth, true);
                }
                file.ip(def, ctx);
                file.passthrough(def, def.common().networkmanager.as_ref())?;
                file.passthrough(def, ap.networkmanager.as_ref())?;
                out.insert_private(
                    format!(
                        "{CONNECTION_DIR}/netplan-{}-{}.nmconnection",
                        def.id,
                        escape_file_component(ssid)
                    ),
                    file.ini.render(),
                );
            }
            return Ok(());
        }

        let nm = def.common().networkmanager.as_ref();
        let name = connection_name(def);
        let mut file = Keyfile::new(def, ctx, &name, nm.and_then(|nm| nm.uuid.as_deref()));
        file.device(def, ctx)?;
        file.ip(def, ctx);
        file.passthrough(def, nm)?;
        out.insert_private(
            format!("{CONNECTION_DIR}/netplan-{}.nmconnection", def.id),
            file.ini.render(),
        );
        debug!("Rendered '{}' for NetworkManager as '{}'", def.id, name);
        Ok(())
    }

    fn finish(&mut self, ctx: &RenderContext<'_>, out: &mut ArtifactSet) -> Result<(), RenderError> {
        let unmanaged: Vec<String> = ctx
            .model
            .rendered_by(Backend::Networkd)
            .flat_map(unmanaged_specs)
            .collect();
        if unmanaged.is_empty() {
            return Ok(());
        }
        let mut conf = IniFile::new();
        conf.section("keyfile")
            .push("unmanaged-devices+", unmanaged.join(","));
        out.insert(CONF_PATH, conf.render());
        Ok(())
    }
}

/// Connection name of a non-wifi definition
fn connection_name(def: &NetDefinition) -> String {
    def.common()
        .networkmanager
        .as_ref()
        .and_then(|nm| nm.name.clone())
        .unwrap_or_else(|| format!("netplan-{}", def.id))
}

/// The configured UUID, or one derived from the connection name
#[must_use]
pub fn connection_uuid(name: &str, configured: Option<&str>) -> String {
    configured.map_or_else(
        || Uuid::new_v5(&UUID_NAMESPACE, name.as_bytes()).to_string(),
        str::to_owned,
    )
}

/// Device specs NetworkManager must not manage for a networkd definition
fn unmanaged_specs(def: &NetDefinition) -> Vec<String> {
    if let Some(name) = def.interface_name() {
        return vec![format!("interface-name:{name}")];
    }
    let Some(m) = def.physical().and_then(|p| p.match_config.as_ref()) else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    if let Some(mac) = m.macaddress.as_deref() {
        specs.push(format!("mac:{mac}"));
    } else if let Some(name) = m.name.as_deref() {
        specs.push(format!("interface-name:{name}"));
    } else if let Some(driver) = m.driver.as_ref() {
        specs.extend(driver.patterns().into_iter().map(|d| format!("driver:{d}")));
    }
    specs
}

fn requires(
    unsupported: &mut Unsupported,
    def: &NetDefinition,
    ctx: &RenderContext<'_>,
    property: &str,
    capability: NmCapability,
) {
    let minimum = capability.minimum_version();
    if ctx.compile.nm_version < minimum {
        unsupported.push(
            def,
            property,
            format!(
                "{} require NetworkManager {minimum} (targeting {})",
                capability.label(),
                ctx.compile.nm_version
            ),
        );
    }
}

fn check_capabilities(def: &NetDefinition, ctx: &RenderContext<'_>) -> Unsupported {
    let mut unsupported = Unsupported::default();
    let common = def.common();

    for (index, route) in common.routes.iter().enumerate() {
        if route.on_link == Some(true) {
            requires(
                &mut unsupported,
                def,
                ctx,
                &format!("routes.{index}.on-link"),
                NmCapability::OnLinkRoutes,
            );
        }
        if !ROUTE_TYPES.contains(&route.kind()) {
            unsupported.push(
                def,
                &format!("routes.{index}.type"),
                format!("route type '{}' is not supported by NetworkManager", route.kind()),
            );
        }
        if matches!(route.scope, Some(RouteScope::Link | RouteScope::Host)) {
            unsupported.push(
                def,
                &format!("routes.{index}.scope"),
                "route scopes are not supported by NetworkManager".to_owned(),
            );
        }
    }
    if !common.routing_policy.is_empty() {
        requires(&mut unsupported, def, ctx, "routing-policy", NmCapability::RoutingRules);
    }
    for (index, entry) in common.addresses.iter().enumerate() {
        if let Some(options) = entry.options() {
            let lifetime_zero = options.lifetime.as_ref().is_some_and(|l| l.as_str() == "0");
            if options.label.is_some() || lifetime_zero {
                unsupported.push(
                    def,
                    &format!("addresses.{index}"),
                    "address labels and lifetimes are not supported by NetworkManager".to_owned(),
                );
            }
        }
    }

    match def.kind {
        DeviceKind::Vrf(_) => requires(&mut unsupported, def, ctx, "", NmCapability::Vrf),
        DeviceKind::Veth(_) => requires(&mut unsupported, def, ctx, "", NmCapability::Veth),
        DeviceKind::Bridge(ref props) => {
            let params = &props.parameters;
            for (key, span) in [
                ("ageing-time", params.ageing_time),
                ("forward-delay", params.forward_delay),
                ("hello-time", params.hello_time),
                ("max-age", params.max_age),
            ] {
                if let Some(span) = span
                    && span.whole_seconds().is_none()
                {
                    unsupported.push(
                        def,
                        &format!("parameters.{key}"),
                        format!("NetworkManager only supports whole seconds for {key} ({}ms)", span.0),
                    );
                }
            }
        }
        DeviceKind::Bond(ref props) => {
            if let Some(span) = props.parameters.learn_packet_interval
                && span.whole_seconds().is_none()
            {
                unsupported.push(
                    def,
                    "parameters.learn-packet-interval",
                    format!(
                        "NetworkManager only supports whole seconds for learn-packet-interval ({}ms)",
                        span.0
                    ),
                );
            }
        }
        DeviceKind::Tunnel(ref props) => {
            if props.mode == TunnelMode::Wireguard
                && props.private_key().is_some_and(|k| k.starts_with('/'))
            {
                unsupported.push(
                    def,
                    "key",
                    "NetworkManager cannot read WireGuard private keys from a file".to_owned(),
                );
            }
        }
        DeviceKind::NmDevice(ref props) => {
            let missing_type = props
                .common
                .networkmanager
                .as_ref()
                .is_none_or(|nm| !nm.passthrough.entries().any(|(s, k, _)| s == "connection" && k == "type"));
            if missing_type {
                unsupported.push(
                    def,
                    "networkmanager.passthrough",
                    "nm-devices need a connection.type passthrough".to_owned(),
                );
            }
        }
        DeviceKind::Ethernet(_)
        | DeviceKind::Wifi(_)
        | DeviceKind::Modem(_)
        | DeviceKind::Vlan(_)
        | DeviceKind::Dummy(_) => {}
    }
    unsupported
}

/// Keyfile under construction for one connection
struct Keyfile {
    ini: IniFile,
}

impl Keyfile {
    fn new(def: &NetDefinition, ctx: &RenderContext<'_>, name: &str, uuid: Option<&str>) -> Self {
        let mut ini = IniFile::new();
        let connection = ini.section("connection");
        connection
            .push("id", name)
            .push("uuid", connection_uuid(name, uuid))
            .push("type", connection_type(def));
        connection.push_opt("interface-name", def.interface_name());
        if let Some(nm) = def.common().networkmanager.as_ref() {
            connection.push_opt("stable-id", nm.stable_id.as_deref());
        }
        if def.common().activation_mode.is_some() {
            connection.push("autoconnect", false);
        }
        if let Some(owner) = ctx.model.owner(&def.id) {
            let slave_type = if matches!(owner.kind, DeviceKind::Bond(_)) { "bond" } else { "bridge" };
            connection
                .push("master", owner.interface_name().unwrap_or(&owner.id))
                .push("slave-type", slave_type);
        } else if let Some(vrf) = ctx.model.vrf(&def.id) {
            connection.push("master", &vrf.id).push("slave-type", "vrf");
        }
        Self { ini }
    }

    /// Type-specific sections
    fn device(&mut self, def: &NetDefinition, ctx: &RenderContext<'_>) -> Result<(), RenderError> {
        let common = def.common();
        let ini = &mut self.ini;

        if let Some(physical) = def.physical()
            && let Some(m) = physical.match_config.as_ref()
            && def.interface_name().is_none()
        {
            let section = ini.section("match");
            if let Some(name) = m.name.as_deref() {
                section.push("interface-name", format!("{name};"));
            }
            if let Some(driver) = m.driver.as_ref() {
                section.push("driver", keyfile_list(driver.patterns()));
            }
        }

        match def.kind {
            DeviceKind::Ethernet(ref props) => {
                let link_section = if props.infiniband_mode.is_some() { "infiniband" } else { "ethernet" };
                let section = ini.section(link_section);
                section
                    .push_opt(
                        "mac-address",
                        props.physical.match_config.as_ref().and_then(|m| m.macaddress.as_deref()),
                    )
                    .push_opt("cloned-mac-address", common.macaddress.as_deref())
                    .push_opt("mtu", common.mtu);
                if let Some(wol) = props.physical.wakeonlan {
                    section.push("wake-on-lan", if wol { 64 } else { 0 });
                }
                if let Some(mode) = props.infiniband_mode {
                    section.push("transport-mode", mode);
                }
                let ethtool = ini.section("ethtool");
                for (_, key, value) in props.physical.offloads() {
                    ethtool.push(key, value);
                }
                if let Some(count) = ctx.model.vf_count(&def.id) {
                    let sriov = ini.section("sriov");
                    sriov.push("total-vfs", count);
                    if let Some(mode) = props.embedded_switch_mode {
                        sriov.push(
                            "eswitch-mode",
                            match mode {
                                EswitchMode::Legacy => 0,
                                EswitchMode::Switchdev => 1,
                            },
                        );
                    }
                }
                if let Some(auth) = props.auth.as_ref() {
                    security_sections(ini, auth, false);
                }
            }
            DeviceKind::Wifi(_) => {}
            DeviceKind::Modem(ref props) => {
                let section = ini.section(if props.is_gsm() { "gsm" } else { "cdma" });
                section
                    .push_opt("apn", props.apn.as_deref())
                    .push_opt("auto-config", props.auto_config)
                    .push_opt("device-id", props.device_id.as_deref())
                    .push_opt("network-id", props.network_id.as_deref())
                    .push_opt("number", props.number.as_deref())
                    .push_opt("password", props.password.as_ref())
                    .push_opt("pin", props.pin.as_ref())
                    .push_opt("sim-id", props.sim_id.as_deref())
                    .push_opt("sim-operator-id", props.sim_operator_id.as_deref())
                    .push_opt("username", props.username.as_deref())
                    .push_opt("mtu", common.mtu);
            }
            DeviceKind::Bond(ref props) => {
                bond_section(ini.section("bond"), &props.parameters);
                ethernet_overrides(ini, common);
            }
            DeviceKind::Bridge(ref props) => {
                bridge_section(ini.section("bridge"), &props.parameters);
                ethernet_overrides(ini, common);
            }
            DeviceKind::Vlan(ref props) => {
                let parent = ctx
                    .model
                    .get(&props.link)
                    .ok_or_else(|| RenderError::internal(&def.id, format!("unresolved VLAN link '{}'", props.link)))?;
                ini.section("vlan")
                    .push("id", props.id)
                    .push("parent", parent_reference(parent));
                ethernet_overrides(ini, common);
            }
            DeviceKind::Vrf(ref props) => {
                ini.section("vrf").push("table", props.table);
            }
            DeviceKind::Dummy(_) => ethernet_overrides(ini, common),
            DeviceKind::Veth(ref props) => {
                ini.section("veth").push("peer", &props.peer);
                ethernet_overrides(ini, common);
            }
            DeviceKind::Tunnel(ref props) => tunnel_sections(ini, def, ctx, props)?,
            DeviceKind::NmDevice(_) => {}
        }

        if let Some(owner) = ctx.model.owner(&def.id)
            && let DeviceKind::Bridge(ref bridge) = owner.kind
        {
            ini.section("bridge-port")
                .push_opt("priority", bridge.parameters.port_priority.get(&def.id))
                .push_opt("path-cost", bridge.parameters.path_cost.get(&def.id));
        }
        Ok(())
    }

    /// `[ipv4]` and `[ipv6]`; bond and bridge members carry no IP settings
    fn ip(&mut self, def: &NetDefinition, ctx: &RenderContext<'_>) {
        if ctx.model.owner(&def.id).is_some() || matches!(def.kind, DeviceKind::NmDevice(_)) {
            return;
        }
        let common = def.common();
        let vrf_table = match def.kind {
            DeviceKind::Vrf(ref vrf) => Some(vrf.table),
            _ => None,
        };
        ip_family(self.ini.section("ipv4"), common, false, vrf_table);
        ip_family(self.ini.section("ipv6"), common, true, vrf_table);
    }

    /// Apply a passthrough bag; generated keys are overridden
    fn passthrough(&mut self, def: &NetDefinition, nm: Option<&NmSettings>) -> Result<(), RenderError> {
        let Some(nm) = nm else {
            return Ok(());
        };
        for (section, key, value) in nm.passthrough.entries() {
            if section.is_empty() {
                let mut unsupported = Unsupported::default();
                unsupported.push(
                    def,
                    "networkmanager.passthrough",
                    format!("passthrough key '{key}' does not name a keyfile section"),
                );
                return unsupported.finish();
            }
            self.ini.unique_section(section).set(key, value);
        }
        Ok(())
    }
}

fn connection_type(def: &NetDefinition) -> &'static str {
    match def.kind {
        DeviceKind::Ethernet(ref props) if props.infiniband_mode.is_some() => "infiniband",
        DeviceKind::Ethernet(_) => "ethernet",
        DeviceKind::Wifi(_) => "wifi",
        DeviceKind::Modem(ref props) if props.is_gsm() => "gsm",
        DeviceKind::Modem(_) => "cdma",
        DeviceKind::Bond(_) => "bond",
        DeviceKind::Bridge(_) => "bridge",
        DeviceKind::Vlan(_) => "vlan",
        DeviceKind::Vrf(_) => "vrf",
        DeviceKind::Dummy(_) => "dummy",
        DeviceKind::Veth(_) => "veth",
        DeviceKind::Tunnel(ref props) => match props.mode {
            TunnelMode::Wireguard => "wireguard",
            TunnelMode::Vxlan => "vxlan",
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
            | TunnelMode::Isatap => "ip-tunnel",
        },
        // replaced by the connection.type passthrough
        DeviceKind::NmDevice(_) => "generic",
    }
}

/// How another connection refers to `parent`: its interface name, or the
/// UUID of its connection when the name is not fixed
fn parent_reference(parent: &NetDefinition) -> String {
    parent.interface_name().map_or_else(
        || {
            connection_uuid(
                &connection_name(parent),
                parent.common().networkmanager.as_ref().and_then(|nm| nm.uuid.as_deref()),
            )
        },
        str::to_owned,
    )
}

fn ethernet_overrides(ini: &mut IniFile, common: &CommonProperties) {
    ini.section("ethernet")
        .push_opt("cloned-mac-address", common.macaddress.as_deref())
        .push_opt("mtu", common.mtu);
}

/// Spans in integer milliseconds
fn ms(span: Millis) -> u64 {
    span.0
}

/// Spans in integer seconds; sub-second values were rejected earlier
fn secs(span: Millis) -> u64 {
    span.0 / 1000
}

fn bond_section(section: &mut Section, params: &BondParameters) {
    section
        .push_opt("mode", params.mode)
        .push_opt("lacp_rate", params.lacp_rate)
        .push_opt("miimon", params.mii_monitor_interval.map(ms))
        .push_opt("min_links", params.min_links)
        .push_opt("xmit_hash_policy", params.transmit_hash_policy)
        .push_opt("ad_select", params.ad_select)
        .push_opt("all_slaves_active", params.all_members_active.map(u8::from))
        .push_opt("arp_interval", params.arp_interval.map(ms));
    if !params.arp_ip_targets.is_empty() {
        section.push("arp_ip_target", params.arp_ip_targets.join(","));
    }
    section
        .push_opt("arp_validate", params.arp_validate)
        .push_opt("arp_all_targets", params.arp_all_targets)
        .push_opt("updelay", params.up_delay.map(ms))
        .push_opt("downdelay", params.down_delay.map(ms))
        .push_opt("fail_over_mac", params.fail_over_mac_policy)
        .push_opt("num_grat_arp", params.gratuitous_arp)
        .push_opt("packets_per_slave", params.packets_per_member)
        .push_opt("primary_reselect", params.primary_reselect_policy)
        .push_opt("resend_igmp", params.resend_igmp)
        .push_opt("lp_interval", params.learn_packet_interval.map(secs))
        .push_opt("primary", params.primary.as_deref());
}

fn bridge_section(section: &mut Section, params: &BridgeParameters) {
    section
        .push_opt("ageing-time", params.ageing_time.map(secs))
        .push_opt("priority", params.priority)
        .push_opt("forward-delay", params.forward_delay.map(secs))
        .push_opt("hello-time", params.hello_time.map(secs))
        .push_opt("max-age", params.max_age.map(secs))
        .push_opt("stp", params.stp);
}

fn tunnel_mode_number(mode: TunnelMode) -> Option<u8> {
    match mode {
        TunnelMode::Ipip => Some(1),
        TunnelMode::Gre => Some(2),
        TunnelMode::Sit => Some(3),
        TunnelMode::Isatap => Some(4),
        TunnelMode::Vti => Some(5),
        TunnelMode::Ip6Ip6 => Some(6),
        TunnelMode::Ipip6 => Some(7),
        TunnelMode::Ip6Gre => Some(8),
        TunnelMode::Vti6 => Some(9),
        TunnelMode::GreTap => Some(10),
        TunnelMode::Ip6GreTap => Some(11),
        TunnelMode::Wireguard | TunnelMode::Vxlan => None,
    }
}

fn tunnel_sections(
    ini: &mut IniFile,
    def: &NetDefinition,
    ctx: &RenderContext<'_>,
    props: &TunnelProperties,
) -> Result<(), RenderError> {
    let parent = props
        .link
        .as_deref()
        .map(|link| {
            ctx.model
                .get(link)
                .map(parent_reference)
                .ok_or_else(|| RenderError::internal(&def.id, format!("unresolved tunnel link '{link}'")))
        })
        .transpose()?;

    match props.mode {
        TunnelMode::Wireguard => {
            ini.section("wireguard")
                .push_opt("private-key", props.private_key())
                .push_opt("listen-port", props.port)
                .push_opt("fwmark", props.mark)
                .push_opt("mtu", def.common().mtu);
            for peer in &props.peers {
                let Some(public) = peer.keys.as_ref().and_then(|k| k.public.as_deref()) else {
                    return Err(RenderError::internal(&def.id, "wireguard peer without a public key"));
                };
                let section = ini.section(format!("wireguard-peer.{public}"));
                section.push_opt("endpoint", peer.endpoint.as_deref());
                if !peer.allowed_ips.is_empty() {
                    section.push("allowed-ips", keyfile_list(&peer.allowed_ips));
                }
                section.push_opt("persistent-keepalive", peer.keepalive);
                if let Some(shared) = peer.keys.as_ref().and_then(|k| k.shared.as_deref()) {
                    section.push("preshared-key", shared).push("preshared-key-flags", 0);
                }
            }
        }
        TunnelMode::Vxlan => {
            ini.section("vxlan")
                .push_opt("id", props.id)
                .push_opt("local", props.local.as_deref())
                .push_opt("remote", props.remote.as_deref())
                .push_opt("destination-port", props.port)
                .push_opt("ttl", props.ttl)
                .push_opt("parent", parent);
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
            let section = ini.section("ip-tunnel");
            section
                .push_opt("mode", tunnel_mode_number(props.mode))
                .push_opt("local", props.local.as_deref())
                .push_opt("remote", props.remote.as_deref())
                .push_opt("ttl", props.ttl)
                .push_opt("parent", parent)
                .push_opt("mtu", def.common().mtu);
            match props.shared_key() {
                Some(key) => {
                    section.push("input-key", key).push("output-key", key);
                }
                None => {
                    section
                        .push_opt("input-key", props.input_key())
                        .push_opt("output-key", props.output_key());
                }
            }
        }
    }
    Ok(())
}

fn wifi_section(ini: &mut IniFile, def: &NetDefinition, ssid: &str, ap: &AccessPoint, wakeonwlan: &[String]) {
    let section = ini.section("wifi");
    section.push("ssid", ssid).push(
        "mode",
        match ap.mode() {
            ApMode::Infrastructure => "infrastructure",
            ApMode::Ap => "ap",
            ApMode::Adhoc => "adhoc",
        },
    );
    if let Some(band) = ap.band {
        section.push(
            "band",
            match band {
                WifiBand::FiveGhz => "a",
                WifiBand::TwoPointFourGhz => "bg",
            },
        );
    }
    section
        .push_opt("channel", ap.channel)
        .push_opt("bssid", ap.bssid.as_deref())
        .push_opt("hidden", ap.hidden.filter(|h| *h));
    if let Some(physical) = def.physical() {
        section.push_opt(
            "mac-address",
            physical.match_config.as_ref().and_then(|m| m.macaddress.as_deref()),
        );
    }
    section
        .push_opt("cloned-mac-address", def.common().macaddress.as_deref())
        .push_opt("mtu", def.common().mtu);
    if !wakeonwlan.is_empty() {
        let flags = wakeonwlan.iter().fold(0_u32, |flags, option| {
            flags
                | match option.as_str() {
                    "default" => 0x1,
                    "any" => 0x2,
                    "disconnect" => 0x4,
                    "magic_pkt" => 0x8,
                    "gtk_rekey_failure" => 0x10,
                    "eap_identity_req" => 0x20,
                    "four_way_handshake" => 0x40,
                    "rfkill_release" => 0x80,
                    "tcp" => 0x100,
                    _ => 0,
                }
        });
        section.push("wake-on-wlan", flags);
    }
}

fn security_sections(ini: &mut IniFile, auth: &AuthConfig, wireless: bool) {
    let management = auth.effective_key_management();
    let password = auth.password.as_ref().map(|p| p.as_str());
    if wireless {
        let key_mgmt = match management {
            KeyManagement::None => None,
            KeyManagement::Psk => Some("wpa-psk"),
            KeyManagement::Sae => Some("sae"),
            KeyManagement::Eap | KeyManagement::EapSha256 => Some("wpa-eap"),
            KeyManagement::EapSuiteB192 => Some("wpa-eap-suite-b-192"),
            KeyManagement::Ieee8021x => Some("ieee8021x"),
        };
        if let Some(key_mgmt) = key_mgmt {
            let section = ini.section("wifi-security");
            section.push("key-mgmt", key_mgmt);
            if matches!(management, KeyManagement::Psk | KeyManagement::Sae) {
                section.push_opt("psk", password);
            }
        }
    }
    if let Some(method) = auth.method {
        let eap = match method {
            EapMethod::Tls => "tls",
            EapMethod::Peap => "peap",
            EapMethod::Ttls => "ttls",
            EapMethod::Leap => "leap",
            EapMethod::Pwd => "pwd",
        };
        let section = ini.section("802-1x");
        section
            .push("eap", format!("{eap};"))
            .push_opt("identity", auth.identity.as_deref())
            .push_opt("anonymous-identity", auth.anonymous_identity.as_deref());
        if !matches!(management, KeyManagement::Psk | KeyManagement::Sae) {
            section.push_opt("password", password);
        }
        section
            .push_opt("ca-cert", auth.ca_certificate.as_deref())
            .push_opt("client-cert", auth.client_certificate.as_deref())
            .push_opt("private-key", auth.client_key.as_deref())
            .push_opt("private-key-password", auth.client_key_password.as_ref())
            .push_opt("phase2-auth", auth.phase2_auth.as_deref());
    }
}

fn ip_family(section: &mut Section, common: &CommonProperties, ipv6: bool, vrf_table: Option<u32>) {
    let addresses: Vec<Cidr> = common
        .addresses
        .iter()
        .filter_map(|entry| parse_cidr(entry.address()).ok())
        .filter(|cidr| cidr.is_ipv6() == ipv6)
        .collect();
    let dhcp = if ipv6 { common.dhcp6_enabled() } else { common.dhcp4_enabled() };
    let family = if ipv6 { LinkLocal::Ipv6 } else { LinkLocal::Ipv4 };
    let link_local = common
        .link_local
        .as_deref()
        .map_or(ipv6, |families| families.contains(&family));

    let method = if dhcp || (ipv6 && common.accept_ra == Some(true)) {
        "auto"
    } else if !addresses.is_empty() {
        "manual"
    } else if link_local {
        "link-local"
    } else if ipv6 {
        "ignore"
    } else {
        "disabled"
    };
    section.push("method", method);

    for (index, address) in addresses.iter().enumerate() {
        section.push(format!("address{}", index + 1), address);
    }
    let gateway = if ipv6 { common.gateway6.as_deref() } else { common.gateway4.as_deref() };
    section.push_opt("gateway", gateway);

    if let Some(nameservers) = common.nameservers.as_ref() {
        let servers: Vec<&str> = nameservers
            .addresses
            .iter()
            .map(String::as_str)
            .filter(|s| s.parse::<IpAddr>().is_ok_and(|ip| ip.is_ipv6() == ipv6))
            .collect();
        if !servers.is_empty() {
            section.push("dns", keyfile_list(servers));
        }
        if !nameservers.search.is_empty() {
            section.push("dns-search", keyfile_list(&nameservers.search));
        }
    }

    let mut index = 0;
    for route in &common.routes {
        let Ok(destination) = parse_destination(&route.to) else {
            continue;
        };
        let via: Option<IpAddr> = route.via.as_deref().and_then(|v| v.parse().ok());
        let route_v6 = destination.map_or_else(|| via.is_some_and(|v| v.is_ipv6()), |d| d.is_ipv6());
        if route_v6 != ipv6 {
            continue;
        }
        index += 1;
        let destination = destination.map_or_else(
            || if ipv6 { "::/0".to_owned() } else { "0.0.0.0/0".to_owned() },
            |d| d.to_string(),
        );
        let mut value = destination;
        match (via, route.metric) {
            (Some(via), Some(metric)) => value.push_str(&format!(",{via},{metric}")),
            (Some(via), None) => value.push_str(&format!(",{via}")),
            (None, Some(metric)) => {
                let unspecified = if ipv6 { "::" } else { "0.0.0.0" };
                value.push_str(&format!(",{unspecified},{metric}"));
            }
            (None, None) => {}
        }
        section.push(format!("route{index}"), value);

        let mut options = Vec::new();
        if route.on_link == Some(true) {
            options.push("onlink=true".to_owned());
        }
        if let Some(table) = route.table.or(vrf_table) {
            options.push(format!("table={table}"));
        }
        if route.kind() != RouteType::Unicast {
            options.push(format!("type={}", route.kind()));
        }
        if let Some(from) = route.from.as_deref() {
            options.push(format!("src={from}"));
        }
        if let Some(mtu) = route.mtu {
            options.push(format!("mtu={mtu}"));
        }
        if let Some(window) = route.congestion_window {
            options.push(format!("initcwnd={window}"));
        }
        if let Some(window) = route.advertised_receive_window {
            options.push(format!("initrwnd={window}"));
        }
        if !options.is_empty() {
            section.push(format!("route{index}_options"), options.join(","));
        }
    }

    let mut rule_index = 0;
    for rule in &common.routing_policy {
        let rule_v6 = [rule.from.as_deref(), rule.to.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|text| parse_destination(text).ok().flatten())
            .is_some_and(|cidr| cidr.is_ipv6());
        if rule_v6 != ipv6 {
            continue;
        }
        rule_index += 1;
        let mut words = Vec::new();
        if let Some(priority) = rule.priority {
            words.push(format!("priority {priority}"));
        }
        if let Some(from) = rule.from.as_deref() {
            words.push(format!("from {from}"));
        }
        if let Some(to) = rule.to.as_deref() {
            words.push(format!("to {to}"));
        }
        if let Some(mark) = rule.mark {
            words.push(format!("fwmark {mark}"));
        }
        if let Some(tos) = rule.type_of_service {
            words.push(format!("tos {tos}"));
        }
        if let Some(table) = rule.table.or(vrf_table) {
            words.push(format!("table {table}"));
        }
        section.push(format!("routing-rule{rule_index}"), words.join(" "));
    }

    let overrides = if ipv6 { common.dhcp6_overrides.as_ref() } else { common.dhcp4_overrides.as_ref() };
    if dhcp {
        if !ipv6 && common.dhcp_identifier == Some(DhcpIdentifier::Mac) {
            section.push("dhcp-client-id", "mac");
        }
        if let Some(overrides) = overrides {
            if overrides.use_dns == Some(false) {
                section.push("ignore-auto-dns", true);
            }
            if overrides.use_routes == Some(false) {
                section.push("ignore-auto-routes", true);
            }
            section
                .push_opt("route-metric", overrides.route_metric)
                .push_opt("dhcp-hostname", overrides.hostname.as_deref());
            if overrides.send_hostname == Some(false) {
                section.push("dhcp-send-hostname", false);
            }
        }
    }

    if ipv6 {
        section
            .push_opt(
                "addr-gen-mode",
                common.ipv6_address_generation.map(|mode| match mode {
                    AddressGeneration::Eui64 => "eui64",
                    AddressGeneration::StablePrivacy => "stable-privacy",
                }),
            )
            .push_opt("token", common.ipv6_address_token.as_deref())
            .push_opt("ip6-privacy", common.ipv6_privacy.map(|p| if p { 2 } else { 0 }))
            .push_opt("mtu", common.ipv6_mtu);
    }
}
