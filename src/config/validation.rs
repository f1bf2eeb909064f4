//! Semantic validation of the merged document
//!
//! Runs after the structural schema pass. Checks that span properties or
//! definitions live here: address syntax, DHCP override agreement, default
//! route cardinality, match rules, mode-specific parameters and feature
//! gating. Every check appends to one diagnostics list so unrelated
//! problems are reported together.

use crate::config::schema;
use crate::config::{CompileContext, KeyPath};
use crate::error::{CompileError, Diagnostic};
use crate::model::properties::{
    AuthConfig, BondProperties, BridgeProperties, CommonProperties, DhcpOverrides,
    EthernetProperties, PhysicalProperties, RouteConfig, TunnelProperties, WifiProperties,
};
use crate::model::values::{
    is_default_destination, is_glob, parse_cidr, parse_destination, BondMode, KeyManagement,
    RouteScope, RouteType, TunnelMode, UseDomains,
};
use crate::model::{build_model, Backend, DeviceKind, DeviceType, NetDefinition, NetworkModel};
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Outcome of validation: the model built from every valid definition and
/// all diagnostics found
#[derive(Debug, Clone, Default)]
pub struct Validated {
    pub model: NetworkModel,
    pub diagnostics: Vec<Diagnostic>,
}

impl Validated {
    /// The model if no problem was found, otherwise the diagnostics
    ///
    /// # Errors
    ///
    /// Returns the diagnostics when there is at least one.
    pub fn into_result(self) -> Result<NetworkModel, Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(self.model)
        } else {
            Err(self.diagnostics)
        }
    }
}

/// Validate a merged tree and build the device model
///
/// # Errors
///
/// Returns an error if:
/// - The embedded schema cannot be compiled
pub fn validate(tree: &Value, ctx: &CompileContext) -> Result<Validated, CompileError> {
    if tree.is_null() {
        return Ok(Validated::default());
    }

    let mut diagnostics = schema::check(tree)?;
    if diagnostics.iter().any(blocks_model) {
        return Ok(Validated {
            model: NetworkModel::default(),
            diagnostics,
        });
    }

    let failed: BTreeSet<KeyPath> = diagnostics.iter().map(|d| d.key_path.clone()).collect();
    let built = build_model(tree, &failed);
    diagnostics.extend(built.diagnostics);

    let mut checker = Checker::new(ctx);
    checker.check_model(&built.model);
    diagnostics.extend(checker.diagnostics);

    debug!(
        "Validated {} definitions ({} diagnostics)",
        built.model.definitions.len(),
        diagnostics.len()
    );
    Ok(Validated {
        model: built.model,
        diagnostics,
    })
}

/// Structural errors above definition level leave nothing to build from
fn blocks_model(diagnostic: &Diagnostic) -> bool {
    match diagnostic.key_path.components() {
        [] | [_] => true,
        [_, section] => DeviceType::from_section(section).is_some(),
        _ => false,
    }
}

/// Effective DHCP client settings with defaults applied
#[derive(Debug, PartialEq, Eq)]
struct DhcpEffective<'a> {
    use_dns: bool,
    use_ntp: bool,
    send_hostname: bool,
    use_hostname: bool,
    use_mtu: bool,
    use_routes: bool,
    use_domains: Option<UseDomains>,
    hostname: Option<&'a str>,
    route_metric: Option<u32>,
}

impl<'a> DhcpEffective<'a> {
    fn new(overrides: Option<&'a DhcpOverrides>) -> Self {
        let o = overrides;
        Self {
            use_dns: o.and_then(|o| o.use_dns).unwrap_or(true),
            use_ntp: o.and_then(|o| o.use_ntp).unwrap_or(true),
            send_hostname: o.and_then(|o| o.send_hostname).unwrap_or(true),
            use_hostname: o.and_then(|o| o.use_hostname).unwrap_or(true),
            use_mtu: o.and_then(|o| o.use_mtu).unwrap_or(true),
            use_routes: o.and_then(|o| o.use_routes).unwrap_or(true),
            use_domains: o.and_then(|o| o.use_domains),
            hostname: o.and_then(|o| o.hostname.as_deref()),
            route_metric: o.and_then(|o| o.route_metric),
        }
    }

    /// Keys whose values differ between the two sets
    fn disagreements(&self, other: &Self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        let pairs = [
            ("use-dns", self.use_dns == other.use_dns),
            ("use-ntp", self.use_ntp == other.use_ntp),
            ("send-hostname", self.send_hostname == other.send_hostname),
            ("use-hostname", self.use_hostname == other.use_hostname),
            ("use-mtu", self.use_mtu == other.use_mtu),
            ("use-routes", self.use_routes == other.use_routes),
            ("use-domains", self.use_domains == other.use_domains),
            ("hostname", self.hostname == other.hostname),
            ("route-metric", self.route_metric == other.route_metric),
        ];
        for (key, same) in pairs {
            if !same {
                keys.push(key);
            }
        }
        keys
    }
}

/// Key identifying a default route for cardinality checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DefaultRouteKey {
    ipv6: bool,
    table: u32,
    metric: Option<u32>,
}

const MAIN_TABLE: u32 = 254;

struct Checker<'c> {
    ctx: &'c CompileContext,
    diagnostics: Vec<Diagnostic>,
    default_routes: BTreeMap<DefaultRouteKey, String>,
    interface_names: BTreeMap<String, String>,
}

impl<'c> Checker<'c> {
    fn new(ctx: &'c CompileContext) -> Self {
        Self {
            ctx,
            diagnostics: Vec::new(),
            default_routes: BTreeMap::new(),
            interface_names: BTreeMap::new(),
        }
    }

    fn error<S: Into<String>>(&mut self, path: KeyPath, message: S) {
        self.diagnostics.push(Diagnostic::schema(path, message));
    }

    /// Report `what` unless `flag` is enabled; returns whether it is
    fn require_feature(&mut self, path: KeyPath, what: &str, flag: &str) -> bool {
        if self.ctx.features.is_enabled(flag) {
            return true;
        }
        self.error(path, format!("{what} requires feature '{flag}'"));
        false
    }

    fn check_model(&mut self, model: &NetworkModel) {
        if let Some(ovs) = model.openvswitch.as_ref() {
            let path = KeyPath::new(["network", "openvswitch"]);
            self.require_feature(path.clone(), "openvswitch", "openvswitch");
            for (index, port) in model.patch_ports().enumerate() {
                if model.is_declared(port) {
                    self.error(
                        path.child("ports").index(index / 2),
                        format!("patch port '{port}' clashes with a definition of the same ID"),
                    );
                }
            }
            if let Some(ssl) = ovs.ssl.as_ref()
                && (ssl.ca_cert.is_none() || ssl.certificate.is_none() || ssl.private_key.is_none())
            {
                self.error(
                    path.child("ssl"),
                    "ssl requires ca-cert, certificate and private-key",
                );
            }
        }

        for def in model.definitions.values() {
            self.check_definition(def);
        }
    }

    fn check_definition(&mut self, def: &NetDefinition) {
        let device_type = def.device_type();
        if let Some(flag) = device_type.feature()
            && !self.require_feature(def.key_path.clone(), device_type.section(), flag)
        {
            return;
        }

        self.check_common(def);
        if let Some(physical) = def.physical() {
            self.check_physical(def, physical);
        }

        match def.kind {
            DeviceKind::Ethernet(ref props) => self.check_ethernet(def, props),
            DeviceKind::Wifi(ref props) => self.check_wifi(def, props),
            DeviceKind::Bond(ref props) => self.check_bond(def, props),
            DeviceKind::Bridge(ref props) => self.check_bridge(def, props),
            DeviceKind::Vrf(ref props) => {
                self.check_vrf_tables(def, props.table);
            }
            DeviceKind::Tunnel(ref props) => self.check_tunnel(def, props),
            DeviceKind::NmDevice(ref props) => {
                let has_passthrough = props
                    .common
                    .networkmanager
                    .as_ref()
                    .is_some_and(|nm| !nm.passthrough.is_empty());
                if !has_passthrough {
                    self.error(
                        def.path("networkmanager"),
                        "nm-devices require a non-empty networkmanager.passthrough",
                    );
                }
            }
            DeviceKind::Modem(_) | DeviceKind::Vlan(_) | DeviceKind::Dummy(_) | DeviceKind::Veth(_) => {}
        }
    }

    fn check_common(&mut self, def: &NetDefinition) {
        let common = def.common();

        if common.activation_mode.is_some() {
            self.require_feature(def.path("activation-mode"), "activation-mode", "activation-mode");
        }
        if common.ipv6_mtu.is_some() {
            self.require_feature(def.path("ipv6-mtu"), "ipv6-mtu", "ipv6-mtu");
        }
        if common.link_local.is_some() {
            self.require_feature(def.path("link-local"), "link-local", "link-local");
        }
        for (key, overrides) in [
            ("dhcp4-overrides", common.dhcp4_overrides.as_ref()),
            ("dhcp6-overrides", common.dhcp6_overrides.as_ref()),
        ] {
            if overrides.is_some_and(|o| o.use_domains.is_some()) {
                self.require_feature(
                    def.path(key).child("use-domains"),
                    "use-domains",
                    "dhcp-use-domains",
                );
            }
        }

        for (index, entry) in common.addresses.iter().enumerate() {
            if let Err(message) = parse_cidr(entry.address()) {
                self.error(def.path("addresses").index(index), message);
            }
        }

        self.check_gateway(def, "gateway4", common.gateway4.as_deref(), false);
        self.check_gateway(def, "gateway6", common.gateway6.as_deref(), true);

        if let Some(nameservers) = common.nameservers.as_ref() {
            for (index, server) in nameservers.addresses.iter().enumerate() {
                if server.parse::<IpAddr>().is_err() {
                    self.error(
                        def.path("nameservers").child("addresses").index(index),
                        format!("malformed nameserver address '{server}'"),
                    );
                }
            }
        }

        if let Some(token) = common.ipv6_address_token.as_deref() {
            if common.ipv6_address_generation.is_some() {
                self.error(
                    def.path("ipv6-address-token"),
                    "ipv6-address-generation and ipv6-address-token are mutually exclusive",
                );
            }
            if token.parse::<Ipv6Addr>().is_err() {
                self.error(
                    def.path("ipv6-address-token"),
                    format!("invalid IPv6 address token '{token}'"),
                );
            }
        }

        self.check_dhcp_agreement(def, common);

        for (index, route) in common.routes.iter().enumerate() {
            self.check_route(def, index, route);
        }
        for (index, rule) in common.routing_policy.iter().enumerate() {
            let path = def.path("routing-policy").index(index);
            if rule.from.is_none() && rule.to.is_none() {
                self.error(path.clone(), "routing policy rule needs 'from' or 'to'");
            }
            for (key, value) in [("from", rule.from.as_deref()), ("to", rule.to.as_deref())] {
                if let Some(value) = value
                    && let Err(message) = parse_destination(value)
                {
                    self.error(path.child(key), message);
                }
            }
            if rule.table.is_none() && def.device_type() != DeviceType::Vrf {
                self.error(path.child("table"), "routing policy rule requires a table");
            }
        }

        if let Some(ovs) = common.ovs() {
            let path = def.path("openvswitch");
            self.require_feature(path.clone(), "openvswitch", "openvswitch");
            match def.device_type() {
                DeviceType::Bond => {
                    let bridge_only = ovs.fail_mode.is_some()
                        || ovs.mcast_snooping.is_some()
                        || ovs.rstp.is_some()
                        || !ovs.protocols.is_empty()
                        || ovs.controller.is_some();
                    if bridge_only {
                        self.error(
                            path,
                            "fail-mode, mcast-snooping, rstp, protocols and controller are only valid on bridges",
                        );
                    }
                }
                DeviceType::Bridge => {
                    if ovs.lacp.is_some() {
                        self.error(path.child("lacp"), "lacp is only valid on bonds");
                    }
                }
                DeviceType::Ethernet
                | DeviceType::Wifi
                | DeviceType::Modem
                | DeviceType::Vlan
                | DeviceType::Vrf
                | DeviceType::Tunnel
                | DeviceType::Dummy
                | DeviceType::Veth
                | DeviceType::NmDevice => {
                    self.error(path, "openvswitch settings are only supported on bonds and bridges");
                }
            }
        }

        if let Some(uuid) = common.networkmanager.as_ref().and_then(|nm| nm.uuid.as_deref())
            && uuid::Uuid::parse_str(uuid).is_err()
        {
            self.error(
                def.path("networkmanager").child("uuid"),
                format!("invalid UUID '{uuid}'"),
            );
        }
    }

    fn check_gateway(&mut self, def: &NetDefinition, key: &str, gateway: Option<&str>, ipv6: bool) {
        let Some(gateway) = gateway else {
            return;
        };
        warn!(
            "{}: {} is deprecated, use a default route instead",
            def.path(key),
            key
        );
        match gateway.parse::<IpAddr>() {
            Ok(address) if address.is_ipv6() == ipv6 => {
                self.claim_default_route(
                    def,
                    def.path(key),
                    DefaultRouteKey {
                        ipv6,
                        table: MAIN_TABLE,
                        metric: None,
                    },
                );
            }
            Ok(_) | Err(_) => {
                let family = if ipv6 { "IPv6" } else { "IPv4" };
                self.error(
                    def.path(key),
                    format!("{key} '{gateway}' is not an {family} address"),
                );
            }
        }
    }

    fn check_dhcp_agreement(&mut self, def: &NetDefinition, common: &CommonProperties) {
        if def.backend != Backend::Networkd || !common.dhcp4_enabled() || !common.dhcp6_enabled() {
            return;
        }
        let v4 = DhcpEffective::new(common.dhcp4_overrides.as_ref());
        let v6 = DhcpEffective::new(common.dhcp6_overrides.as_ref());
        for key in v4.disagreements(&v6) {
            self.error(
                def.path("dhcp6-overrides").child(key),
                format!(
                    "dhcp4-overrides.{key} and dhcp6-overrides.{key} must agree when rendered by networkd"
                ),
            );
        }
    }

    fn check_route(&mut self, def: &NetDefinition, index: usize, route: &RouteConfig) {
        let path = def.path("routes").index(index);

        let destination = match parse_destination(&route.to) {
            Ok(destination) => destination,
            Err(message) => {
                self.error(path.child("to"), message);
                return;
            }
        };
        let via = match route.via.as_deref().map(str::parse::<IpAddr>) {
            Some(Ok(via)) => Some(via),
            Some(Err(_)) => {
                self.error(
                    path.child("via"),
                    format!("malformed gateway '{}'", route.via.as_deref().unwrap_or_default()),
                );
                return;
            }
            None => None,
        };
        if let (Some(destination), Some(via)) = (destination, via)
            && destination.is_ipv6() != via.is_ipv6()
        {
            self.error(
                path.child("via"),
                format!("gateway {via} does not match the address family of {}", route.to),
            );
        }
        if let Some(from) = route.from.as_deref()
            && from.parse::<IpAddr>().is_err()
        {
            self.error(path.child("from"), format!("malformed source address '{from}'"));
        }

        if route.on_link == Some(true) && via.is_none() {
            self.error(path.child("on-link"), "on-link requires 'via'");
        }
        let scoped = matches!(route.scope, Some(RouteScope::Link | RouteScope::Host));
        if route.kind() == RouteType::Unicast && via.is_none() && !scoped {
            self.error(
                path.clone(),
                format!("unicast route to {} must have 'via' unless its scope is link or host", route.to),
            );
        }

        if let DeviceKind::Vrf(ref vrf) = def.kind
            && let Some(table) = route.table
            && table != vrf.table
        {
            self.error(
                path.child("table"),
                format!("routes of VRF '{}' must use table {}", def.id, vrf.table),
            );
        }

        if is_default_destination(&route.to) && route.kind() == RouteType::Unicast {
            let ipv6 = match (destination, via) {
                (Some(d), _) => d.is_ipv6(),
                (None, Some(v)) => v.is_ipv6(),
                (None, None) => false,
            };
            let table = match def.kind {
                DeviceKind::Vrf(ref vrf) => vrf.table,
                _ => route.table.unwrap_or(MAIN_TABLE),
            };
            self.claim_default_route(
                def,
                path,
                DefaultRouteKey {
                    ipv6,
                    table,
                    metric: route.metric,
                },
            );
        }
    }

    fn claim_default_route(&mut self, def: &NetDefinition, path: KeyPath, key: DefaultRouteKey) {
        if let Some(first) = self.default_routes.get(&key) {
            let family = if key.ipv6 { "IPv6" } else { "IPv4" };
            let metric = key.metric.map_or_else(|| "default".to_owned(), |m| m.to_string());
            let message = format!(
                "conflicting default route declarations for {family} (table: {}, metric: {metric}), first declared in {first} but also in {}",
                table_label(key.table),
                def.id
            );
            self.error(path, message);
            return;
        }
        self.default_routes.insert(key, def.id.clone());
    }

    fn check_vrf_tables(&mut self, def: &NetDefinition, table: u32) {
        for (index, rule) in def.common().routing_policy.iter().enumerate() {
            if let Some(rule_table) = rule.table
                && rule_table != table
            {
                self.error(
                    def.path("routing-policy").index(index).child("table"),
                    format!("routing policy of VRF '{}' must use table {}", def.id, table),
                );
            }
        }
    }

    fn check_physical(&mut self, def: &NetDefinition, physical: &PhysicalProperties) {
        if let Some(set_name) = physical.set_name.as_deref() {
            match physical.match_config.as_ref() {
                None => {
                    self.error(def.path("set-name"), "set-name requires match properties");
                }
                Some(m) => {
                    let unique = m.macaddress.is_some()
                        || m.name.as_deref().is_some_and(|name| !is_glob(name));
                    if !unique {
                        self.error(
                            def.path("set-name"),
                            "set-name requires a match on macaddress or a literal name; a glob or driver match may select several devices",
                        );
                    }
                }
            }
            if let Some(previous) = self.interface_names.get(set_name) {
                let message = format!("set-name '{set_name}' is already used by '{previous}'");
                self.error(def.path("set-name"), message);
            } else {
                self.interface_names
                    .insert(set_name.to_owned(), def.id.clone());
            }
        }
    }

    fn check_ethernet(&mut self, def: &NetDefinition, props: &EthernetProperties) {
        if props.link.is_some() {
            self.require_feature(def.path("link"), "SR-IOV virtual functions", "sriov");
        }
        if props.virtual_function_count.is_some() {
            self.require_feature(def.path("virtual-function-count"), "virtual-function-count", "sriov");
        }
        if props.embedded_switch_mode.is_some() {
            self.require_feature(def.path("embedded-switch-mode"), "embedded-switch-mode", "eswitch-mode");
        }
        if props.delay_virtual_functions_rebind.is_some() {
            self.require_feature(
                def.path("delay-virtual-functions-rebind"),
                "delay-virtual-functions-rebind",
                "eswitch-mode",
            );
            if props.embedded_switch_mode.is_none() {
                self.error(
                    def.path("delay-virtual-functions-rebind"),
                    "delay-virtual-functions-rebind requires embedded-switch-mode",
                );
            }
        }
        if props.link.is_some()
            && (props.virtual_function_count.is_some() || props.embedded_switch_mode.is_some())
        {
            self.error(
                def.path("link"),
                "a virtual function cannot declare virtual-function-count or embedded-switch-mode",
            );
        }
        if props.infiniband_mode.is_some() {
            self.require_feature(def.path("infiniband-mode"), "infiniband-mode", "infiniband");
        }
        if let Some(auth) = props.auth.as_ref() {
            self.check_auth(def.path("auth"), auth);
        }
    }

    fn check_wifi(&mut self, def: &NetDefinition, props: &WifiProperties) {
        if props.regulatory_domain.is_some() {
            self.require_feature(def.path("regulatory-domain"), "regulatory-domain", "regulatory-domain");
        }
        for (ssid, ap) in props.access_points() {
            let path = def.path("access-points").child(ssid);
            if ssid.is_empty() || ssid.len() > 32 {
                self.error(path.clone(), "SSID must be 1 to 32 bytes long");
            }
            if ap.channel.is_some() && ap.band.is_none() {
                self.error(path.child("channel"), "channel requires band");
            }
            if ap.password.is_some() && ap.auth.is_some() {
                self.error(path.child("password"), "password and auth are mutually exclusive");
                continue;
            }
            if let Some(auth) = ap.effective_auth() {
                let auth_path = if ap.auth.is_some() { path.child("auth") } else { path };
                self.check_auth(auth_path, &auth);
            }
        }
    }

    fn check_auth(&mut self, path: KeyPath, auth: &AuthConfig) {
        match auth.effective_key_management() {
            KeyManagement::Psk | KeyManagement::Sae => match auth.password.as_ref() {
                None => self.error(path, "PSK authentication requires a password"),
                Some(password) if !is_valid_psk(password.as_str()) => self.error(
                    path.child("password"),
                    "WPA passphrase must be 8 to 63 characters or 64 hexadecimal digits",
                ),
                Some(_) => {}
            },
            KeyManagement::Eap
            | KeyManagement::EapSha256
            | KeyManagement::EapSuiteB192
            | KeyManagement::Ieee8021x => {
                if auth.method.is_none() {
                    self.error(path, "EAP authentication requires a method");
                }
            }
            KeyManagement::None => {}
        }
    }

    fn check_bond(&mut self, def: &NetDefinition, props: &BondProperties) {
        let params = &props.parameters;
        let path = def.path("parameters");
        let mode = params.mode;

        if let Some(primary) = params.primary.as_deref() {
            if !props.interfaces.iter().any(|member| member == primary) {
                self.error(
                    path.child("primary"),
                    format!("primary '{primary}' is not a member of bond '{}'", def.id),
                );
            }
            if !matches!(
                mode,
                Some(BondMode::ActiveBackup | BondMode::BalanceTlb | BondMode::BalanceAlb)
            ) {
                self.error(
                    path.child("primary"),
                    "primary is only valid for modes active-backup, balance-tlb and balance-alb",
                );
            }
        }

        if mode != Some(BondMode::Lacp) {
            for (key, set) in [
                ("lacp-rate", params.lacp_rate.is_some()),
                ("ad-select", params.ad_select.is_some()),
            ] {
                if set {
                    self.error(path.child(key), format!("{key} is only valid for mode 802.3ad"));
                }
            }
        }
        if params.transmit_hash_policy.is_some()
            && !matches!(
                mode,
                Some(BondMode::BalanceXor | BondMode::Lacp | BondMode::BalanceTlb)
            )
        {
            self.error(
                path.child("transmit-hash-policy"),
                "transmit-hash-policy is only valid for modes balance-xor, 802.3ad and balance-tlb",
            );
        }
        if params.learn_packet_interval.is_some()
            && !matches!(mode, Some(BondMode::BalanceTlb | BondMode::BalanceAlb))
        {
            self.error(
                path.child("learn-packet-interval"),
                "learn-packet-interval is only valid for modes balance-tlb and balance-alb",
            );
        }
        if params.packets_per_member.is_some() && mode != Some(BondMode::BalanceRr) {
            self.error(
                path.child("packets-per-member"),
                "packets-per-member is only valid for mode balance-rr",
            );
        }

        let arp = params.arp_interval.is_some_and(|ms| ms.0 > 0);
        let mii = params.mii_monitor_interval.is_some_and(|ms| ms.0 > 0);
        if arp && mii {
            self.error(
                path.child("arp-interval"),
                "arp-interval and mii-monitor-interval cannot be used together",
            );
        }
        for (index, target) in params.arp_ip_targets.iter().enumerate() {
            if target.parse::<Ipv4Addr>().is_err() {
                self.error(
                    path.child("arp-ip-targets").index(index),
                    format!("malformed ARP target '{target}'"),
                );
            }
        }
        if !params.arp_ip_targets.is_empty() && !arp {
            self.error(path.child("arp-ip-targets"), "arp-ip-targets requires arp-interval");
        }

        if def.declares_openvswitch() && props.interfaces.len() < 2 {
            self.error(
                def.path("interfaces"),
                "Open vSwitch bonds need at least two interfaces",
            );
        }
    }

    fn check_bridge(&mut self, def: &NetDefinition, props: &BridgeProperties) {
        let path = def.path("parameters");
        for (key, ports) in [
            ("port-priority", &props.parameters.port_priority),
            ("path-cost", &props.parameters.path_cost),
        ] {
            for port in ports.keys() {
                if !props.interfaces.contains(port) {
                    self.error(
                        path.child(key).child(port.as_str()),
                        format!("{key} names '{port}', which is not a member of bridge '{}'", def.id),
                    );
                }
            }
        }
    }

    fn check_tunnel(&mut self, def: &NetDefinition, props: &TunnelProperties) {
        let mode = props.mode;
        match mode {
            TunnelMode::Wireguard => {
                if !self.require_feature(def.path("mode"), "wireguard tunnels", "wireguard") {
                    return;
                }
                self.check_wireguard(def, props);
            }
            TunnelMode::Vxlan => {
                if !self.require_feature(def.path("mode"), "vxlan tunnels", "vxlan") {
                    return;
                }
                if props.id.is_none() {
                    self.error(def.key_path.clone(), "VXLAN tunnels require an id");
                }
                self.check_endpoints(def, props, false);
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
                if props.local.is_none() {
                    self.error(def.key_path.clone(), format!("{mode} tunnels require 'local'"));
                }
                if props.remote.is_none() && mode != TunnelMode::Isatap {
                    self.error(def.key_path.clone(), format!("{mode} tunnels require 'remote'"));
                }
                self.check_endpoints(def, props, true);
            }
        }

        if props.key.is_some() {
            let key_path = def.path("key");
            if mode == TunnelMode::Wireguard {
                if props.input_key().is_some() && props.private_key().is_none() {
                    self.error(key_path, "wireguard tunnels take a private key, not input/output keys");
                }
            } else if !mode.takes_keys() {
                self.error(key_path, format!("{mode} tunnels do not take keys"));
            } else {
                if props.private_key().is_some() && props.shared_key().is_none() {
                    self.error(key_path.clone(), "private keys are only valid for wireguard tunnels");
                }
                for key in [props.input_key(), props.output_key()].into_iter().flatten() {
                    if key.parse::<u32>().is_err() && key.parse::<Ipv4Addr>().is_err() {
                        self.error(
                            key_path.clone(),
                            format!("invalid tunnel key '{key}': expected a number or dotted quad"),
                        );
                    }
                }
            }
        }
        if !props.peers.is_empty() && mode != TunnelMode::Wireguard {
            self.error(def.path("peers"), "peers are only valid for wireguard tunnels");
        }
        if props.id.is_some() && mode != TunnelMode::Vxlan {
            self.error(def.path("id"), "id is only valid for vxlan tunnels");
        }
        if props.port.is_some() && !matches!(mode, TunnelMode::Wireguard | TunnelMode::Vxlan) {
            self.error(def.path("port"), "port is only valid for wireguard and vxlan tunnels");
        }
    }

    fn check_endpoints(&mut self, def: &NetDefinition, props: &TunnelProperties, family_fixed: bool) {
        let ipv6 = props.mode.is_ipv6();
        for (key, endpoint) in [("local", props.local.as_deref()), ("remote", props.remote.as_deref())] {
            let Some(endpoint) = endpoint else {
                continue;
            };
            match endpoint.parse::<IpAddr>() {
                Ok(address) if family_fixed && address.is_ipv6() != ipv6 => {
                    let family = if ipv6 { "IPv6" } else { "IPv4" };
                    self.error(
                        def.path(key),
                        format!("{} tunnels require {family} endpoints", props.mode),
                    );
                }
                Ok(_) => {}
                Err(_) => self.error(def.path(key), format!("malformed address '{endpoint}'")),
            }
        }
    }

    fn check_wireguard(&mut self, def: &NetDefinition, props: &TunnelProperties) {
        if props.private_key().is_none() {
            self.error(
                def.key_path.clone(),
                "wireguard tunnels require a private key (key or keys.private)",
            );
        }
        if props.peers.is_empty() {
            self.error(def.key_path.clone(), "wireguard tunnels require at least one peer");
        }
        for (index, peer) in props.peers.iter().enumerate() {
            let path = def.path("peers").index(index);
            if peer.keys.as_ref().and_then(|k| k.public.as_ref()).is_none() {
                self.error(path.child("keys"), "wireguard peers require a public key");
            }
            for (ip_index, allowed) in peer.allowed_ips.iter().enumerate() {
                if let Err(message) = parse_cidr(allowed) {
                    self.error(path.child("allowed-ips").index(ip_index), message);
                }
            }
            if let Some(endpoint) = peer.endpoint.as_deref()
                && !is_endpoint(endpoint)
            {
                self.error(
                    path.child("endpoint"),
                    format!("invalid endpoint '{endpoint}': expected host:port"),
                );
            }
        }
    }
}

fn table_label(table: u32) -> String {
    match table {
        MAIN_TABLE => "main".to_owned(),
        other => other.to_string(),
    }
}

/// 8 to 63 printable characters, or exactly 64 hex digits
fn is_valid_psk(password: &str) -> bool {
    let length = password.chars().count();
    (8..=63).contains(&length)
        || (password.len() == 64 && password.chars().all(|c| c.is_ascii_hexdigit()))
}

/// `host:port` or `[v6]:port`
fn is_endpoint(endpoint: &str) -> bool {
    endpoint
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;

    fn run(text: &str) -> Validated {
        run_with(text, &CompileContext::default())
    }

    fn run_with(text: &str, ctx: &CompileContext) -> Validated {
        let tree: Value = serde_yaml::from_str(text).unwrap();
        validate(&tree, ctx).unwrap()
    }

    fn messages(validated: &Validated) -> Vec<String> {
        validated
            .diagnostics
            .iter()
            .map(|d| format!("{}: {}", d.key_path, d.message))
            .collect()
    }

    #[test]
    fn valid_document_builds_a_model() {
        let validated = run("network: {version: 2, ethernets: {eth0: {dhcp4: true}}}");
        let model = validated.into_result().unwrap();
        assert!(model.definitions.contains_key("eth0"));
    }

    #[test]
    fn dhcp_overrides_must_agree_under_networkd() {
        let doc = "network:
  version: 2
  ethernets:
    eth0:
      renderer: RENDERER
      dhcp4: true
      dhcp6: true
      dhcp4-overrides: {use-dns: true}
      dhcp6-overrides: {use-dns: false}
";
        let networkd = run(&doc.replace("RENDERER", "networkd"));
        let found = messages(&networkd);
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].starts_with("network.ethernets.eth0.dhcp6-overrides.use-dns"));

        let nm = run(&doc.replace("RENDERER", "NetworkManager"));
        assert!(nm.diagnostics.is_empty(), "{:?}", messages(&nm));
    }

    #[test]
    fn unset_override_matches_its_default() {
        let validated = run("network:
  version: 2
  ethernets:
    eth0: {dhcp4: true, dhcp6: true, dhcp4-overrides: {use-dns: true}}
");
        assert!(validated.diagnostics.is_empty());
    }

    #[test]
    fn default_routes_are_unique_per_family_table_and_metric() {
        let validated = run("network:
  version: 2
  ethernets:
    eth0:
      addresses: [10.0.0.2/24]
      routes: [{to: default, via: 10.0.0.1}]
    eth1:
      addresses: [10.1.0.2/24]
      routes:
        - {to: default, via: 10.1.0.1}
        - {to: default, via: 10.1.0.1, metric: 200}
        - {to: default, via: 10.1.0.1, table: 100}
");
        let found = messages(&validated);
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].contains("first declared in eth0 but also in eth1"), "{found:?}");
    }

    #[test]
    fn default_route_spelling_does_not_matter() {
        let validated = run("network:
  version: 2
  ethernets:
    eth0:
      addresses: [10.0.0.2/24]
      routes: [{to: default, via: 10.0.0.1}]
    eth1:
      addresses: [10.1.0.2/24]
      routes: [{to: 0.0.0.0/00, via: 10.1.0.1}]
    eth2:
      addresses: ['2001:db8::2/64']
      routes: [{to: '::/0', via: '2001:db8::1'}, {to: '0:0::/0', via: '2001:db8::1'}]
");
        let found = messages(&validated);
        assert_eq!(found.len(), 2, "{found:?}");
        assert!(found[0].contains("IPv4") && found[0].contains("first declared in eth0 but also in eth1"), "{found:?}");
        assert!(found[1].contains("IPv6") && found[1].contains("first declared in eth2 but also in eth2"), "{found:?}");
    }

    #[test]
    fn set_name_needs_a_unique_match() {
        let validated = run("network:
  version: 2
  ethernets:
    a: {set-name: lan0}
    b: {match: {name: 'en*'}, set-name: lan1}
    c: {match: {macaddress: '00:11:22:33:44:55'}, set-name: lan2}
    d: {match: {name: eth7}, set-name: lan3}
");
        let found = messages(&validated);
        assert_eq!(found.len(), 2, "{found:?}");
        assert!(found[0].starts_with("network.ethernets.a.set-name"));
        assert!(found[1].starts_with("network.ethernets.b.set-name"));
    }

    #[test]
    fn bond_mode_specific_parameters() {
        let validated = run("network:
  version: 2
  ethernets: {eth0: {}, eth1: {}}
  bonds:
    bond0:
      interfaces: [eth0, eth1]
      parameters: {mode: active-backup, lacp-rate: fast, primary: eth2}
");
        let found = messages(&validated);
        assert_eq!(found.len(), 2, "{found:?}");
        assert!(found.iter().any(|m| m.contains("lacp-rate is only valid")));
        assert!(found.iter().any(|m| m.contains("primary 'eth2' is not a member")));
    }

    #[test]
    fn feature_gating() {
        let ctx = CompileContext::new(FeatureSet::compiled().without("vrf"));
        let validated = run_with(
            "network: {version: 2, vrfs: {vrf0: {table: 10}}}",
            &ctx,
        );
        let found = messages(&validated);
        assert_eq!(found, ["network.vrfs.vrf0: vrfs requires feature 'vrf'"]);
    }

    #[test]
    fn schema_failures_keep_the_id_known() {
        let validated = run("network:
  version: 2
  vlans:
    bad: {id: 4095, link: eth0}
  ethernets:
    eth0: {addresses: [10.0.0.1]}
");
        let found = messages(&validated);
        assert_eq!(found.len(), 2, "{found:?}");
        assert!(validated.model.placeholders.contains_key("bad"));
        assert!(validated.model.definitions.contains_key("eth0"));
    }

    #[test]
    fn wifi_passphrase_length() {
        let validated = run("network:
  version: 2
  wifis:
    wlan0:
      access-points:
        short: {password: abc}
        good: {password: correct-horse}
        open: {}
");
        let found = messages(&validated);
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].starts_with("network.wifis.wlan0.access-points.short.password"));
    }

    #[test]
    fn tunnel_requirements() {
        let validated = run("network:
  version: 2
  tunnels:
    gre0: {mode: gre, local: 10.0.0.1}
    ip6: {mode: ip6gre, local: 10.0.0.1, remote: 10.0.0.2}
    wg0: {mode: wireguard, key: aGVsbG8=}
    vx0: {mode: vxlan}
");
        let found = messages(&validated);
        assert!(found.iter().any(|m| m.contains("gre tunnels require 'remote'")), "{found:?}");
        assert!(found.iter().any(|m| m.contains("ip6gre tunnels require IPv6 endpoints")), "{found:?}");
        assert!(found.iter().any(|m| m.contains("at least one peer")), "{found:?}");
        assert!(found.iter().any(|m| m.contains("VXLAN tunnels require an id")), "{found:?}");
    }

    #[test]
    fn route_family_consistency() {
        let validated = run("network:
  version: 2
  ethernets:
    eth0:
      routes: [{to: 2001:db8::/64, via: 10.0.0.1}]
");
        let found = messages(&validated);
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(found[0].contains("does not match the address family"));
    }

    #[test]
    fn bad_version_blocks_nothing_else() {
        let validated = run("network: {version: 1, ethernets: {eth0: {mtu: 0}}}");
        assert_eq!(validated.diagnostics.len(), 2);
    }
}
