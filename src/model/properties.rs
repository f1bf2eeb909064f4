//! Typed property bags, one struct per device type
//!
//! Every struct deserializes from the validated YAML subtree of one
//! definition. Shared settings are flattened in from [`CommonProperties`]
//! and, for physical devices, [`PhysicalProperties`].

use crate::model::values::{
    opt_bool, opt_millis, opt_seconds, opt_table, opt_use_domains, ActivationMode,
    AdSelect, AddressGeneration, ApMode, ArpAllTargets, ArpValidate, Backend, BondMode,
    DhcpIdentifier, EapMethod, EswitchMode, FailOverMacPolicy, HashPolicy, InfinibandMode,
    KeyManagement, LacpRate, LinkLocal, Millis, OpenFlow, OptionalAddress, OvsConnectionMode,
    OvsFailMode, OvsLacp, Passthrough, PrimaryReselect, RouteScope, RouteType, ScalarText,
    TunnelMode, UseDomains, WifiBand,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Per-family DHCP client settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DhcpOverrides {
    #[serde(default, deserialize_with = "opt_bool")]
    pub use_dns: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub use_ntp: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub send_hostname: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub use_hostname: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub use_mtu: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub use_routes: Option<bool>,
    #[serde(default, deserialize_with = "opt_use_domains")]
    pub use_domains: Option<UseDomains>,
    pub hostname: Option<String>,
    pub route_metric: Option<u32>,
}

impl DhcpOverrides {
    /// Whether no override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A static address with optional per-address settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AddressEntry {
    Plain(String),
    Detailed(BTreeMap<String, Option<AddressOptions>>),
}

impl AddressEntry {
    /// The `address/prefix` text
    #[must_use]
    pub fn address(&self) -> &str {
        match *self {
            Self::Plain(ref address) => address,
            Self::Detailed(ref map) => map.keys().next().map_or("", String::as_str),
        }
    }

    /// Per-address options, if any were given
    #[must_use]
    pub fn options(&self) -> Option<&AddressOptions> {
        match *self {
            Self::Plain(_) => None,
            Self::Detailed(ref map) => map.values().next().and_then(Option::as_ref),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddressOptions {
    pub lifetime: Option<ScalarText>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Nameservers {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub search: Vec<String>,
}

/// One static route
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RouteConfig {
    pub to: String,
    pub via: Option<String>,
    pub from: Option<String>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub on_link: Option<bool>,
    pub metric: Option<u32>,
    #[serde(rename = "type")]
    pub route_type: Option<RouteType>,
    pub scope: Option<RouteScope>,
    #[serde(default, deserialize_with = "opt_table")]
    pub table: Option<u32>,
    pub mtu: Option<u32>,
    pub congestion_window: Option<u32>,
    pub advertised_receive_window: Option<u32>,
}

impl RouteConfig {
    /// Route type with the unicast default applied
    #[must_use]
    #[inline]
    pub fn kind(&self) -> RouteType {
        self.route_type.unwrap_or(RouteType::Unicast)
    }
}

/// One routing policy rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingPolicyConfig {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default, deserialize_with = "opt_table")]
    pub table: Option<u32>,
    pub priority: Option<u32>,
    pub mark: Option<u32>,
    pub type_of_service: Option<u8>,
}

/// NetworkManager-only settings of a definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NmSettings {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub stable_id: Option<String>,
    pub device: Option<String>,
    #[serde(default)]
    pub passthrough: Passthrough,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OvsController {
    #[serde(default)]
    pub addresses: Vec<String>,
    pub connection_mode: Option<OvsConnectionMode>,
}

/// Open vSwitch settings of a bond or bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OvsSettings {
    #[serde(default)]
    pub external_ids: BTreeMap<String, ScalarText>,
    #[serde(default)]
    pub other_config: BTreeMap<String, ScalarText>,
    pub lacp: Option<OvsLacp>,
    pub fail_mode: Option<OvsFailMode>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub mcast_snooping: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub rstp: Option<bool>,
    #[serde(default)]
    pub protocols: Vec<OpenFlow>,
    pub controller: Option<OvsController>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OvsSsl {
    pub ca_cert: Option<String>,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
}

/// The global `network.openvswitch` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalOvs {
    #[serde(default)]
    pub external_ids: BTreeMap<String, ScalarText>,
    #[serde(default)]
    pub other_config: BTreeMap<String, ScalarText>,
    #[serde(default)]
    pub protocols: Vec<OpenFlow>,
    /// Patch port pairs
    #[serde(default)]
    pub ports: Vec<Vec<String>>,
    pub ssl: Option<OvsSsl>,
}

impl GlobalOvs {
    /// Patch port pairs as tuples
    pub fn patch_ports(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ports.iter().filter_map(|pair| match pair.as_slice() {
            [a, b] => Some((a.as_str(), b.as_str())),
            _ => None,
        })
    }
}

/// Settings valid on every device type
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommonProperties {
    pub renderer: Option<Backend>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub dhcp4: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub dhcp6: Option<bool>,
    pub dhcp_identifier: Option<DhcpIdentifier>,
    pub dhcp4_overrides: Option<DhcpOverrides>,
    pub dhcp6_overrides: Option<DhcpOverrides>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub accept_ra: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub ipv6_privacy: Option<bool>,
    pub ipv6_address_generation: Option<AddressGeneration>,
    pub ipv6_address_token: Option<String>,
    pub link_local: Option<Vec<LinkLocal>>,
    #[serde(default)]
    pub addresses: Vec<AddressEntry>,
    pub gateway4: Option<String>,
    pub gateway6: Option<String>,
    pub nameservers: Option<Nameservers>,
    pub macaddress: Option<String>,
    pub mtu: Option<u32>,
    pub ipv6_mtu: Option<u32>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub optional: Option<bool>,
    #[serde(default)]
    pub optional_addresses: Vec<OptionalAddress>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub critical: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub ignore_carrier: Option<bool>,
    pub activation_mode: Option<ActivationMode>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub routing_policy: Vec<RoutingPolicyConfig>,
    pub networkmanager: Option<NmSettings>,
    pub openvswitch: Option<OvsSettings>,
}

impl CommonProperties {
    #[must_use]
    #[inline]
    pub fn dhcp4_enabled(&self) -> bool {
        self.dhcp4.unwrap_or(false)
    }

    #[must_use]
    #[inline]
    pub fn dhcp6_enabled(&self) -> bool {
        self.dhcp6.unwrap_or(false)
    }

    /// Open vSwitch settings; an empty `openvswitch: {}` still selects Open vSwitch
    #[must_use]
    #[inline]
    pub const fn ovs(&self) -> Option<&OvsSettings> {
        self.openvswitch.as_ref()
    }

    /// Whether any static or dynamic addressing is configured
    #[must_use]
    pub fn has_addressing(&self) -> bool {
        self.dhcp4_enabled()
            || self.dhcp6_enabled()
            || !self.addresses.is_empty()
            || self.gateway4.is_some()
            || self.gateway6.is_some()
    }
}

/// Predicates selecting physical devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MatchConfig {
    pub name: Option<String>,
    pub macaddress: Option<String>,
    pub driver: Option<DriverMatch>,
}

impl MatchConfig {
    /// Whether no predicate is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.macaddress.is_none() && self.driver.is_none()
    }
}

/// One driver glob or a list of alternatives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DriverMatch {
    One(String),
    Any(Vec<String>),
}

impl DriverMatch {
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        match *self {
            Self::One(ref driver) => vec![driver.as_str()],
            Self::Any(ref drivers) => drivers.iter().map(String::as_str).collect(),
        }
    }
}

/// Settings valid on ethernets, wifis and modems
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhysicalProperties {
    #[serde(rename = "match")]
    pub match_config: Option<MatchConfig>,
    pub set_name: Option<String>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub wakeonlan: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub receive_checksum_offload: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub transmit_checksum_offload: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub tcp_segmentation_offload: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub tcp6_segmentation_offload: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub generic_segmentation_offload: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub generic_receive_offload: Option<bool>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub large_receive_offload: Option<bool>,
}

impl PhysicalProperties {
    /// Offload toggles as (networkd `[Link]` key, NetworkManager ethtool key, value)
    #[must_use]
    pub fn offloads(&self) -> Vec<(&'static str, &'static str, bool)> {
        [
            ("ReceiveChecksumOffload", "feature-rx", self.receive_checksum_offload),
            ("TransmitChecksumOffload", "feature-tx", self.transmit_checksum_offload),
            ("TCPSegmentationOffload", "feature-tso", self.tcp_segmentation_offload),
            ("TCP6SegmentationOffload", "feature-tx-tcp6-segmentation", self.tcp6_segmentation_offload),
            ("GenericSegmentationOffload", "feature-gso", self.generic_segmentation_offload),
            ("GenericReceiveOffload", "feature-gro", self.generic_receive_offload),
            ("LargeReceiveOffload", "feature-lro", self.large_receive_offload),
        ]
        .into_iter()
        .filter_map(|(networkd, nm, value)| value.map(|v| (networkd, nm, v)))
        .collect()
    }
}

/// 802.1x and WPA authentication
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    pub key_management: Option<KeyManagement>,
    pub password: Option<ScalarText>,
    pub method: Option<EapMethod>,
    pub identity: Option<String>,
    pub anonymous_identity: Option<String>,
    pub ca_certificate: Option<String>,
    pub client_certificate: Option<String>,
    pub client_key: Option<String>,
    pub client_key_password: Option<ScalarText>,
    pub phase2_auth: Option<String>,
}

impl AuthConfig {
    /// Key management, inferring PSK from a bare password
    #[must_use]
    pub fn effective_key_management(&self) -> KeyManagement {
        self.key_management.unwrap_or(if self.password.is_some() {
            KeyManagement::Psk
        } else {
            KeyManagement::None
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EthernetProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(flatten)]
    pub physical: PhysicalProperties,
    /// SR-IOV physical function of this virtual function
    pub link: Option<String>,
    pub virtual_function_count: Option<u32>,
    pub embedded_switch_mode: Option<EswitchMode>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub delay_virtual_functions_rebind: Option<bool>,
    pub infiniband_mode: Option<InfinibandMode>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub emit_lldp: Option<bool>,
    pub auth: Option<AuthConfig>,
}

/// One wireless network a wifi device may join
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccessPoint {
    pub password: Option<ScalarText>,
    pub mode: Option<ApMode>,
    pub band: Option<WifiBand>,
    pub channel: Option<u32>,
    pub bssid: Option<String>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub hidden: Option<bool>,
    pub auth: Option<AuthConfig>,
    pub networkmanager: Option<NmSettings>,
}

impl AccessPoint {
    #[must_use]
    #[inline]
    pub fn mode(&self) -> ApMode {
        self.mode.unwrap_or(ApMode::Infrastructure)
    }

    /// Authentication, folding a bare `password` into PSK auth
    #[must_use]
    pub fn effective_auth(&self) -> Option<AuthConfig> {
        match (self.auth.as_ref(), self.password.as_ref()) {
            (Some(auth), _) => Some(auth.clone()),
            (None, Some(password)) => Some(AuthConfig {
                key_management: Some(KeyManagement::Psk),
                password: Some(password.clone()),
                ..AuthConfig::default()
            }),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WifiProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(flatten)]
    pub physical: PhysicalProperties,
    #[serde(default)]
    pub access_points: BTreeMap<String, Option<AccessPoint>>,
    pub regulatory_domain: Option<String>,
    #[serde(default)]
    pub wakeonwlan: Vec<String>,
}

impl WifiProperties {
    /// Access points with empty entries expanded to defaults
    pub fn access_points(&self) -> impl Iterator<Item = (&str, AccessPoint)> {
        self.access_points
            .iter()
            .map(|(ssid, ap)| (ssid.as_str(), ap.clone().unwrap_or_default()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModemProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(flatten)]
    pub physical: PhysicalProperties,
    pub apn: Option<String>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub auto_config: Option<bool>,
    pub device_id: Option<String>,
    pub network_id: Option<String>,
    pub number: Option<String>,
    pub password: Option<ScalarText>,
    pub pin: Option<ScalarText>,
    pub sim_id: Option<String>,
    pub sim_operator_id: Option<String>,
    pub username: Option<String>,
}

impl ModemProperties {
    /// GSM settings imply a GSM modem; otherwise CDMA
    #[must_use]
    pub fn is_gsm(&self) -> bool {
        self.apn.is_some()
            || self.auto_config.is_some()
            || self.device_id.is_some()
            || self.network_id.is_some()
            || self.pin.is_some()
            || self.sim_id.is_some()
            || self.sim_operator_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BondParameters {
    pub mode: Option<BondMode>,
    pub lacp_rate: Option<LacpRate>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub mii_monitor_interval: Option<Millis>,
    pub min_links: Option<u32>,
    pub transmit_hash_policy: Option<HashPolicy>,
    pub ad_select: Option<AdSelect>,
    #[serde(default, alias = "all-slaves-active", deserialize_with = "opt_bool")]
    pub all_members_active: Option<bool>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub arp_interval: Option<Millis>,
    #[serde(default)]
    pub arp_ip_targets: Vec<String>,
    pub arp_validate: Option<ArpValidate>,
    pub arp_all_targets: Option<ArpAllTargets>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub up_delay: Option<Millis>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub down_delay: Option<Millis>,
    pub fail_over_mac_policy: Option<FailOverMacPolicy>,
    #[serde(alias = "gratuitious-arp")]
    pub gratuitous_arp: Option<u32>,
    #[serde(alias = "packets-per-slave")]
    pub packets_per_member: Option<u32>,
    pub primary_reselect_policy: Option<PrimaryReselect>,
    pub resend_igmp: Option<u32>,
    #[serde(default, deserialize_with = "opt_seconds")]
    pub learn_packet_interval: Option<Millis>,
    pub primary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BondProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub parameters: BondParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeParameters {
    #[serde(default, alias = "aging-time", deserialize_with = "opt_seconds")]
    pub ageing_time: Option<Millis>,
    pub priority: Option<u32>,
    #[serde(default)]
    pub port_priority: BTreeMap<String, u32>,
    #[serde(default, deserialize_with = "opt_seconds")]
    pub forward_delay: Option<Millis>,
    #[serde(default, deserialize_with = "opt_seconds")]
    pub hello_time: Option<Millis>,
    #[serde(default, deserialize_with = "opt_seconds")]
    pub max_age: Option<Millis>,
    #[serde(default)]
    pub path_cost: BTreeMap<String, u32>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub stp: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub parameters: BridgeParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VlanProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub id: u16,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VrfProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    #[serde(deserialize_with = "required_table")]
    pub table: u32,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

fn required_table<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    opt_table(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing routing table"))
}

/// Tunnel key: one value for both directions, or split keys
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TunnelKey {
    Single(ScalarText),
    Split(TunnelKeySet),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TunnelKeySet {
    pub input: Option<ScalarText>,
    pub output: Option<ScalarText>,
    pub private: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PeerKeys {
    pub public: Option<String>,
    pub shared: Option<String>,
}

/// One WireGuard peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WireguardPeer {
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    pub keepalive: Option<u32>,
    pub keys: Option<PeerKeys>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TunnelProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub mode: TunnelMode,
    pub local: Option<String>,
    pub remote: Option<String>,
    #[serde(alias = "keys")]
    pub key: Option<TunnelKey>,
    pub ttl: Option<u32>,
    pub mark: Option<u32>,
    pub port: Option<u32>,
    /// VXLAN network identifier
    pub id: Option<u32>,
    pub link: Option<String>,
    #[serde(default)]
    pub peers: Vec<WireguardPeer>,
}

impl TunnelProperties {
    /// Key used in both directions, when a single key was given
    #[must_use]
    pub fn shared_key(&self) -> Option<&str> {
        match self.key {
            Some(TunnelKey::Single(ref key)) => Some(key.as_str()),
            Some(TunnelKey::Split(_)) | None => None,
        }
    }

    #[must_use]
    pub fn input_key(&self) -> Option<&str> {
        match self.key {
            Some(TunnelKey::Single(ref key)) => Some(key.as_str()),
            Some(TunnelKey::Split(ref keys)) => keys.input.as_ref().map(ScalarText::as_str),
            None => None,
        }
    }

    #[must_use]
    pub fn output_key(&self) -> Option<&str> {
        match self.key {
            Some(TunnelKey::Single(ref key)) => Some(key.as_str()),
            Some(TunnelKey::Split(ref keys)) => keys.output.as_ref().map(ScalarText::as_str),
            None => None,
        }
    }

    /// WireGuard private key (or path to it)
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        match self.key {
            Some(TunnelKey::Single(ref key)) => Some(key.as_str()),
            Some(TunnelKey::Split(ref keys)) => keys.private.as_deref(),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DummyProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VethProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    pub peer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NmDeviceProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_flattens_common_and_physical() {
        let props: EthernetProperties = serde_yaml::from_str(
            "dhcp4: yes
match: {macaddress: '00:11:22:33:44:55'}
set-name: lan0
emit-lldp: true
",
        )
        .unwrap();
        assert_eq!(props.common.dhcp4, Some(true));
        assert_eq!(props.physical.set_name.as_deref(), Some("lan0"));
        assert_eq!(props.emit_lldp, Some(true));
    }

    #[test]
    fn bond_timers_default_to_milliseconds() {
        let props: BondProperties = serde_yaml::from_str(
            "interfaces: [eth0, eth1]
parameters: {mode: 802.3ad, mii-monitor-interval: 100, up-delay: 2s, all-slaves-active: on}
",
        )
        .unwrap();
        assert_eq!(props.parameters.mode, Some(BondMode::Lacp));
        assert_eq!(props.parameters.mii_monitor_interval, Some(Millis(100)));
        assert_eq!(props.parameters.up_delay, Some(Millis(2000)));
        assert_eq!(props.parameters.all_members_active, Some(true));
    }

    #[test]
    fn bridge_timers_default_to_seconds() {
        let props: BridgeProperties =
            serde_yaml::from_str("parameters: {forward-delay: 15, hello-time: 500ms}").unwrap();
        assert_eq!(props.parameters.forward_delay, Some(Millis(15_000)));
        assert_eq!(props.parameters.hello_time, Some(Millis(500)));
    }

    #[test]
    fn detailed_addresses() {
        let props: DummyProperties = serde_yaml::from_str(
            "addresses:
  - 10.0.0.1/24
  - 10.0.0.2/24: {lifetime: 0, label: dm0:1}
",
        )
        .unwrap();
        assert_eq!(props.common.addresses[0].address(), "10.0.0.1/24");
        assert_eq!(props.common.addresses[1].address(), "10.0.0.2/24");
        let options = props.common.addresses[1].options().unwrap();
        assert_eq!(options.lifetime.as_ref().map(ScalarText::as_str), Some("0"));
    }

    #[test]
    fn tunnel_keys_single_or_split() {
        let single: TunnelProperties =
            serde_yaml::from_str("mode: gre\nremote: 10.0.0.2\nkey: 1234").unwrap();
        assert_eq!(single.input_key(), Some("1234"));

        let split: TunnelProperties =
            serde_yaml::from_str("mode: gre\nremote: 10.0.0.2\nkeys: {input: 1, output: 2}").unwrap();
        assert_eq!(split.input_key(), Some("1"));
        assert_eq!(split.output_key(), Some("2"));
    }

    #[test]
    fn vrf_table_accepts_names() {
        let vrf: VrfProperties = serde_yaml::from_str("table: main").unwrap();
        assert_eq!(vrf.table, 254);
    }

    #[test]
    fn bare_openvswitch_key_selects_ovs() {
        let bridge: BridgeProperties = serde_yaml::from_str("openvswitch: {}").unwrap();
        assert!(bridge.common.ovs().is_some());

        let plain: BridgeProperties = serde_yaml::from_str("interfaces: []").unwrap();
        assert!(plain.common.ovs().is_none());
    }

    #[test]
    fn access_point_password_implies_psk() {
        let wifi: WifiProperties =
            serde_yaml::from_str("access-points: {home: {password: hunter22}, open: null}").unwrap();
        let aps: Vec<_> = wifi.access_points().collect();
        assert_eq!(aps.len(), 2);
        let home = aps.iter().find(|(ssid, _)| *ssid == "home").unwrap();
        assert_eq!(
            home.1.effective_auth().unwrap().effective_key_management(),
            KeyManagement::Psk
        );
        let open = aps.iter().find(|(ssid, _)| *ssid == "open").unwrap();
        assert!(open.1.effective_auth().is_none());
    }
}
