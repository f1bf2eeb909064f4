//! Scalar value types shared by the property structs
//!
//! YAML 1.1 booleans, durations with unit suffixes, routing table names,
//! addresses and the string enums of the property surface.

use core::fmt;
use core::net::IpAddr;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Declare a closed set of spellings as an enum with serde names and `as_str`
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Spelling used in the YAML document
            #[must_use]
            #[inline]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Backend that renders a definition
    Backend {
        Networkd => "networkd",
        NetworkManager => "NetworkManager",
    }
);

string_enum!(DhcpIdentifier { Mac => "mac", Duid => "duid" });
string_enum!(AddressGeneration { Eui64 => "eui64", StablePrivacy => "stable-privacy" });
string_enum!(LinkLocal { Ipv4 => "ipv4", Ipv6 => "ipv6" });
string_enum!(ActivationMode { Manual => "manual", Off => "off" });
string_enum!(
    OptionalAddress {
        Ipv4LinkLocal => "ipv4-ll",
        Ipv6Ra => "ipv6-ra",
        Dhcp4 => "dhcp4",
        Dhcp6 => "dhcp6",
        Static => "static",
    }
);
string_enum!(
    RouteType {
        Unicast => "unicast",
        Anycast => "anycast",
        Blackhole => "blackhole",
        Broadcast => "broadcast",
        Local => "local",
        Multicast => "multicast",
        Nat => "nat",
        Prohibit => "prohibit",
        Throw => "throw",
        Unreachable => "unreachable",
        Xresolve => "xresolve",
    }
);
string_enum!(RouteScope { Global => "global", Link => "link", Host => "host" });
string_enum!(EswitchMode { Switchdev => "switchdev", Legacy => "legacy" });
string_enum!(InfinibandMode { Datagram => "datagram", Connected => "connected" });
string_enum!(
    KeyManagement {
        None => "none",
        Psk => "psk",
        Eap => "eap",
        EapSha256 => "eap-sha256",
        EapSuiteB192 => "eap-suite-b-192",
        Sae => "sae",
        Ieee8021x => "802.1x",
    }
);
string_enum!(EapMethod { Tls => "tls", Peap => "peap", Ttls => "ttls", Leap => "leap", Pwd => "pwd" });
string_enum!(ApMode { Infrastructure => "infrastructure", Ap => "ap", Adhoc => "adhoc" });
string_enum!(WifiBand { FiveGhz => "5GHz", TwoPointFourGhz => "2.4GHz" });
string_enum!(
    BondMode {
        BalanceRr => "balance-rr",
        ActiveBackup => "active-backup",
        BalanceXor => "balance-xor",
        Broadcast => "broadcast",
        Lacp => "802.3ad",
        BalanceTlb => "balance-tlb",
        BalanceAlb => "balance-alb",
    }
);
string_enum!(LacpRate { Slow => "slow", Fast => "fast" });
string_enum!(
    HashPolicy {
        Layer2 => "layer2",
        Layer34 => "layer3+4",
        Layer23 => "layer2+3",
        Encap23 => "encap2+3",
        Encap34 => "encap3+4",
    }
);
string_enum!(AdSelect { Stable => "stable", Bandwidth => "bandwidth", Count => "count" });
string_enum!(
    ArpValidate {
        None => "none",
        Active => "active",
        Backup => "backup",
        All => "all",
        Filter => "filter",
        FilterActive => "filter_active",
        FilterBackup => "filter_backup",
    }
);
string_enum!(ArpAllTargets { Any => "any", All => "all" });
string_enum!(FailOverMacPolicy { None => "none", Active => "active", Follow => "follow" });
string_enum!(PrimaryReselect { Always => "always", Better => "better", Failure => "failure" });
string_enum!(
    TunnelMode {
        Sit => "sit",
        Gre => "gre",
        Ip6Gre => "ip6gre",
        Ipip => "ipip",
        Ipip6 => "ipip6",
        Ip6Ip6 => "ip6ip6",
        Vti => "vti",
        Vti6 => "vti6",
        Wireguard => "wireguard",
        GreTap => "gretap",
        Ip6GreTap => "ip6gretap",
        Vxlan => "vxlan",
        Isatap => "isatap",
    }
);
string_enum!(OvsLacp { Active => "active", Passive => "passive", Off => "off" });
string_enum!(OvsFailMode { Secure => "secure", Standalone => "standalone" });
string_enum!(OvsConnectionMode { InBand => "in-band", OutOfBand => "out-of-band" });
string_enum!(
    OpenFlow {
        V10 => "OpenFlow10",
        V11 => "OpenFlow11",
        V12 => "OpenFlow12",
        V13 => "OpenFlow13",
        V14 => "OpenFlow14",
        V15 => "OpenFlow15",
    }
);

impl TunnelMode {
    /// Whether endpoints of this mode are IPv6 addresses
    #[must_use]
    pub const fn is_ipv6(self) -> bool {
        matches!(
            self,
            Self::Ip6Gre | Self::Ip6Ip6 | Self::Ipip6 | Self::Vti6 | Self::Ip6GreTap
        )
    }

    /// Whether this mode takes input/output keys
    #[must_use]
    pub const fn takes_keys(self) -> bool {
        matches!(
            self,
            Self::Gre | Self::Ip6Gre | Self::GreTap | Self::Ip6GreTap | Self::Vti | Self::Vti6
        )
    }
}

/// Parse one of the YAML 1.1 boolean spellings
#[must_use]
pub fn parse_yaml_bool(text: &str) -> Option<bool> {
    match text {
        "y" | "Y" | "yes" | "Yes" | "YES" | "true" | "True" | "TRUE" | "on" | "On" | "ON" => {
            Some(true)
        }
        "n" | "N" | "no" | "No" | "NO" | "false" | "False" | "FALSE" | "off" | "Off" | "OFF" => {
            Some(false)
        }
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBool {
    Bool(bool),
    Text(String),
}

/// Deserialize an optional boolean accepting YAML 1.1 spellings
///
/// # Errors
///
/// Returns an error if the value is neither a boolean nor a known spelling.
pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Option::<RawBool>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawBool::Bool(b)) => Ok(Some(b)),
        Some(RawBool::Text(text)) => parse_yaml_bool(&text)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid boolean '{text}'"))),
    }
}

/// Deserialize an optional `true`/`false`/`route` use-domains setting
///
/// # Errors
///
/// Returns an error for any other value.
pub fn opt_use_domains<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<UseDomains>, D::Error> {
    match Option::<RawBool>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawBool::Bool(b)) => Ok(Some(UseDomains::from(b))),
        Some(RawBool::Text(text)) if text == "route" => Ok(Some(UseDomains::Route)),
        Some(RawBool::Text(text)) => parse_yaml_bool(&text)
            .map(|b| Some(UseDomains::from(b)))
            .ok_or_else(|| de::Error::custom(format!("invalid use-domains value '{text}'"))),
    }
}

/// DHCP `use-domains` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UseDomains {
    Yes,
    No,
    Route,
}

impl From<bool> for UseDomains {
    #[inline]
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

impl UseDomains {
    /// networkd spelling
    #[must_use]
    pub const fn as_networkd(self) -> &'static str {
        match self {
            Self::Yes => "true",
            Self::No => "false",
            Self::Route => "route",
        }
    }
}

/// A time span normalised to milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Millis(pub u64);

impl Millis {
    /// Whole seconds, if the span is a whole number of seconds
    #[must_use]
    #[inline]
    pub const fn whole_seconds(self) -> Option<u64> {
        if self.0 % 1000 == 0 { Some(self.0 / 1000) } else { None }
    }
}

static DURATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9]+) ?(ms|s|m|h)?$").ok());

/// Parse `<n>[ms|s|m|h]`; bare numbers are in units of `default_unit_ms`
#[must_use]
pub fn parse_duration(text: &str, default_unit_ms: u64) -> Option<Millis> {
    let captures = DURATION.as_ref()?.captures(text.trim())?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = match captures.get(2).map(|m| m.as_str()) {
        Some("ms") => 1,
        Some("s") => 1000,
        Some("m") => 60_000,
        Some("h") => 3_600_000,
        _ => default_unit_ms,
    };
    amount.checked_mul(unit).map(Millis)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSpan {
    Number(u64),
    Text(String),
}

fn opt_span<'de, D: Deserializer<'de>>(deserializer: D, default_unit_ms: u64) -> Result<Option<Millis>, D::Error> {
    match Option::<RawSpan>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawSpan::Number(n)) => n
            .checked_mul(default_unit_ms)
            .map(|ms| Some(Millis(ms)))
            .ok_or_else(|| de::Error::custom(format!("duration {n} is too large"))),
        Some(RawSpan::Text(text)) => parse_duration(&text, default_unit_ms)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid duration '{text}'"))),
    }
}

/// Deserialize a duration whose bare numbers are milliseconds
///
/// # Errors
///
/// Returns an error for malformed durations.
pub fn opt_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Millis>, D::Error> {
    opt_span(deserializer, 1)
}

/// Deserialize a duration whose bare numbers are seconds
///
/// # Errors
///
/// Returns an error for malformed durations.
pub fn opt_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Millis>, D::Error> {
    opt_span(deserializer, 1000)
}

/// Numeric value of a reserved routing table name
#[must_use]
pub fn table_number(name: &str) -> Option<u32> {
    match name {
        "default" => Some(253),
        "main" => Some(254),
        "local" => Some(255),
        _ => name.parse().ok(),
    }
}

/// Deserialize a routing table given as a number or a reserved name
///
/// # Errors
///
/// Returns an error for unknown names.
pub fn opt_table<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTable {
        Number(u32),
        Name(String),
    }

    match Option::<RawTable>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTable::Number(n)) => Ok(Some(n)),
        Some(RawTable::Name(name)) => table_number(&name)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("unknown routing table '{name}'"))),
    }
}

/// A scalar read as text regardless of its YAML type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScalarText(pub String);

impl ScalarText {
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScalarText {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawScalar {
            Bool(bool),
            Unsigned(u64),
            Signed(i64),
            Float(f64),
            Text(String),
        }

        Ok(Self(match RawScalar::deserialize(deserializer)? {
            RawScalar::Bool(b) => b.to_string(),
            RawScalar::Unsigned(n) => n.to_string(),
            RawScalar::Signed(n) => n.to_string(),
            RawScalar::Float(n) => n.to_string(),
            RawScalar::Text(s) => s,
        }))
    }
}

/// Backend-native settings applied verbatim
///
/// Keys are `section.key` pairs in the backend's own vocabulary; values are
/// always strings. Entries keep a stable (sorted) order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Passthrough(BTreeMap<String, String>);

impl Passthrough {
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries split into `(section, key, value)`
    ///
    /// A key without a dot has an empty section.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.0.iter().map(|(key, value)| {
            let (section, name) = key.split_once('.').unwrap_or(("", key.as_str()));
            (section, name, value.as_str())
        })
    }
}

impl<'de> Deserialize<'de> for Passthrough {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, ScalarText>::deserialize(deserializer)?;
        Ok(Self(raw.into_iter().map(|(k, v)| (k, v.0)).collect()))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Passthrough {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        )
    }
}

/// An IP address with prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cidr {
    pub address: IpAddr,
    pub prefix: u8,
}

impl Cidr {
    #[must_use]
    #[inline]
    pub const fn is_ipv6(&self) -> bool {
        self.address.is_ipv6()
    }
}

impl fmt::Display for Cidr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// Parse `address/prefix`
///
/// # Errors
///
/// Returns a message if the address or prefix is malformed or out of range.
pub fn parse_cidr(text: &str) -> Result<Cidr, String> {
    let (address, prefix) = text
        .split_once('/')
        .ok_or_else(|| format!("address '{text}' is missing a /prefixlength"))?;
    let address: IpAddr = address
        .parse()
        .map_err(|_| format!("malformed address '{text}'"))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| format!("invalid prefix length in '{text}'"))?;
    let max = if address.is_ipv6() { 128 } else { 32 };
    if prefix > max {
        return Err(format!("invalid prefix length in '{text}'"));
    }
    Ok(Cidr { address, prefix })
}

/// Parse a route destination: `default`, a CIDR, or a bare address
///
/// `default` yields `None` for the family, which the caller resolves from
/// the gateway.
///
/// # Errors
///
/// Returns a message for malformed destinations.
pub fn parse_destination(text: &str) -> Result<Option<Cidr>, String> {
    if text == "default" {
        return Ok(None);
    }
    if text.contains('/') {
        return parse_cidr(text).map(Some);
    }
    let address: IpAddr = text
        .parse()
        .map_err(|_| format!("malformed route destination '{text}'"))?;
    let prefix = if address.is_ipv6() { 128 } else { 32 };
    Ok(Some(Cidr { address, prefix }))
}

/// Whether a destination names the default route of its family, in any
/// spelling with a zero prefix length
#[must_use]
pub fn is_default_destination(text: &str) -> bool {
    parse_destination(text).is_ok_and(|destination| destination.is_none_or(|cidr| cidr.prefix == 0))
}

static INTERFACE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^/\s:]{1,15}$").ok());

/// Whether `name` is usable as a kernel interface name
#[must_use]
pub fn is_interface_name(name: &str) -> bool {
    INTERFACE_NAME.as_ref().is_some_and(|re| re.is_match(name))
}

/// Whether a match pattern is a shell glob rather than a literal name
#[must_use]
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
