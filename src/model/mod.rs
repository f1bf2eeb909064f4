//! Typed device model
//!
//! Definitions are a closed sum over the eleven type sections. Each carries
//! its configuration ID, the backend it is rendered by and its key path in
//! the merged document, which diagnostics use for attribution.

pub mod builder;
pub mod graph;
pub mod properties;
pub mod values;

pub use builder::{BuildOutput, build_model};
pub use graph::{ResolvedModel, resolve};
pub use values::Backend;

use crate::config::KeyPath;
use core::fmt;
use properties::{
    BondProperties, BridgeProperties, CommonProperties, DummyProperties, EthernetProperties,
    GlobalOvs, ModemProperties, NmDeviceProperties, PhysicalProperties, TunnelProperties,
    VethProperties, VlanProperties, VrfProperties, WifiProperties,
};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Type section a definition was declared under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceType {
    Ethernet,
    Wifi,
    Modem,
    Bond,
    Bridge,
    Vlan,
    Vrf,
    Tunnel,
    Dummy,
    Veth,
    NmDevice,
}

/// Whether a device exists in hardware or is created at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Matched against existing hardware
    Physical,
    /// Created by the backend
    Virtual,
}

impl DeviceType {
    /// Every type, in section order
    pub const ALL: [Self; 11] = [
        Self::Ethernet,
        Self::Wifi,
        Self::Modem,
        Self::Bond,
        Self::Bridge,
        Self::Vlan,
        Self::Vrf,
        Self::Tunnel,
        Self::Dummy,
        Self::Veth,
        Self::NmDevice,
    ];

    /// Name of the section under `network`
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernets",
            Self::Wifi => "wifis",
            Self::Modem => "modems",
            Self::Bond => "bonds",
            Self::Bridge => "bridges",
            Self::Vlan => "vlans",
            Self::Vrf => "vrfs",
            Self::Tunnel => "tunnels",
            Self::Dummy => "dummy-devices",
            Self::Veth => "virtual-ethernets",
            Self::NmDevice => "nm-devices",
        }
    }

    /// Singular name used in messages
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Modem => "modem",
            Self::Bond => "bond",
            Self::Bridge => "bridge",
            Self::Vlan => "vlan",
            Self::Vrf => "vrf",
            Self::Tunnel => "tunnel",
            Self::Dummy => "dummy device",
            Self::Veth => "virtual ethernet",
            Self::NmDevice => "nm-device",
        }
    }

    #[must_use]
    pub const fn class(self) -> DeviceClass {
        match self {
            Self::Ethernet | Self::Wifi | Self::Modem => DeviceClass::Physical,
            Self::Bond
            | Self::Bridge
            | Self::Vlan
            | Self::Vrf
            | Self::Tunnel
            | Self::Dummy
            | Self::Veth
            | Self::NmDevice => DeviceClass::Virtual,
        }
    }

    /// Feature flag the whole section is gated on
    #[must_use]
    pub const fn feature(self) -> Option<&'static str> {
        match self {
            Self::Modem => Some("modems"),
            Self::Vrf => Some("vrf"),
            Self::Dummy => Some("dummy-devices"),
            Self::Veth => Some("veth"),
            Self::NmDevice => Some("nm-devices"),
            Self::Ethernet | Self::Wifi | Self::Bond | Self::Bridge | Self::Vlan | Self::Tunnel => {
                None
            }
        }
    }

    #[must_use]
    pub fn from_section(section: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.section() == section)
    }
}

impl fmt::Display for DeviceType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Type-specific properties of a definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Ethernet(EthernetProperties),
    Wifi(WifiProperties),
    Modem(ModemProperties),
    Bond(BondProperties),
    Bridge(BridgeProperties),
    Vlan(VlanProperties),
    Vrf(VrfProperties),
    Tunnel(TunnelProperties),
    Dummy(DummyProperties),
    Veth(VethProperties),
    NmDevice(NmDeviceProperties),
}

impl DeviceKind {
    /// Deserialize the property bag of a definition of the given type
    ///
    /// # Errors
    ///
    /// Returns an error if the subtree does not fit the type's properties.
    pub fn from_value(device_type: DeviceType, value: Value) -> Result<Self, serde_yaml::Error> {
        let value = if value.is_null() {
            Value::Mapping(serde_yaml::Mapping::new())
        } else {
            value
        };
        Ok(match device_type {
            DeviceType::Ethernet => Self::Ethernet(serde_yaml::from_value(value)?),
            DeviceType::Wifi => Self::Wifi(serde_yaml::from_value(value)?),
            DeviceType::Modem => Self::Modem(serde_yaml::from_value(value)?),
            DeviceType::Bond => Self::Bond(serde_yaml::from_value(value)?),
            DeviceType::Bridge => Self::Bridge(serde_yaml::from_value(value)?),
            DeviceType::Vlan => Self::Vlan(serde_yaml::from_value(value)?),
            DeviceType::Vrf => Self::Vrf(serde_yaml::from_value(value)?),
            DeviceType::Tunnel => Self::Tunnel(serde_yaml::from_value(value)?),
            DeviceType::Dummy => Self::Dummy(serde_yaml::from_value(value)?),
            DeviceType::Veth => Self::Veth(serde_yaml::from_value(value)?),
            DeviceType::NmDevice => Self::NmDevice(serde_yaml::from_value(value)?),
        })
    }

    #[must_use]
    pub const fn device_type(&self) -> DeviceType {
        match *self {
            Self::Ethernet(_) => DeviceType::Ethernet,
            Self::Wifi(_) => DeviceType::Wifi,
            Self::Modem(_) => DeviceType::Modem,
            Self::Bond(_) => DeviceType::Bond,
            Self::Bridge(_) => DeviceType::Bridge,
            Self::Vlan(_) => DeviceType::Vlan,
            Self::Vrf(_) => DeviceType::Vrf,
            Self::Tunnel(_) => DeviceType::Tunnel,
            Self::Dummy(_) => DeviceType::Dummy,
            Self::Veth(_) => DeviceType::Veth,
            Self::NmDevice(_) => DeviceType::NmDevice,
        }
    }

    #[must_use]
    pub const fn common(&self) -> &CommonProperties {
        match *self {
            Self::Ethernet(ref p) => &p.common,
            Self::Wifi(ref p) => &p.common,
            Self::Modem(ref p) => &p.common,
            Self::Bond(ref p) => &p.common,
            Self::Bridge(ref p) => &p.common,
            Self::Vlan(ref p) => &p.common,
            Self::Vrf(ref p) => &p.common,
            Self::Tunnel(ref p) => &p.common,
            Self::Dummy(ref p) => &p.common,
            Self::Veth(ref p) => &p.common,
            Self::NmDevice(ref p) => &p.common,
        }
    }

    #[must_use]
    pub const fn physical(&self) -> Option<&PhysicalProperties> {
        match *self {
            Self::Ethernet(ref p) => Some(&p.physical),
            Self::Wifi(ref p) => Some(&p.physical),
            Self::Modem(ref p) => Some(&p.physical),
            Self::Bond(_)
            | Self::Bridge(_)
            | Self::Vlan(_)
            | Self::Vrf(_)
            | Self::Tunnel(_)
            | Self::Dummy(_)
            | Self::Veth(_)
            | Self::NmDevice(_) => None,
        }
    }
}

/// One device definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetDefinition {
    /// Configuration ID, unique across all sections
    pub id: String,
    /// Backend rendering this definition after renderer inheritance
    pub backend: Backend,
    /// `network.<section>.<id>`
    pub key_path: KeyPath,
    pub kind: DeviceKind,
}

impl NetDefinition {
    #[must_use]
    #[inline]
    pub const fn device_type(&self) -> DeviceType {
        self.kind.device_type()
    }

    #[must_use]
    #[inline]
    pub const fn class(&self) -> DeviceClass {
        self.device_type().class()
    }

    #[must_use]
    #[inline]
    pub const fn common(&self) -> &CommonProperties {
        self.kind.common()
    }

    #[must_use]
    #[inline]
    pub const fn physical(&self) -> Option<&PhysicalProperties> {
        self.kind.physical()
    }

    /// Key path of a property of this definition
    #[must_use]
    pub fn path<S: Into<String>>(&self, property: S) -> KeyPath {
        self.key_path.child(property)
    }

    /// Kernel interface name, when it is known at compile time
    ///
    /// Virtual devices are named by their ID. Physical devices are named by
    /// `set-name`, by a literal `match.name`, or by their ID when they have
    /// no match rules at all.
    #[must_use]
    pub fn interface_name(&self) -> Option<&str> {
        let Some(physical) = self.physical() else {
            if let DeviceKind::NmDevice(ref props) = self.kind {
                return props
                    .common
                    .networkmanager
                    .as_ref()
                    .and_then(|nm| nm.device.as_deref());
            }
            return Some(self.id.as_str());
        };
        if let Some(name) = physical.set_name.as_deref() {
            return Some(name);
        }
        match physical.match_config.as_ref() {
            None => Some(self.id.as_str()),
            Some(m) if m.is_empty() => Some(self.id.as_str()),
            Some(m) if m.macaddress.is_none() && m.driver.is_none() => m
                .name
                .as_deref()
                .filter(|name| !values::is_glob(name)),
            Some(_) => None,
        }
    }

    /// Member IDs of a bond, bridge or VRF
    #[must_use]
    pub fn members(&self) -> &[String] {
        match self.kind {
            DeviceKind::Bond(ref p) => &p.interfaces,
            DeviceKind::Bridge(ref p) => &p.interfaces,
            DeviceKind::Vrf(ref p) => &p.interfaces,
            DeviceKind::Ethernet(_)
            | DeviceKind::Wifi(_)
            | DeviceKind::Modem(_)
            | DeviceKind::Vlan(_)
            | DeviceKind::Tunnel(_)
            | DeviceKind::Dummy(_)
            | DeviceKind::Veth(_)
            | DeviceKind::NmDevice(_) => &[],
        }
    }

    /// Parent ID: a VLAN or tunnel link, or the physical function of a VF
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        match self.kind {
            DeviceKind::Vlan(ref p) => Some(&p.link),
            DeviceKind::Tunnel(ref p) => p.link.as_deref(),
            DeviceKind::Ethernet(ref p) => p.link.as_deref(),
            DeviceKind::Wifi(_)
            | DeviceKind::Modem(_)
            | DeviceKind::Bond(_)
            | DeviceKind::Bridge(_)
            | DeviceKind::Vrf(_)
            | DeviceKind::Dummy(_)
            | DeviceKind::Veth(_)
            | DeviceKind::NmDevice(_) => None,
        }
    }

    /// Whether this bond or bridge declares Open vSwitch settings
    #[must_use]
    pub fn declares_openvswitch(&self) -> bool {
        matches!(self.kind, DeviceKind::Bond(_) | DeviceKind::Bridge(_))
            && self.common().ovs().is_some()
    }
}

/// All definitions of a merged document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkModel {
    /// `network.renderer`
    pub renderer: Option<Backend>,
    /// `network.openvswitch`
    pub openvswitch: Option<GlobalOvs>,
    pub definitions: BTreeMap<String, NetDefinition>,
    /// IDs declared in the document whose definitions failed validation;
    /// references to them still resolve
    pub placeholders: BTreeMap<String, DeviceType>,
}

impl NetworkModel {
    /// Whether `id` names a definition, valid or not
    #[must_use]
    pub fn is_declared(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.placeholders.contains_key(id)
    }

    /// Open vSwitch patch port names declared globally
    pub fn patch_ports(&self) -> impl Iterator<Item = &str> {
        self.openvswitch
            .iter()
            .flat_map(GlobalOvs::patch_ports)
            .flat_map(|(a, b)| [a, b])
    }
}
