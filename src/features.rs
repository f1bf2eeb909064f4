//! Feature and capability registry
//!
//! A static table of optional behaviours keyed by string flags. The
//! validator refuses properties whose flag is not enabled, and the
//! NetworkManager renderer checks capabilities against the target version.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeSet;

/// One optional behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Feature {
    pub name: &'static str,
    pub description: &'static str,
    pub compiled_in: bool,
}

/// Every known feature flag
pub const FEATURES: &[Feature] = &[
    Feature {
        name: "activation-mode",
        description: "Manual or disabled link activation",
        compiled_in: true,
    },
    Feature {
        name: "dhcp-use-domains",
        description: "use-domains in DHCP overrides",
        compiled_in: true,
    },
    Feature {
        name: "dummy-devices",
        description: "dummy-devices section",
        compiled_in: true,
    },
    Feature {
        name: "eswitch-mode",
        description: "embedded-switch-mode and delayed VF rebind on SR-IOV PFs",
        compiled_in: cfg!(feature = "sriov"),
    },
    Feature {
        name: "infiniband",
        description: "IPoIB infiniband-mode on ethernets",
        compiled_in: true,
    },
    Feature {
        name: "ipv6-mtu",
        description: "ipv6-mtu property",
        compiled_in: true,
    },
    Feature {
        name: "link-local",
        description: "Selecting link-local address families",
        compiled_in: true,
    },
    Feature {
        name: "modems",
        description: "modems section (GSM/CDMA)",
        compiled_in: true,
    },
    Feature {
        name: "nm-devices",
        description: "nm-devices passthrough placeholders",
        compiled_in: true,
    },
    Feature {
        name: "openvswitch",
        description: "Open vSwitch bridges, bonds and fake VLAN bridges",
        compiled_in: cfg!(feature = "openvswitch"),
    },
    Feature {
        name: "regulatory-domain",
        description: "Wireless regulatory-domain property",
        compiled_in: true,
    },
    Feature {
        name: "sriov",
        description: "SR-IOV virtual functions",
        compiled_in: cfg!(feature = "sriov"),
    },
    Feature {
        name: "veth",
        description: "virtual-ethernets section",
        compiled_in: true,
    },
    Feature {
        name: "vrf",
        description: "vrfs section",
        compiled_in: true,
    },
    Feature {
        name: "vxlan",
        description: "VXLAN tunnels",
        compiled_in: true,
    },
    Feature {
        name: "wireguard",
        description: "WireGuard tunnels",
        compiled_in: cfg!(feature = "wireguard"),
    },
];

/// Set of enabled feature flags for one compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    enabled: BTreeSet<&'static str>,
}

impl FeatureSet {
    /// Every feature compiled into this build
    #[must_use]
    pub fn compiled() -> Self {
        Self {
            enabled: FEATURES
                .iter()
                .filter(|f| f.compiled_in)
                .map(|f| f.name)
                .collect(),
        }
    }

    /// This set with one flag turned off
    ///
    /// Unknown names are ignored.
    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.enabled.retain(|enabled| *enabled != name);
        self
    }

    /// Whether a flag is enabled
    #[must_use]
    #[inline]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Enabled flags in name order
    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.enabled.iter().copied()
    }
}

impl Default for FeatureSet {
    #[inline]
    fn default() -> Self {
        Self::compiled()
    }
}

/// Look up a feature by name
#[must_use]
pub fn lookup(name: &str) -> Option<&'static Feature> {
    FEATURES.iter().find(|f| f.name == name)
}

/// A `major.minor.patch` backend version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    #[must_use]
    #[inline]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = |label: &str, required: bool| -> Result<u32, String> {
            match parts.next() {
                Some(part) => part
                    .parse()
                    .map_err(|_| format!("Invalid {label} version component in '{s}'")),
                None if required => Err(format!("Invalid version '{s}': expected X.Y[.Z]")),
                None => Ok(0),
            }
        };
        let major = next("major", true)?;
        let minor = next("minor", true)?;
        let patch = next("patch", false)?;
        if parts.next().is_some() {
            return Err(format!("Invalid version '{s}': expected X.Y[.Z]"));
        }
        Ok(Self::new(major, minor, patch))
    }
}

/// NetworkManager version assumed when none is configured
pub const DEFAULT_NM_VERSION: Version = Version::new(1, 46, 0);

/// NetworkManager settings that only exist from some version on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NmCapability {
    OnLinkRoutes,
    RoutingRules,
    Vrf,
    Veth,
}

impl NmCapability {
    /// First NetworkManager release supporting this capability
    #[must_use]
    pub const fn minimum_version(self) -> Version {
        match self {
            Self::OnLinkRoutes | Self::RoutingRules => Version::new(1, 18, 0),
            Self::Vrf => Version::new(1, 24, 0),
            Self::Veth => Version::new(1, 30, 0),
        }
    }

    /// Human-readable name used in diagnostics
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OnLinkRoutes => "on-link routes",
            Self::RoutingRules => "routing policy rules",
            Self::Vrf => "VRF devices",
            Self::Veth => "virtual ethernet pairs",
        }
    }
}
