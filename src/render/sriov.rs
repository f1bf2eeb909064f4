//! SR-IOV virtual function rebind unit
//!
//! A physical function that changes its embedded-switch mode with
//! `delay-virtual-functions-rebind` leaves its VFs unbound until the mode
//! change is done; one unit rebinds them all once the network is up.

use crate::model::{DeviceKind, NetDefinition};
use crate::render::ini::IniFile;
use crate::render::networkd::UNIT_DIR;
use crate::render::{
    ArtifactSet, RenderContext, RenderError, Renderer, Unsupported, escape_unit_component,
    wanted_by_networkd,
};

pub const REBIND_UNIT: &str = "netplan-sriov-rebind.service";
pub const REBIND_COMMAND: &str = "/usr/sbin/netplan rebind";

#[derive(Debug, Default)]
pub struct SriovRenderer {
    /// Interface names of physical functions to rebind, in render order
    functions: Vec<String>,
}

impl SriovRenderer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for SriovRenderer {
    fn name(&self) -> &'static str {
        "sriov"
    }

    fn owns(&self, def: &NetDefinition, _ctx: &RenderContext<'_>) -> bool {
        matches!(
            def.kind,
            DeviceKind::Ethernet(ref props)
                if props.delay_virtual_functions_rebind == Some(true)
                    && props.embedded_switch_mode.is_some()
        )
    }

    fn render(
        &mut self,
        def: &NetDefinition,
        _ctx: &RenderContext<'_>,
        _out: &mut ArtifactSet,
    ) -> Result<(), RenderError> {
        match def.interface_name() {
            Some(name) => {
                self.functions.push(name.to_owned());
                Ok(())
            }
            None => {
                let mut unsupported = Unsupported::default();
                unsupported.push(
                    def,
                    "delay-virtual-functions-rebind",
                    "rebinding virtual functions needs a fixed interface name (set-name or match.name)"
                        .to_owned(),
                );
                unsupported.finish()
            }
        }
    }

    fn finish(&mut self, _ctx: &RenderContext<'_>, out: &mut ArtifactSet) -> Result<(), RenderError> {
        if self.functions.is_empty() {
            return Ok(());
        }
        let mut unit = IniFile::new();
        let section = unit.section("Unit");
        section
            .push("Description", "(Re-)bind SR-IOV Virtual Functions to their driver")
            .push("After", "network.target");
        for name in &self.functions {
            section.push(
                "After",
                format!("sys-subsystem-net-devices-{}.device", escape_unit_component(name)),
            );
        }
        unit.section("Service")
            .push("Type", "oneshot")
            .push("ExecStart", format!("{REBIND_COMMAND} {}", self.functions.join(" ")));
        out.insert(format!("{UNIT_DIR}/{REBIND_UNIT}"), unit.render());
        wanted_by_networkd(out, "sriov", &[REBIND_UNIT.to_owned()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileContext;
    use crate::render::render_text;

    #[test]
    fn rebind_unit_lists_physical_functions() {
        let set = render_text(
            "network:
  version: 2
  ethernets:
    enp1s0:
      virtual-function-count: 2
      embedded-switch-mode: switchdev
      delay-virtual-functions-rebind: true
    enp2s0:
      embedded-switch-mode: legacy
      delay-virtual-functions-rebind: true
    vf0: {link: enp1s0}
",
            &CompileContext::default(),
        )
        .unwrap();
        let unit = set.contents(format!("{UNIT_DIR}/{REBIND_UNIT}")).unwrap();
        assert_eq!(
            unit,
            "[Unit]
Description=(Re-)bind SR-IOV Virtual Functions to their driver
After=network.target
After=sys-subsystem-net-devices-enp1s0.device
After=sys-subsystem-net-devices-enp2s0.device

[Service]
Type=oneshot
ExecStart=/usr/sbin/netplan rebind enp1s0 enp2s0
"
        );
        let link = set.contents("run/systemd/network/10-netplan-enp1s0.link").unwrap();
        assert!(link.contains("SR-IOVVirtualFunctions=2\n"));
    }

    #[test]
    fn no_unit_without_delayed_rebind() {
        let set = render_text(
            "network:
  version: 2
  ethernets:
    enp1s0: {virtual-function-count: 2}
",
            &CompileContext::default(),
        )
        .unwrap();
        assert!(!set.contains(format!("{UNIT_DIR}/{REBIND_UNIT}")));
    }

    #[test]
    fn unnamed_function_cannot_be_rebound() {
        let err = render_text(
            "network:
  version: 2
  ethernets:
    pf:
      match: {driver: mlx5_core}
      embedded-switch-mode: switchdev
      delay-virtual-functions-rebind: true
",
            &CompileContext::default(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.diagnostics()[0].key_path.to_string(),
            "network.ethernets.pf.delay-virtual-functions-rebind"
        );
    }
}
