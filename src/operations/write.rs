//! Atomic artifact writer
//!
//! Every artifact is staged next to its target before any of them is
//! renamed into place, so a failure while staging leaves the previous
//! output untouched. Files from earlier runs that the current run no longer
//! produces are removed afterwards.

use crate::error::CompileError;
use crate::render::networkd::{NETWORK_DIR, UNIT_DIR, WPA_DIR};
use crate::render::nm::CONNECTION_DIR;
use crate::render::{ArtifactSet, NETWORKD_DROPIN_DIR};
use crate::system::{StagedFile, System};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A family of generated files: directory relative to the output root,
/// file name prefix and suffix
#[derive(Debug, Clone, Copy)]
struct Generated {
    dir: &'static str,
    prefix: &'static str,
    suffix: &'static str,
}

impl Generated {
    fn matches(&self, name: &str) -> bool {
        name.len() >= self.prefix.len() + self.suffix.len()
            && name.starts_with(self.prefix)
            && name.ends_with(self.suffix)
    }
}

/// Directory of [`crate::render::nm::CONF_PATH`]
const CONF_DIR: &str = "run/NetworkManager/conf.d";

const GENERATED: [Generated; 6] = [
    Generated { dir: NETWORK_DIR, prefix: "10-netplan-", suffix: "" },
    Generated { dir: UNIT_DIR, prefix: "netplan-", suffix: ".service" },
    Generated { dir: WPA_DIR, prefix: "wpa-", suffix: ".conf" },
    Generated { dir: CONNECTION_DIR, prefix: "netplan-", suffix: ".nmconnection" },
    Generated { dir: CONF_DIR, prefix: "netplan", suffix: ".conf" },
    Generated { dir: NETWORKD_DROPIN_DIR, prefix: "10-netplan-", suffix: ".conf" },
];

/// What a write changed on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct WriteSummary {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Previously generated files under `root` that `artifacts` does not contain
fn stale_files(system: &dyn System, root: &Path, artifacts: &ArtifactSet) -> Result<Vec<PathBuf>, CompileError> {
    let mut stale = Vec::new();
    for family in &GENERATED {
        let dir = root.join(family.dir);
        if !system.is_dir(&dir) {
            continue;
        }
        let entries = system.read_dir(&dir).map_err(|e| CompileError::io(&dir, e))?;
        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let relative = Path::new(family.dir).join(name);
            if system.is_file(&path) && family.matches(name) && !artifacts.contains(&relative) {
                stale.push(path);
            }
        }
    }
    stale.sort();
    stale.dedup();
    Ok(stale)
}

/// Write `artifacts` under `root` and remove stale generated files
///
/// # Errors
///
/// Returns an error if:
/// - A target directory cannot be created or a file cannot be staged; nothing
///   has been changed on disk in that case
/// - A staged file cannot be renamed into place
/// - A stale file cannot be removed
pub fn write_artifacts(system: &dyn System, root: &Path, artifacts: &ArtifactSet) -> Result<WriteSummary, CompileError> {
    let stale = stale_files(system, root, artifacts)?;

    let mut staged: Vec<Box<dyn StagedFile>> = Vec::with_capacity(artifacts.len());
    for (relative, artifact) in artifacts.iter() {
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            system
                .create_dir_all(parent)
                .map_err(|e| CompileError::io(parent, e))?;
        }
        let file = system
            .stage(&target, artifact.contents.as_bytes(), artifact.mode)
            .map_err(|e| CompileError::io(&target, e))?;
        debug!("Staged {} ({:o})", target.display(), artifact.mode);
        staged.push(file);
    }

    let mut summary = WriteSummary::default();
    for file in staged {
        let target = file.target().to_path_buf();
        file.commit().map_err(|e| CompileError::io(&target, e))?;
        summary.written.push(target);
    }

    for path in stale {
        debug!("Removing stale {}", path.display());
        system
            .remove_file(&path)
            .map_err(|e| CompileError::io(&path, e))?;
        summary.removed.push(path);
    }

    info!(
        "Wrote {} files under {}, removed {} stale files",
        summary.written.len(),
        root.display(),
        summary.removed.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockSystem;

    fn artifacts(entries: &[(&str, &str)]) -> ArtifactSet {
        let mut set = ArtifactSet::new();
        for (path, contents) in entries {
            set.insert(*path, (*contents).to_owned());
        }
        set
    }

    #[test]
    fn writes_with_modes_and_creates_directories() {
        let system = MockSystem::new();
        let mut set = artifacts(&[("run/systemd/network/10-netplan-eth0.network", "[Match]\n")]);
        set.insert_private("run/NetworkManager/system-connections/netplan-wl.nmconnection", "x\n".to_owned());

        let summary = write_artifacts(&system, Path::new("/out"), &set).unwrap();
        assert_eq!(summary.written.len(), 2);
        assert_eq!(
            system.file_contents("/out/run/systemd/network/10-netplan-eth0.network").as_deref(),
            Some("[Match]\n")
        );
        assert_eq!(
            system.file_mode("/out/run/NetworkManager/system-connections/netplan-wl.nmconnection"),
            Some(0o600)
        );
    }

    #[test]
    fn stale_generated_files_are_removed_and_others_kept() {
        let system = MockSystem::new()
            .with_file("/run/systemd/network/10-netplan-old.network", b"old")
            .unwrap()
            .with_file("/run/systemd/network/99-admin.network", b"mine")
            .unwrap()
            .with_file("/run/netplan/wpa-old.conf", b"old")
            .unwrap()
            .with_file("/run/netplan/netplan-input.yaml", b"network: {version: 2}")
            .unwrap();
        let set = artifacts(&[("run/systemd/network/10-netplan-eth0.network", "[Match]\n")]);

        let summary = write_artifacts(&system, Path::new("/"), &set).unwrap();
        assert_eq!(
            summary.removed,
            [
                PathBuf::from("/run/netplan/wpa-old.conf"),
                PathBuf::from("/run/systemd/network/10-netplan-old.network"),
            ]
        );
        assert!(system.file_contents("/run/systemd/network/99-admin.network").is_some());
        assert!(system.file_contents("/run/netplan/netplan-input.yaml").is_some());
    }

    #[test]
    fn staging_failure_changes_nothing() {
        let system = MockSystem::new()
            .with_file("/run/systemd/network/10-netplan-eth0.network", b"previous")
            .unwrap()
            .with_read_only_dir("/run/NetworkManager")
            .unwrap();
        let set = artifacts(&[
            ("run/systemd/network/10-netplan-eth0.network", "[Match]\nName=eth0\n"),
            ("run/NetworkManager/conf.d/netplan.conf", "[keyfile]\n"),
        ]);

        let err = write_artifacts(&system, Path::new("/"), &set).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            system.file_contents("/run/systemd/network/10-netplan-eth0.network").as_deref(),
            Some("previous")
        );
    }
}
