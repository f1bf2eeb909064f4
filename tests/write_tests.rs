//! Writing generated files to a real directory tree

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "This is a test module")]
mod tests {

use netplanc::config::CompileContext;
use netplanc::operations::{compile, write_artifacts};
use netplanc::system::{MockSystem, RealSystem};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(root: &Path, name: &str, text: &str) {
    let dir = root.join("etc/netplan");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), text).unwrap();
}

fn generate(root: &Path) {
    let system = RealSystem::new();
    let compilation = compile(&system, root, &CompileContext::default()).unwrap();
    write_artifacts(&system, root, &compilation.artifacts).unwrap();
}

#[test]
fn regenerating_replaces_stale_output() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_config(root, "01.yaml", "network: {version: 2, ethernets: {eth0: {dhcp4: true}}}\n");
    generate(root);
    assert!(root.join("run/systemd/network/10-netplan-eth0.network").exists());

    fs::write(root.join("run/systemd/network/99-local.network"), "[Match]\n").unwrap();
    write_config(root, "01.yaml", "network: {version: 2, ethernets: {eth1: {dhcp6: true}}}\n");
    generate(root);

    assert!(!root.join("run/systemd/network/10-netplan-eth0.network").exists());
    let network = fs::read_to_string(root.join("run/systemd/network/10-netplan-eth1.network")).unwrap();
    assert!(network.contains("DHCP=ipv6\n"));
    assert!(root.join("run/systemd/network/99-local.network").exists());
    assert!(root.join("etc/netplan/01.yaml").exists());
}

#[test]
fn identical_input_writes_identical_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_config(
        root,
        "01.yaml",
        "network:
  version: 2
  renderer: NetworkManager
  ethernets: {eth0: {addresses: [192.0.2.10/24]}}
",
    );
    generate(root);
    let path = root.join("run/NetworkManager/system-connections/netplan-eth0.nmconnection");
    let first = fs::read_to_string(&path).unwrap();
    generate(root);
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
}

#[cfg(unix)]
#[test]
fn secrets_are_owner_only() {
    use std::os::unix::fs::PermissionsExt as _;

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_config(
        root,
        "01.yaml",
        "network:
  version: 2
  wifis:
    wlan0:
      access-points: {home: {password: correct-horse}}
      dhcp4: true
",
    );
    generate(root);
    let mode = fs::metadata(root.join("run/netplan/wpa-wlan0.conf"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn failed_write_leaves_previous_output() {
    let system = MockSystem::new()
        .with_file(
            "/etc/netplan/01.yaml",
            b"network: {version: 2, renderer: NetworkManager, ethernets: {eth0: {dhcp4: true}}, bridges: {br0: {renderer: networkd}}}\n",
        )
        .unwrap()
        .with_file("/run/systemd/network/10-netplan-old.network", b"previous")
        .unwrap()
        .with_read_only_dir("/run/systemd")
        .unwrap();
    let compilation = compile(&system, Path::new("/"), &CompileContext::default()).unwrap();

    let err = write_artifacts(&system, Path::new("/"), &compilation.artifacts).unwrap_err();
    assert_eq!(err.exit_code(), 3);
    assert!(system.files_under("/run/NetworkManager").is_empty());
    assert_eq!(
        system.file_contents("/run/systemd/network/10-netplan-old.network").as_deref(),
        Some("previous")
    );
}

}
