use crate::config::CompileContext;
use crate::features::{FeatureSet, Version, lookup};
use anyhow::bail;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Command-line arguments for netplanc
#[derive(Parser, Debug, Clone)]
#[command(name = "netplanc")]
#[command(about = "Compile netplan YAML into systemd-networkd and NetworkManager configuration")]
#[command(long_about = None)]
#[command(version)]
pub struct Args {
    /// Root directory holding {lib,etc,run}/netplan
    #[arg(long, value_name = "DIR", env = "NETPLANC_ROOT_DIR", default_value = "/")]
    pub root_dir: PathBuf,

    /// Write generated files under this directory instead of the root directory
    #[arg(long, value_name = "DIR", env = "NETPLANC_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print the generated files instead of writing them
    #[arg(long, conflicts_with_all = ["dump", "features"])]
    pub dry_run: bool,

    /// Print the merged configuration as YAML
    #[arg(long, conflicts_with_all = ["dry_run", "features"])]
    pub dump: bool,

    /// Print the enabled feature flags
    #[arg(long, conflicts_with_all = ["dry_run", "dump"])]
    pub features: bool,

    /// NetworkManager version the keyfiles are generated for
    #[arg(long, value_name = "X.Y.Z", env = "NETPLANC_NM_VERSION")]
    pub nm_version: Option<Version>,

    /// Turn off a feature flag (can be specified multiple times)
    #[arg(long = "disable-feature", value_name = "FLAG")]
    pub disable_features: Vec<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Compile context selected by the feature and version flags
    ///
    /// # Errors
    ///
    /// Returns an error if a disabled flag is not a known feature.
    pub fn compile_context(&self) -> anyhow::Result<CompileContext> {
        let mut features = FeatureSet::compiled();
        for name in &self.disable_features {
            if lookup(name).is_none() {
                bail!("Unknown feature flag '{name}' (see --features)");
            }
            features = features.without(name);
        }
        let ctx = CompileContext::new(features);
        Ok(match self.nm_version {
            Some(version) => ctx.with_nm_version(version),
            None => ctx,
        })
    }

    /// Directory generated files are written under
    #[must_use]
    pub fn output_root(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.root_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(core::iter::once("netplanc").chain(args.iter().copied()))
    }

    #[test]
    fn output_defaults_to_root() {
        let args = parse(&["--root-dir", "/tmp/r"]).unwrap();
        assert_eq!(args.output_root(), Path::new("/tmp/r"));
        let args = parse(&["--root-dir", "/tmp/r", "--output-dir", "/tmp/o"]).unwrap();
        assert_eq!(args.output_root(), Path::new("/tmp/o"));
    }

    #[test]
    fn modes_conflict() {
        assert!(parse(&["--dry-run", "--dump"]).is_err());
        assert!(parse(&["--features", "--dry-run"]).is_err());
    }

    #[test]
    fn context_from_flags() {
        let args = parse(&["--nm-version", "1.22", "--disable-feature", "vrf"]).unwrap();
        let ctx = args.compile_context().unwrap();
        assert_eq!(ctx.nm_version, Version::new(1, 22, 0));
        assert!(!ctx.features.is_enabled("vrf"));
        assert!(ctx.features.is_enabled("vxlan"));
    }

    #[test]
    fn unknown_feature_is_rejected() {
        let args = parse(&["--disable-feature", "teleport"]).unwrap();
        let err = args.compile_context().unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn malformed_version_is_a_usage_error() {
        assert!(parse(&["--nm-version", "one.two"]).is_err());
    }
}
