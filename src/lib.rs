//! `netplanc` - a compiler from declarative netplan YAML to backend
//! network configuration
//!
//! Sources under `{lib,etc,run}/netplan` are merged by rank, validated,
//! resolved into a device graph and rendered into systemd-networkd units,
//! NetworkManager keyfiles, Open vSwitch and SR-IOV helper services.

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod operations;
pub mod render;
pub mod system;

use anyhow::{Context as _, Result};
use cli::Args;
use features::FEATURES;
use operations::{compile, write_artifacts};
use std::io::Write;
use system::System;

/// Main entry point for the netplanc library
///
/// Output of the print modes goes to `out`; everything else is logged.
///
/// # Errors
///
/// Returns an error if the arguments select an unknown feature, compilation
/// fails, the generated files cannot be written or `out` cannot be written to.
pub fn run<W: Write>(args: &Args, system: &dyn System, out: &mut W) -> Result<()> {
    let ctx = args.compile_context()?;

    if args.features {
        for feature in FEATURES {
            let state = if ctx.features.is_enabled(feature.name) {
                "enabled"
            } else if feature.compiled_in {
                "disabled"
            } else {
                "not compiled"
            };
            writeln!(out, "{}\t{state}\t{}", feature.name, feature.description)?;
        }
        return Ok(());
    }

    let compilation = compile(system, &args.root_dir, &ctx)?;

    if args.dump {
        write!(out, "{}", compilation.merged.to_yaml()?)?;
        return Ok(());
    }

    if args.dry_run {
        write!(out, "{}", compilation.artifacts.to_listing())?;
        return Ok(());
    }

    let output_root = args.output_root();
    write_artifacts(system, output_root, &compilation.artifacts)
        .with_context(|| format!("Failed to write configuration under {}", output_root.display()))?;
    Ok(())
}
