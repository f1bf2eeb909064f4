//! # `netplanc`
//!
//! `netplanc` compiles netplan YAML network descriptions into configuration
//! for systemd-networkd and NetworkManager.
//!
//! ## Usage
//!
//! ```sh
//! netplanc                          # write under /run
//! netplanc --root-dir ./fixture --dry-run
//! netplanc --dump
//! netplanc --features
//! ```

use anyhow::Result;
use clap::Parser as _;
use netplanc::cli::Args;
use netplanc::error::CompileError;
use netplanc::system::RealSystem;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let system = RealSystem::new();
    let mut stdout = std::io::stdout().lock();
    match netplanc::run(&args, &system, &mut stdout) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(
                err.chain()
                    .find_map(|cause| cause.downcast_ref::<CompileError>())
                    .map_or(1, CompileError::exit_code),
            );
        }
    }
}
