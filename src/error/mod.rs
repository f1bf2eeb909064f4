//! Error handling module
//!
//! Defines the compiler error taxonomy, per-property diagnostics and exit codes

pub mod types;

pub use types::*;
