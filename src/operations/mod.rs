//! Operations module
//!
//! Runs the compile pipeline and commits its output

pub mod generate;
pub mod write;

pub use generate::{Compilation, compile, compile_documents};
pub use write::{WriteSummary, write_artifacts};
