//! System abstraction for filesystem operations
//!
//! The compiler core is pure; every read of a YAML source and every write
//! of a generated artifact goes through this trait so the whole pipeline can
//! be exercised against an in-memory filesystem.

use std::io;
use std::path::{Path, PathBuf};

pub mod mock;
pub mod real;

pub use mock::MockSystem;
pub use real::RealSystem;

/// Content written next to its target but not yet visible under the target name
///
/// Dropping a staged file without committing it discards the content.
pub trait StagedFile {
    /// Path the content will replace on commit
    fn target(&self) -> &Path;

    /// Atomically replace the target with the staged content
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// Unified trait for filesystem operations
///
/// # Implementations
/// - `RealSystem`: Production implementation using `std::fs` and `tempfile`
/// - `MockSystem`: Test implementation using in-memory storage
pub trait System: Send + Sync {
    /// Read entire file contents as a UTF-8 string
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path points to a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path points to a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Read directory entries, returning paths of all direct children
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Recursively create a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Write `contents` with permission bits `mode` to a temporary file in the
    /// target's directory
    ///
    /// The parent directory must exist.
    fn stage(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<Box<dyn StagedFile>>;
}
