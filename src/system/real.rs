//! Real system implementation using `std::fs` and `tempfile`

use super::{StagedFile, System};
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Production implementation of System trait
///
/// This implementation directly delegates to the standard library's
/// filesystem functions; staging uses `tempfile` so a rename is the only
/// operation that makes new content visible.
#[derive(Debug, Clone, Copy)]
pub struct RealSystem;

impl RealSystem {
    /// Create a new `RealSystem` instance
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for RealSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for RealSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn stage(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<Box<dyn StagedFile>> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("No parent directory for {}", path.display()),
            )
        })?;

        let mut file = tempfile::Builder::new()
            .prefix(".netplanc-")
            .tempfile_in(parent)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        set_mode(file.path(), mode)?;

        Ok(Box::new(RealStagedFile {
            file,
            target: path.to_path_buf(),
        }))
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Temporary file that is renamed over its target on commit
struct RealStagedFile {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedFile for RealStagedFile {
    fn target(&self) -> &Path {
        &self.target
    }

    fn commit(self: Box<Self>) -> io::Result<()> {
        let Self { file, target } = *self;
        file.persist(&target).map(|_| ()).map_err(|e| e.error)
    }
}
