//! Mock system implementation for testing

use super::{StagedFile, System};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// In-memory implementation of System trait for testing
///
/// `MockSystem` provides an in-memory filesystem, perfect for fast,
/// isolated tests of the whole compiler pipeline without side effects.
///
/// # Example
/// ```
/// use netplanc::system::{mock::MockSystem, System};
/// use std::path::Path;
///
/// let system = MockSystem::new()
///     .with_file("/etc/netplan/01-eth.yaml", b"network: {version: 2}").unwrap()
///     .with_dir("/run/netplan").unwrap();
///
/// assert!(system.is_file(Path::new("/etc/netplan/01-eth.yaml")));
/// assert!(system.is_dir(Path::new("/run/netplan")));
/// ```
#[derive(Clone)]
pub struct MockSystem {
    state: Arc<RwLock<MockSystemState>>,
}

struct MockSystemState {
    files: BTreeMap<PathBuf, MockFile>,
    dirs: HashSet<PathBuf>,
    read_only: HashSet<PathBuf>,
}

#[derive(Clone)]
struct MockFile {
    contents: Vec<u8>,
    mode: u32,
}

impl MockSystem {
    /// Create a new `MockSystem` with an empty root
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockSystemState {
                files: BTreeMap::new(),
                dirs: HashSet::from([PathBuf::from("/")]),
                read_only: HashSet::new(),
            })),
        }
    }

    /// Add a file with contents (builder pattern)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The in-memory state lock is poisoned
    #[inline]
    pub fn with_file<P: AsRef<Path>>(self, path: P, contents: &[u8]) -> io::Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut state = self.write_state()?;

        // Ensure parent directories exist
        if let Some(parent) = path_buf.parent() {
            Self::ensure_parent_dirs(&mut state.dirs, parent);
        }

        state.files.insert(
            path_buf,
            MockFile {
                contents: contents.to_vec(),
                mode: 0o644,
            },
        );
        drop(state);
        Ok(self)
    }

    /// Add a directory (builder pattern)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The in-memory state lock is poisoned
    #[inline]
    pub fn with_dir<P: AsRef<Path>>(self, path: P) -> io::Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut state = self.write_state()?;
        Self::ensure_parent_dirs(&mut state.dirs, &path_buf);
        drop(state);
        Ok(self)
    }

    /// Make staging into `path` (and below it) fail with `PermissionDenied`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The in-memory state lock is poisoned
    #[inline]
    pub fn with_read_only_dir<P: AsRef<Path>>(self, path: P) -> io::Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut state = self.write_state()?;
        Self::ensure_parent_dirs(&mut state.dirs, &path_buf);
        state.read_only.insert(path_buf);
        drop(state);
        Ok(self)
    }

    /// Contents of a file as a string, if it exists and is UTF-8
    #[must_use]
    #[inline]
    pub fn file_contents<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        let state = self.state.read().ok()?;
        let file = state.files.get(path.as_ref())?;
        String::from_utf8(file.contents.clone()).ok()
    }

    /// Permission bits of a file, if it exists
    #[must_use]
    #[inline]
    pub fn file_mode<P: AsRef<Path>>(&self, path: P) -> Option<u32> {
        let state = self.state.read().ok()?;
        state.files.get(path.as_ref()).map(|f| f.mode)
    }

    /// All file paths under a prefix, sorted
    #[must_use]
    #[inline]
    pub fn files_under<P: AsRef<Path>>(&self, prefix: P) -> Vec<PathBuf> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        state
            .files
            .keys()
            .filter(|p| p.starts_with(prefix.as_ref()))
            .cloned()
            .collect()
    }

    fn write_state(&self) -> io::Result<std::sync::RwLockWriteGuard<'_, MockSystemState>> {
        self.state
            .write()
            .map_err(|e| io::Error::other(e.to_string()))
    }

    fn read_state(&self) -> io::Result<std::sync::RwLockReadGuard<'_, MockSystemState>> {
        self.state
            .read()
            .map_err(|e| io::Error::other(e.to_string()))
    }

    #[inline]
    fn ensure_parent_dirs(dirs: &mut HashSet<PathBuf>, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }
}

impl Default for MockSystem {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl System for MockSystem {
    #[inline]
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let state = self.read_state()?;
        let bytes = state
            .files
            .get(path)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )
            })?
            .contents
            .clone();
        drop(state);
        String::from_utf8(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {e}")))
    }

    #[inline]
    fn exists(&self, path: &Path) -> bool {
        self.read_state()
            .is_ok_and(|state| state.files.contains_key(path) || state.dirs.contains(path))
    }

    #[inline]
    fn is_file(&self, path: &Path) -> bool {
        self.read_state()
            .is_ok_and(|state| state.files.contains_key(path))
    }

    #[inline]
    fn is_dir(&self, path: &Path) -> bool {
        self.read_state().is_ok_and(|state| state.dirs.contains(path))
    }

    #[inline]
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.read_state()?;

        if !state.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory not found: {}", path.display()),
            ));
        }

        // Find all direct children (files and directories)
        let mut entries: Vec<PathBuf> = state
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        entries.extend(
            state
                .dirs
                .iter()
                .filter(|d| d.parent() == Some(path) && d.as_path() != path)
                .cloned(),
        );
        drop(state);

        // Directory listings carry no ordering guarantee; reverse to make
        // sure callers sort for themselves.
        entries.sort();
        entries.reverse();
        Ok(entries)
    }

    #[inline]
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.write_state()?;
        Self::ensure_parent_dirs(&mut state.dirs, path);
        drop(state);
        Ok(())
    }

    #[inline]
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.write_state()?;
        if state.files.remove(path).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            ));
        }
        drop(state);
        Ok(())
    }

    #[inline]
    fn stage(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<Box<dyn StagedFile>> {
        let state = self.read_state()?;

        let parent = path.parent().unwrap_or_else(|| Path::new("/"));
        if !state.dirs.contains(parent) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Parent directory does not exist: {}", parent.display()),
            ));
        }
        if state.read_only.iter().any(|ro| path.starts_with(ro)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("Read-only directory: {}", parent.display()),
            ));
        }
        drop(state);

        Ok(Box::new(MockStagedFile {
            target: path.to_path_buf(),
            file: MockFile {
                contents: contents.to_vec(),
                mode,
            },
            system: self.clone(),
        }))
    }
}

/// Staged content held in memory until commit
struct MockStagedFile {
    target: PathBuf,
    file: MockFile,
    system: MockSystem,
}

impl StagedFile for MockStagedFile {
    fn target(&self) -> &Path {
        &self.target
    }

    fn commit(self: Box<Self>) -> io::Result<()> {
        let Self {
            target,
            file,
            system,
        } = *self;
        let mut state = system.write_state()?;
        state.files.insert(target, file);
        drop(state);
        Ok(())
    }
}
