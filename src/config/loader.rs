//! Discovery and parsing of YAML sources
//!
//! Sources live in three tiers under a root directory. A file in a higher
//! tier shadows the file with the same base name in a lower tier; files with
//! different names are all kept and ranked by base name alone.

use crate::error::{CompileError, Location};
use crate::system::System;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration directory tier, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum Tier {
    /// Vendor-provided defaults
    Lib,
    /// Administrator configuration
    Etc,
    /// Ephemeral runtime overrides
    Run,
}

impl Tier {
    /// All tiers, lowest precedence first
    pub const ALL: [Self; 3] = [Self::Lib, Self::Etc, Self::Run];

    /// Directory of this tier relative to the root
    #[must_use]
    #[inline]
    pub const fn directory(self) -> &'static str {
        match self {
            Self::Lib => "lib/netplan",
            Self::Etc => "etc/netplan",
            Self::Run => "run/netplan",
        }
    }
}

/// Raw text of one YAML source, as read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource {
    pub path: PathBuf,
    pub text: String,
}

impl RawSource {
    /// Create a raw source from a path and its text
    #[inline]
    pub fn new<P: Into<PathBuf>, S: Into<String>>(path: P, text: S) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// One parsed YAML file with its merge rank
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub rank: usize,
    pub text: String,
    pub tree: Value,
}

/// Enumerate the YAML sources under `root` in merge order
///
/// # Errors
///
/// Returns an error if:
/// - A tier directory exists but cannot be listed
pub fn discover_sources(system: &dyn System, root: &Path) -> Result<Vec<PathBuf>, CompileError> {
    let mut by_name: BTreeMap<OsString, (Tier, PathBuf)> = BTreeMap::new();

    for tier in Tier::ALL {
        let directory = root.join(tier.directory());
        if !system.is_dir(&directory) {
            continue;
        }

        let entries = system
            .read_dir(&directory)
            .map_err(|e| CompileError::io(&directory, e))?;

        for path in entries {
            if !system.is_file(&path) || path.extension().is_none_or(|ext| ext != "yaml") {
                continue;
            }
            let Some(name) = path.file_name().map(ToOwned::to_owned) else {
                continue;
            };

            if let Some((shadowed_tier, shadowed)) = by_name.get(&name) {
                debug!(
                    "{} shadows {} ({:?} tier)",
                    path.display(),
                    shadowed.display(),
                    shadowed_tier
                );
            }
            by_name.insert(name, (tier, path));
        }
    }

    Ok(by_name.into_values().map(|(_, path)| path).collect())
}

/// Read every discovered source under `root`
///
/// # Errors
///
/// Returns an error if:
/// - A tier directory cannot be listed
/// - A source file cannot be read or is not valid UTF-8
pub fn read_sources(system: &dyn System, root: &Path) -> Result<Vec<RawSource>, CompileError> {
    discover_sources(system, root)?
        .into_iter()
        .map(|path| {
            debug!("Reading {}", path.display());
            let text = system
                .read_to_string(&path)
                .map_err(|e| CompileError::io(&path, e))?;
            Ok(RawSource { path, text })
        })
        .collect()
}

/// Parse one source, assigning it the given rank
///
/// # Errors
///
/// Returns an error if:
/// - The text is not well-formed YAML
pub fn parse_source(source: &RawSource, rank: usize) -> Result<SourceDocument, CompileError> {
    let tree: Value = serde_yaml::from_str(&source.text).map_err(|e| CompileError::Syntax {
        path: source.path.clone(),
        location: e.location().map(|l| Location {
            line: l.line(),
            column: l.column(),
        }),
        message: e.to_string(),
    })?;

    Ok(SourceDocument {
        path: source.path.clone(),
        rank,
        text: source.text.clone(),
        tree,
    })
}

/// Parse all sources in order; the position in the slice is the rank
///
/// # Errors
///
/// Returns an error if:
/// - Any source is not well-formed YAML
pub fn parse_sources(sources: &[RawSource]) -> Result<Vec<SourceDocument>, CompileError> {
    sources
        .iter()
        .enumerate()
        .map(|(rank, source)| parse_source(source, rank))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::MockSystem;

    #[test]
    fn higher_tier_shadows_same_name() {
        let system = MockSystem::new()
            .with_file("/root/lib/netplan/10-x.yaml", b"lib")
            .unwrap()
            .with_file("/root/etc/netplan/10-x.yaml", b"etc")
            .unwrap()
            .with_file("/root/run/netplan/10-x.yaml", b"run")
            .unwrap();

        let sources = discover_sources(&system, Path::new("/root")).unwrap();
        assert_eq!(sources, vec![PathBuf::from("/root/run/netplan/10-x.yaml")]);
    }

    #[test]
    fn different_names_are_ranked_by_name_only() {
        let system = MockSystem::new()
            .with_file("/root/run/netplan/01-a.yaml", b"")
            .unwrap()
            .with_file("/root/lib/netplan/02-b.yaml", b"")
            .unwrap()
            .with_file("/root/etc/netplan/03-c.yaml", b"")
            .unwrap();

        let sources = discover_sources(&system, Path::new("/root")).unwrap();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/root/run/netplan/01-a.yaml"),
                PathBuf::from("/root/lib/netplan/02-b.yaml"),
                PathBuf::from("/root/etc/netplan/03-c.yaml"),
            ]
        );
    }

    #[test]
    fn non_yaml_files_are_ignored() {
        let system = MockSystem::new()
            .with_file("/root/etc/netplan/01-a.yaml", b"")
            .unwrap()
            .with_file("/root/etc/netplan/01-a.yaml.bak", b"")
            .unwrap()
            .with_file("/root/etc/netplan/README", b"")
            .unwrap();

        let sources = discover_sources(&system, Path::new("/root")).unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn missing_tiers_are_skipped() {
        let system = MockSystem::new().with_dir("/root").unwrap();
        assert!(discover_sources(&system, Path::new("/root")).unwrap().is_empty());
    }

    #[test]
    fn non_utf8_file_names_the_path() {
        let system = MockSystem::new()
            .with_file("/root/etc/netplan/bad.yaml", &[0xff, 0xfe, 0x00])
            .unwrap();

        let err = read_sources(&system, Path::new("/root")).unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
        assert!(err.to_string().contains("/root/etc/netplan/bad.yaml"));
    }

    #[test]
    fn syntax_error_reports_line_and_column() {
        let source = RawSource::new("/etc/netplan/a.yaml", "network:\n  version: [2\n");
        let err = parse_source(&source, 0).unwrap_err();

        let CompileError::Syntax { location, .. } = err else {
            panic!("expected a syntax error");
        };
        assert!(location.is_some());
    }

    #[test]
    fn empty_file_parses_to_null() {
        let document = parse_source(&RawSource::new("/etc/netplan/empty.yaml", ""), 3).unwrap();
        assert!(document.tree.is_null());
        assert_eq!(document.rank, 3);
    }
}
