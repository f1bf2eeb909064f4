//! Type-directed merge of ranked YAML documents
//!
//! Documents are folded in rank order. For every key at every mapping level:
//! scalars are overridden by the later document, sequences are concatenated
//! (later after earlier, duplicates kept), mappings are merged recursively.
//! A later explicit `null` removes the key. Any other combination of value
//! kinds is a conflict naming both contributing files.

use crate::config::key_path::KeyPath;
use crate::config::loader::SourceDocument;
use crate::config::source_map;
use crate::error::{CompileError, Diagnostic};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path and text of a document that contributed to the merge
#[derive(Debug, Clone)]
struct Contributor {
    path: PathBuf,
    text: String,
}

/// The single logical document produced by folding all sources
#[derive(Debug, Clone)]
pub struct MergedConfig {
    tree: Value,
    contributors: Vec<Contributor>,
    origins: BTreeMap<KeyPath, usize>,
}

impl MergedConfig {
    /// The merged tree
    #[must_use]
    #[inline]
    pub const fn tree(&self) -> &Value {
        &self.tree
    }

    /// Paths of the contributing documents in rank order
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.contributors.iter().map(|c| c.path.as_path())
    }

    /// The file that last contributed `path` or its closest recorded ancestor
    #[must_use]
    pub fn origin(&self, path: &KeyPath) -> Option<&Path> {
        self.origin_index(path)
            .map(|index| self.contributors[index].path.as_path())
    }

    fn origin_index(&self, path: &KeyPath) -> Option<usize> {
        nearest_origin(&self.origins, path)
    }

    /// Fill in the file and location of a diagnostic from its key path
    pub fn attribute(&self, diagnostic: &mut Diagnostic) {
        let index = self
            .origin_index(&diagnostic.key_path)
            .or_else(|| self.contributors.len().checked_sub(1));
        let Some(contributor) = index.map(|i| &self.contributors[i]) else {
            return;
        };

        diagnostic.file = Some(contributor.path.clone());
        diagnostic.location =
            source_map::locate(&contributor.text, diagnostic.key_path.components());
    }

    /// Serialize the merged tree back to YAML
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The tree contains a value YAML cannot represent
    pub fn to_yaml(&self) -> Result<String, CompileError> {
        serde_yaml::to_string(&self.tree)
            .map_err(|e| CompileError::internal("<merged>", e.to_string()))
    }
}

/// Fold documents into one tree; documents must be sorted by rank
///
/// # Errors
///
/// Returns an error if:
/// - The same key holds incompatible value kinds in two documents
pub fn merge_documents(documents: Vec<SourceDocument>) -> Result<MergedConfig, CompileError> {
    let mut merger = Merger {
        contributors: Vec::with_capacity(documents.len()),
        origins: BTreeMap::new(),
    };
    let mut tree = Value::Null;

    for (index, document) in documents.into_iter().enumerate() {
        debug!(
            "Merging {} (rank {})",
            document.path.display(),
            document.rank
        );
        merger.contributors.push(Contributor {
            path: document.path,
            text: document.text,
        });
        if document.tree.is_null() {
            continue;
        }
        let mut path = KeyPath::root();
        merger.merge_into(&mut tree, document.tree, &mut path, index)?;
    }

    Ok(MergedConfig {
        tree,
        contributors: merger.contributors,
        origins: merger.origins,
    })
}

struct Merger {
    contributors: Vec<Contributor>,
    origins: BTreeMap<KeyPath, usize>,
}

impl Merger {
    fn merge_into(
        &mut self,
        base: &mut Value,
        incoming: Value,
        path: &mut KeyPath,
        source: usize,
    ) -> Result<(), CompileError> {
        if base.is_null() {
            self.record(path, &incoming, source);
            *base = incoming;
            return Ok(());
        }

        match (base, incoming) {
            (Value::Mapping(existing), Value::Mapping(incoming)) => {
                for (key, value) in incoming {
                    path.push(key_to_string(&key));
                    if value.is_null() && existing.contains_key(&key) {
                        existing.remove(&key);
                        self.forget(path);
                    } else if let Some(slot) = existing.get_mut(&key) {
                        self.merge_into(slot, value, path, source)?;
                    } else {
                        self.record(path, &value, source);
                        existing.insert(key, value);
                    }
                    path.pop();
                }
                Ok(())
            }
            (Value::Sequence(existing), Value::Sequence(items)) => {
                self.origins.insert(path.clone(), source);
                let offset = existing.len();
                for (i, item) in items.into_iter().enumerate() {
                    let mut item_path = path.index(offset + i);
                    self.record(&mut item_path, &item, source);
                    existing.push(item);
                }
                Ok(())
            }
            (base, incoming) if is_scalar(base) && is_scalar(&incoming) => {
                self.record(path, &incoming, source);
                *base = incoming;
                Ok(())
            }
            (base, incoming) => {
                // a deleted key has no origin of its own; cite its closest parent
                let earlier = nearest_origin(&self.origins, path)
                    .map_or_else(PathBuf::new, |i| self.contributors[i].path.clone());
                Err(CompileError::MergeConflict {
                    key_path: path.clone(),
                    earlier,
                    later: self.contributors[source].path.clone(),
                    earlier_kind: kind_name(base),
                    later_kind: kind_name(&incoming),
                })
            }
        }
    }

    /// Record `source` as the origin of `path` and everything below it
    fn record(&mut self, path: &mut KeyPath, value: &Value, source: usize) {
        self.origins.insert(path.clone(), source);
        match *value {
            Value::Mapping(ref mapping) => {
                for (key, child) in mapping {
                    path.push(key_to_string(key));
                    self.record(path, child, source);
                    path.pop();
                }
            }
            Value::Sequence(ref items) => {
                for (i, child) in items.iter().enumerate() {
                    path.push(i.to_string());
                    self.record(path, child, source);
                    path.pop();
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Tagged(_) => {}
        }
    }

    fn forget(&mut self, path: &KeyPath) {
        self.origins
            .retain(|recorded, _| !recorded.components().starts_with(path.components()));
    }
}

/// Origin of `path` or of its closest recorded ancestor
fn nearest_origin(origins: &BTreeMap<KeyPath, usize>, path: &KeyPath) -> Option<usize> {
    (1..=path.len())
        .rev()
        .find_map(|len| origins.get(&path.truncated(len)).copied())
}

/// Render a mapping key as a path component
#[must_use]
pub fn key_to_string(key: &Value) -> String {
    match *key {
        Value::String(ref s) => s.clone(),
        Value::Number(ref n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_owned(),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => serde_yaml::to_string(key)
            .map_or_else(|_| "?".to_owned(), |s| s.trim_end().to_owned()),
    }
}

const fn is_scalar(value: &Value) -> bool {
    matches!(
        *value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Tagged(_)
    )
}

const fn kind_name(value: &Value) -> &'static str {
    match *value {
        Value::Mapping(_) => "mapping",
        Value::Sequence(_) => "sequence",
        Value::Null => "null",
        Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Tagged(_) => "scalar",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{RawSource, parse_sources};

    fn merge(docs: &[(&str, &str)]) -> Result<MergedConfig, CompileError> {
        let raw: Vec<RawSource> = docs
            .iter()
            .map(|(path, text)| RawSource::new(*path, *text))
            .collect();
        merge_documents(parse_sources(&raw).unwrap())
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn later_scalar_overrides() {
        let merged = merge(&[("/a.yaml", "a: {b: 1}"), ("/b.yaml", "a: {b: 2}")]).unwrap();
        assert_eq!(merged.tree(), &yaml("a: {b: 2}"));
    }

    #[test]
    fn sequences_concatenate_in_rank_order() {
        let merged = merge(&[
            ("/a.yaml", "a: {routes: [R1]}"),
            ("/b.yaml", "a: {routes: [R2]}"),
        ])
        .unwrap();
        assert_eq!(merged.tree(), &yaml("a: {routes: [R1, R2]}"));
    }

    #[test]
    fn duplicate_sequence_items_are_kept() {
        let merged = merge(&[("/a.yaml", "a: [x]"), ("/b.yaml", "a: [x]")]).unwrap();
        assert_eq!(merged.tree(), &yaml("a: [x, x]"));
    }

    #[test]
    fn mappings_merge_key_by_key() {
        let merged = merge(&[
            ("/a.yaml", "network: {ethernets: {eth0: {dhcp4: true}}}"),
            ("/b.yaml", "network: {ethernets: {eth0: {mtu: 9000}, eth1: {}}}"),
        ])
        .unwrap();
        assert_eq!(
            merged.tree(),
            &yaml("network: {ethernets: {eth0: {dhcp4: true, mtu: 9000}, eth1: {}}}")
        );
    }

    #[test]
    fn kind_mismatch_names_both_files() {
        let err = merge(&[("/a.yaml", "a: {b: 1}"), ("/b.yaml", "a: {b: [1]}")]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/a.yaml"), "{message}");
        assert!(message.contains("/b.yaml"), "{message}");
        assert!(message.contains("a.b"), "{message}");
    }

    #[test]
    fn later_null_removes_key() {
        let merged = merge(&[("/a.yaml", "a: {b: 1, c: 2}"), ("/b.yaml", "a: {b: null}")]).unwrap();
        assert_eq!(merged.tree(), &yaml("a: {c: 2}"));
        assert_eq!(merged.origin(&KeyPath::new(["a", "b"])), Some(Path::new("/a.yaml")));
    }

    #[test]
    fn conflict_after_removal_names_parent_file() {
        // `1` and `"1"` are distinct keys that share the key path `a.1`
        let err = merge(&[
            ("/a.yaml", "a: {1: one, \"1\": {x: 1}}"),
            ("/b.yaml", "a: {1: null}"),
            ("/c.yaml", "a: {\"1\": [x]}"),
        ])
        .unwrap_err();
        let CompileError::MergeConflict { earlier, later, .. } = err else {
            panic!("expected a merge conflict, got {err}");
        };
        assert_eq!(earlier, Path::new("/a.yaml"));
        assert_eq!(later, Path::new("/c.yaml"));
    }

    #[test]
    fn provenance_tracks_sequence_elements() {
        let merged = merge(&[
            ("/a.yaml", "a: {routes: [R1]}"),
            ("/b.yaml", "a: {routes: [R2]}"),
        ])
        .unwrap();
        let first = KeyPath::new(["a", "routes", "0"]);
        let second = KeyPath::new(["a", "routes", "1"]);
        assert_eq!(merged.origin(&first), Some(Path::new("/a.yaml")));
        assert_eq!(merged.origin(&second), Some(Path::new("/b.yaml")));
    }

    #[test]
    fn empty_documents_contribute_nothing() {
        let merged = merge(&[("/a.yaml", "a: 1"), ("/b.yaml", "")]).unwrap();
        assert_eq!(merged.tree(), &yaml("a: 1"));
    }

    #[test]
    fn merge_output_is_stable() {
        let docs = [
            ("/a.yaml", "network: {version: 2, ethernets: {eth0: {dhcp4: true}}}"),
            ("/b.yaml", "network: {bonds: {bond0: {interfaces: [eth0]}}}"),
        ];
        let first = merge(&docs).unwrap().to_yaml().unwrap();
        let second = merge(&docs).unwrap().to_yaml().unwrap();
        assert_eq!(first, second);
    }
}
