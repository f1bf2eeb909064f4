//! Configuration front end
//!
//! Handles YAML source discovery, rank-ordered merging, JSON schema
//! validation and the semantic checks that turn the merged document into a
//! typed device model.

pub mod key_path;
pub mod loader;
pub mod merge;
pub mod schema;
pub mod source_map;
pub mod validation;

pub use key_path::KeyPath;
pub use loader::{RawSource, SourceDocument, Tier};
pub use merge::MergedConfig;

use crate::features::{DEFAULT_NM_VERSION, FeatureSet, Version};

/// Immutable settings threaded through validation and rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileContext {
    /// Feature flags accepted by the validator
    pub features: FeatureSet,

    /// NetworkManager version the keyfiles are generated for
    pub nm_version: Version,
}

impl CompileContext {
    /// Context with the given feature set and the default NetworkManager version
    #[must_use]
    #[inline]
    pub fn new(features: FeatureSet) -> Self {
        Self {
            features,
            nm_version: DEFAULT_NM_VERSION,
        }
    }

    /// Same context targeting another NetworkManager version
    #[must_use]
    #[inline]
    pub fn with_nm_version(mut self, version: Version) -> Self {
        self.nm_version = version;
        self
    }
}

impl Default for CompileContext {
    #[inline]
    fn default() -> Self {
        Self::new(FeatureSet::compiled())
    }
}
