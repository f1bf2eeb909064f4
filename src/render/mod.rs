//! Backend renderers
//!
//! Each renderer claims the definitions it is responsible for, turns each
//! one into files in an [`ArtifactSet`] and may add global files once every
//! definition has been seen. Rendering is pure: nothing touches the
//! filesystem until the writer commits the whole set.

pub mod ini;
pub mod networkd;
pub mod nm;
pub mod ovs;
pub mod sriov;

use crate::config::CompileContext;
use crate::error::{CompileError, Diagnostic};
use crate::model::{NetDefinition, ResolvedModel};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Permission bits of ordinary generated files
pub const PUBLIC_MODE: u32 = 0o644;

/// Permission bits of files that may carry secrets
pub const PRIVATE_MODE: u32 = 0o600;

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contents: String,
    pub mode: u32,
}

/// Generated files keyed by their path relative to the output root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    files: BTreeMap<PathBuf, Artifact>,
}

impl ArtifactSet {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a world-readable file, replacing any earlier one at the same path
    #[inline]
    pub fn insert<P: Into<PathBuf>>(&mut self, path: P, contents: String) {
        self.insert_with_mode(path, contents, PUBLIC_MODE);
    }

    /// Add a file readable by its owner only
    #[inline]
    pub fn insert_private<P: Into<PathBuf>>(&mut self, path: P, contents: String) {
        self.insert_with_mode(path, contents, PRIVATE_MODE);
    }

    pub fn insert_with_mode<P: Into<PathBuf>>(&mut self, path: P, contents: String, mode: u32) {
        let path = path.into();
        debug!("Rendered {} ({} bytes)", path.display(), contents.len());
        self.files.insert(path, Artifact { contents, mode });
    }

    #[must_use]
    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<&Artifact> {
        self.files.get(path.as_ref())
    }

    /// Contents of the file at `path`
    #[must_use]
    pub fn contents<P: AsRef<Path>>(&self, path: P) -> Option<&str> {
        self.get(path).map(|a| a.contents.as_str())
    }

    #[must_use]
    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.files.contains_key(path.as_ref())
    }

    /// Files in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Artifact)> {
        self.files.iter().map(|(path, artifact)| (path.as_path(), artifact))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every file with a header line, as printed by `--dry-run`
    #[must_use]
    pub fn to_listing(&self) -> String {
        let mut listing = String::new();
        for (path, artifact) in &self.files {
            listing.push_str(&format!("==> {} ({:o}) <==\n", path.display(), artifact.mode));
            listing.push_str(&artifact.contents);
            if !artifact.contents.ends_with('\n') {
                listing.push('\n');
            }
            listing.push('\n');
        }
        listing
    }
}

/// Failure to render one definition
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RenderError {
    /// The renderer cannot express valid configuration
    #[error("{} unsupported properties", .0.len())]
    Unsupported(Vec<Diagnostic>),

    /// A validated property could not be rendered
    #[error("internal error rendering '{id}': {message}")]
    Internal { id: String, message: String },
}

impl RenderError {
    #[inline]
    pub fn internal<I: Into<String>, S: Into<String>>(id: I, message: S) -> Self {
        Self::Internal {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Capability diagnostics collected while rendering one definition
#[derive(Debug, Default)]
pub struct Unsupported(Vec<Diagnostic>);

impl Unsupported {
    pub fn push(&mut self, def: &NetDefinition, property: &str, message: String) {
        let path = if property.is_empty() {
            def.key_path.clone()
        } else {
            property
                .split('.')
                .fold(def.key_path.clone(), |path, part| path.child(part))
        };
        self.0.push(Diagnostic::capability(path, message));
    }

    /// `Ok` when nothing was collected
    ///
    /// # Errors
    ///
    /// Returns the collected diagnostics as [`RenderError::Unsupported`].
    pub fn finish(self) -> Result<(), RenderError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(RenderError::Unsupported(self.0))
        }
    }
}

/// Read-only state shared by all renderers
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub model: &'a ResolvedModel,
    pub compile: &'a CompileContext,
}

/// One output backend
pub trait Renderer {
    /// Name used in log messages
    fn name(&self) -> &'static str;

    /// Whether this renderer emits files for `def`
    fn owns(&self, def: &NetDefinition, ctx: &RenderContext<'_>) -> bool;

    /// Render one owned definition
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be expressed by this backend.
    fn render(
        &mut self,
        def: &NetDefinition,
        ctx: &RenderContext<'_>,
        out: &mut ArtifactSet,
    ) -> Result<(), RenderError>;

    /// Emit global files after every definition was rendered
    ///
    /// # Errors
    ///
    /// Returns an error if global settings cannot be expressed.
    fn finish(&mut self, _ctx: &RenderContext<'_>, _out: &mut ArtifactSet) -> Result<(), RenderError> {
        Ok(())
    }
}

/// The renderers enabled by this build, in output order
#[must_use]
pub fn renderers() -> Vec<Box<dyn Renderer>> {
    vec![
        Box::new(networkd::NetworkdRenderer::new()),
        Box::new(nm::NmRenderer::new()),
        Box::new(ovs::OvsRenderer::new()),
        Box::new(sriov::SriovRenderer::new()),
    ]
}

/// Render every definition of a resolved model
///
/// Capability problems of all definitions are collected before failing.
///
/// # Errors
///
/// Returns an error if:
/// - Any definition uses a property its renderer cannot express (`Unsupported`)
/// - A validated property could not be rendered (`Internal`)
pub fn render_all(model: &ResolvedModel, compile: &CompileContext) -> Result<ArtifactSet, CompileError> {
    let ctx = RenderContext { model, compile };
    let mut out = ArtifactSet::new();
    let mut unsupported = Vec::new();
    let mut renderers = renderers();

    let mut record = |result: Result<(), RenderError>| -> Result<(), CompileError> {
        match result {
            Ok(()) => Ok(()),
            Err(RenderError::Unsupported(diagnostics)) => {
                unsupported.extend(diagnostics);
                Ok(())
            }
            Err(RenderError::Internal { id, message }) => Err(CompileError::internal(id, message)),
        }
    };

    for def in model.definitions() {
        for renderer in &mut renderers {
            if renderer.owns(def, &ctx) {
                debug!("Rendering '{}' with {}", def.id, renderer.name());
                record(renderer.render(def, &ctx, &mut out))?;
            }
        }
    }
    for renderer in &mut renderers {
        record(renderer.finish(&ctx, &mut out))?;
    }

    if !unsupported.is_empty() {
        return Err(CompileError::Unsupported {
            diagnostics: unsupported,
        });
    }
    info!("Rendered {} files for {} definitions", out.len(), model.order().len());
    Ok(out)
}

/// Drop-ins extending `systemd-networkd.service`
pub const NETWORKD_DROPIN_DIR: &str = "run/systemd/system/systemd-networkd.service.d";

/// Have systemd-networkd pull in `units` through a drop-in tagged `tag`
pub fn wanted_by_networkd(out: &mut ArtifactSet, tag: &str, units: &[String]) {
    if units.is_empty() {
        return;
    }
    let mut dropin = ini::IniFile::new();
    let section = dropin.section("Unit");
    for unit in units {
        section.push("Wants", unit);
    }
    out.insert(format!("{NETWORKD_DROPIN_DIR}/10-netplan-{tag}.conf"), dropin.render());
}

/// File name component for an arbitrary string, percent-escaping anything
/// outside `[A-Za-z0-9._-]`
#[must_use]
pub fn escape_file_component(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

/// systemd unit name escaping of an interface name, as used in
/// `sys-subsystem-net-devices-<name>.device`
#[must_use]
pub fn escape_unit_component(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for (index, byte) in text.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || byte == b'_'
            || (byte == b'.' && index > 0)
            || byte == b':';
        if plain {
            escaped.push(char::from(byte));
        } else if byte == b'/' {
            escaped.push('-');
        } else {
            escaped.push_str(&format!("\\x{byte:02x}"));
        }
    }
    escaped
}

/// Validate, resolve and render a single YAML document
#[cfg(test)]
pub(crate) fn render_text(text: &str, compile: &CompileContext) -> Result<ArtifactSet, CompileError> {
    let tree: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| CompileError::internal("<test>", e.to_string()))?;
    let model = crate::config::validation::validate(&tree, compile)?
        .into_result()
        .map_err(|diagnostics| CompileError::Invalid { diagnostics })?;
    let resolved =
        crate::model::resolve(model).map_err(|diagnostics| CompileError::Invalid { diagnostics })?;
    render_all(&resolved, compile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_modes() {
        let mut set = ArtifactSet::new();
        set.insert("run/a", "a\n".to_owned());
        set.insert_private("run/b", "b\n".to_owned());
        assert_eq!(set.get("run/a").map(|a| a.mode), Some(0o644));
        assert_eq!(set.get("run/b").map(|a| a.mode), Some(0o600));
        assert_eq!(set.paths().count(), 2);
    }

    #[test]
    fn listing_is_path_ordered() {
        let mut set = ArtifactSet::new();
        set.insert("run/z", "z".to_owned());
        set.insert("run/a", "a\n".to_owned());
        let listing = set.to_listing();
        assert!(listing.starts_with("==> run/a (644) <==\na\n\n==> run/z"));
        assert!(listing.ends_with("z\n\n"));
    }

    #[test]
    fn file_component_escaping() {
        assert_eq!(escape_file_component("home-net_5G"), "home-net_5G");
        assert_eq!(escape_file_component("my net/x"), "my%20net%2Fx");
    }

    #[test]
    fn unit_component_escaping() {
        assert_eq!(escape_unit_component("eth0"), "eth0");
        assert_eq!(escape_unit_component("br-lan"), "br\\x2dlan");
    }
}
