//! The compile pipeline

use crate::config::loader::{parse_sources, read_sources};
use crate::config::merge::merge_documents;
use crate::config::validation::{Validated, validate};
use crate::config::{CompileContext, MergedConfig, RawSource};
use crate::error::{CompileError, Diagnostic};
use crate::model::{ResolvedModel, resolve};
use crate::render::{ArtifactSet, render_all};
use crate::system::System;
use std::path::Path;
use tracing::{debug, info};

/// Everything one successful compiler run produced
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Compilation {
    pub merged: MergedConfig,
    pub model: ResolvedModel,
    pub artifacts: ArtifactSet,
}

fn attributed(merged: &MergedConfig, mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    for diagnostic in &mut diagnostics {
        merged.attribute(diagnostic);
    }
    diagnostics
}

/// Merge, validate, resolve and render already-read sources
///
/// Sources are merged in slice order. Validation and reference problems
/// are reported together; capability problems only once the configuration
/// is otherwise valid.
///
/// # Errors
///
/// Returns an error if:
/// - A source is not well-formed YAML (`Syntax`)
/// - Two sources give one key incompatible kinds (`MergeConflict`)
/// - The merged document violates the schema or has unresolved references (`Invalid`)
/// - A renderer cannot express a valid property (`Unsupported`)
/// - A validated property could not be rendered (`Internal`)
pub fn compile_documents(sources: &[RawSource], ctx: &CompileContext) -> Result<Compilation, CompileError> {
    let documents = parse_sources(sources)?;
    let merged = merge_documents(documents)?;

    let Validated {
        model,
        mut diagnostics,
    } = validate(merged.tree(), ctx)?;
    debug!(
        "Validation built {} definitions with {} diagnostics",
        model.definitions.len(),
        diagnostics.len()
    );

    let resolved = match resolve(model) {
        Ok(resolved) => Some(resolved),
        Err(references) => {
            diagnostics.extend(references);
            None
        }
    };
    let model = match resolved {
        Some(model) if diagnostics.is_empty() => model,
        Some(_) | None => {
            return Err(CompileError::Invalid {
                diagnostics: attributed(&merged, diagnostics),
            });
        }
    };

    let artifacts = render_all(&model, ctx).map_err(|err| match err {
        CompileError::Unsupported { diagnostics } => CompileError::Unsupported {
            diagnostics: attributed(&merged, diagnostics),
        },
        other => other,
    })?;

    Ok(Compilation {
        merged,
        model,
        artifacts,
    })
}

/// Read every source under `root` and compile it
///
/// # Errors
///
/// Returns an error if:
/// - A tier directory cannot be listed or a source cannot be read (`Io`)
/// - Compilation fails (see [`compile_documents`])
pub fn compile(system: &dyn System, root: &Path, ctx: &CompileContext) -> Result<Compilation, CompileError> {
    let sources = read_sources(system, root)?;
    info!(
        "Compiling {} configuration files under {}",
        sources.len(),
        root.display()
    );
    compile_documents(&sources, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticKind;
    use std::path::PathBuf;

    fn source(path: &str, text: &str) -> RawSource {
        RawSource::new(path, text)
    }

    #[test]
    fn no_sources_compile_to_nothing() {
        let compilation = compile_documents(&[], &CompileContext::default()).unwrap();
        assert!(compilation.artifacts.is_empty());
    }

    #[test]
    fn diagnostics_are_attributed_to_their_file() {
        let err = compile_documents(
            &[
                source("/etc/netplan/01-base.yaml", "network:\n  version: 2\n"),
                source(
                    "/etc/netplan/02-vlan.yaml",
                    "network:\n  vlans:\n    vlan9:\n      id: 9\n      link: missing0\n",
                ),
            ],
            &CompileContext::default(),
        )
        .unwrap_err();
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Reference);
        assert_eq!(diagnostics[0].file, Some(PathBuf::from("/etc/netplan/02-vlan.yaml")));
        assert!(diagnostics[0].message.contains("missing0"), "{}", diagnostics[0]);
    }

    #[test]
    fn schema_and_reference_problems_are_reported_together() {
        let err = compile_documents(
            &[source(
                "/etc/netplan/01.yaml",
                "network:
  version: 2
  ethernets:
    eth0: {mtu: banana}
  vlans:
    vlan9: {id: 9, link: nowhere}
",
            )],
            &CompileContext::default(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        let kinds: Vec<DiagnosticKind> = err.diagnostics().iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::Schema));
        assert!(kinds.contains(&DiagnosticKind::Reference));
    }

    #[test]
    fn capability_problems_keep_their_exit_code() {
        let err = compile_documents(
            &[source(
                "/etc/netplan/01.yaml",
                "network:\n  version: 2\n  modems:\n    cdc0: {apn: internet}\n",
            )],
            &CompileContext::default(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.diagnostics()[0].file, Some(PathBuf::from("/etc/netplan/01.yaml")));
    }
}
