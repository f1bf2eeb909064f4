//! Custom error types with exit codes

use crate::config::KeyPath;
use core::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Category of a single diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum DiagnosticKind {
    /// Missing, mistyped, out-of-range or mutually inconsistent property
    Schema,
    /// Unresolved ID, dependency cycle or inconsistent peering
    Reference,
    /// Property the selected renderer cannot express
    Capability,
}

impl fmt::Display for DiagnosticKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match *self {
            Self::Schema => "schema",
            Self::Reference => "reference",
            Self::Capability => "capability",
        };
        f.write_str(label)
    }
}

/// 1-based line and column inside a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One problem found in the merged configuration
///
/// Diagnostics are created with a key path only; the pipeline attributes
/// them to the contributing file (and a line, when it can find one) once
/// the whole pass has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub key_path: KeyPath,
    pub file: Option<PathBuf>,
    pub location: Option<Location>,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic of the given kind
    #[inline]
    pub fn new<S: Into<String>>(kind: DiagnosticKind, key_path: KeyPath, message: S) -> Self {
        Self {
            kind,
            key_path,
            file: None,
            location: None,
            message: message.into(),
        }
    }

    /// Create a schema violation
    #[inline]
    pub fn schema<S: Into<String>>(key_path: KeyPath, message: S) -> Self {
        Self::new(DiagnosticKind::Schema, key_path, message)
    }

    /// Create a reference error
    #[inline]
    pub fn reference<S: Into<String>>(key_path: KeyPath, message: S) -> Self {
        Self::new(DiagnosticKind::Reference, key_path, message)
    }

    /// Create a renderer-capability error
    #[inline]
    pub fn capability<S: Into<String>>(key_path: KeyPath, message: S) -> Self {
        Self::new(DiagnosticKind::Capability, key_path, message)
    }
}

impl fmt::Display for Diagnostic {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = self.file.as_ref() {
            write!(f, "{}", file.display())?;
            if let Some(location) = self.location {
                write!(f, ":{}:{}", location.line, location.column)?;
            }
            f.write_str(": ")?;
        }
        write!(f, "{}: {}", self.key_path, self.message)
    }
}

/// Main error type for compiler invocations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CompileError {
    /// I/O Error - unreadable input or unwritable output
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Syntax Error - malformed YAML
    #[error("{}{}: invalid YAML: {message}", path.display(), format_location(*location))]
    Syntax {
        path: PathBuf,
        location: Option<Location>,
        message: String,
    },

    /// Merge Error - incompatible value kinds for the same key across files
    #[error(
        "Merge conflict at '{key_path}': {} defines a {earlier_kind} but {} defines a {later_kind}",
        earlier.display(),
        later.display()
    )]
    MergeConflict {
        key_path: KeyPath,
        earlier: PathBuf,
        later: PathBuf,
        earlier_kind: &'static str,
        later_kind: &'static str,
    },

    /// Validation Error - schema violations and reference errors
    #[error("Invalid configuration:\n{}", format_diagnostics(diagnostics))]
    Invalid { diagnostics: Vec<Diagnostic> },

    /// Capability Error - valid configuration the chosen renderer cannot express
    #[error("Configuration not supported by its renderer:\n{}", format_diagnostics(diagnostics))]
    Unsupported { diagnostics: Vec<Diagnostic> },

    /// Internal Error - a validated property could not be rendered
    #[error("Internal error while rendering '{id}': {message}")]
    Internal { id: String, message: String },
}

impl CompileError {
    /// Get the appropriate exit code for this error type
    #[must_use]
    #[inline]
    pub const fn exit_code(&self) -> i32 {
        match *self {
            Self::Syntax { .. } | Self::MergeConflict { .. } | Self::Invalid { .. } => 1,
            Self::Unsupported { .. } => 2,
            Self::Io { .. } => 3,
            Self::Internal { .. } => 4,
        }
    }

    /// Create an I/O error for a path
    #[inline]
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    #[inline]
    pub fn internal<I: Into<String>, S: Into<String>>(id: I, message: S) -> Self {
        Self::Internal {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Diagnostics carried by this error, if any
    #[must_use]
    #[inline]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match *self {
            Self::Invalid { ref diagnostics } | Self::Unsupported { ref diagnostics } => {
                diagnostics
            }
            Self::Io { .. }
            | Self::Syntax { .. }
            | Self::MergeConflict { .. }
            | Self::Internal { .. } => &[],
        }
    }
}

fn format_location(location: Option<Location>) -> String {
    location.map_or_else(String::new, |l| format!(":{}:{}", l.line, l.column))
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  - {d}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_capability_from_schema() {
        let invalid = CompileError::Invalid {
            diagnostics: Vec::new(),
        };
        let unsupported = CompileError::Unsupported {
            diagnostics: Vec::new(),
        };
        assert_eq!(invalid.exit_code(), 1);
        assert_eq!(unsupported.exit_code(), 2);
        assert_eq!(CompileError::internal("eth0", "boom").exit_code(), 4);
    }

    #[test]
    fn diagnostic_display_includes_file_and_location() {
        let mut diagnostic = Diagnostic::schema(
            KeyPath::new(["network", "vlans", "v", "id"]),
            "4095 is greater than the maximum of 4094",
        );
        diagnostic.file = Some(PathBuf::from("/etc/netplan/10-vlan.yaml"));
        diagnostic.location = Some(Location { line: 5, column: 7 });

        assert_eq!(
            diagnostic.to_string(),
            "/etc/netplan/10-vlan.yaml:5:7: network.vlans.v.id: 4095 is greater than the maximum of 4094"
        );
    }
}
