//! Load diagnostics
//!
//! Recoverable problems found while flattening a model. A diagnostic never
//! aborts a load; it records what was substituted so that no failure goes
//! unreported.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Info,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// `enable` annotation failed to parse; literal `true` substituted
    MalformedAnnotation,
    /// Declared or modification value failed to parse; value dropped
    MalformedValue,
    /// Modification names a member the modified class does not have; ignored
    UnknownModificationTarget,
    /// Inherited member hidden by a member of the same name; informational
    ShadowedMember,
}

/// A diagnostic message attached to a dictionary path
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    /// Dictionary path of the definition the problem belongs to
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn info(code: DiagnosticCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}: {}", self.code, self.path, self.message)
    }
}

// =============================================================================
// Convenience Builders
// =============================================================================

/// An `enable` annotation that could not be parsed
pub fn malformed_annotation(path: &str, source: &str, reason: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::MalformedAnnotation,
        path,
        format!(
            "enable annotation '{}' could not be parsed, using true: {}",
            source,
            first_line(reason)
        ),
    )
}

/// A value expression that could not be parsed
pub fn malformed_value(path: &str, source: &str, reason: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::MalformedValue,
        path,
        format!(
            "value '{}' could not be parsed and was dropped: {}",
            source,
            first_line(reason)
        ),
    )
}

/// A modification of a member the target class does not declare
pub fn unknown_modification_target(path: &str, class: &str, member: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::UnknownModificationTarget,
        path,
        format!("'{}' has no member '{}'; modification ignored", class, member),
    )
}

/// A member inherited from `base` that the class already has
pub fn shadowed_member(path: &str, member: &str, base: &str) -> Diagnostic {
    Diagnostic::info(
        DiagnosticCode::ShadowedMember,
        path,
        format!("member '{}' from '{}' is shadowed and not inherited", member, base),
    )
}

// nom's verbose errors span several lines; the first one names the problem
fn first_line(reason: &str) -> &str {
    reason.lines().find(|l| !l.trim().is_empty()).unwrap_or(reason)
}
