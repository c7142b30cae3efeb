//! Error types for loading models and resolving scopes
//!
//! Two families, matching the two failure domains:
//! - [`LoadError`]: the source model is inconsistent; the whole load aborts
//! - [`ResolveError`]: one (root, selections) request failed; the dictionary
//!   and other requests are unaffected
//!
//! Recoverable problems (malformed annotations) are not errors at all; they
//! are [`crate::diagnostics::Diagnostic`] records.

use std::path::PathBuf;
use thiserror::Error;

/// Structural failures found while flattening or validating a model
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("type '{reference}' referenced from '{context}' not found")]
    TypeNotFound { reference: String, context: String },

    #[error("'{parent}' lists child '{child}' which is not in the type dictionary")]
    DanglingReference { parent: String, child: String },

    #[error("cyclic class composition: {}", chain.join(" -> "))]
    CyclicDefinition { chain: Vec<String> },

    #[error("'{path}' must be a {expected}, found {found}")]
    KindMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("invalid model document {origin}: {message}")]
    InvalidDocument { origin: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn type_not_found(reference: impl Into<String>, context: impl Into<String>) -> Self {
        Self::TypeNotFound {
            reference: reference.into(),
            context: context.into(),
        }
    }

    pub fn dangling(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self::DanglingReference {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Failures of a single scope resolution or expression evaluation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("cyclic value reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("unknown operator '{operator}'")]
    UnknownOperator { operator: String },

    #[error("operator '{operator}' takes {expected} operand(s), found {found}")]
    ArityMismatch {
        operator: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("unresolved variable '{reference}' (from '{context}')")]
    UnresolvedVariable { reference: String, context: String },

    #[error("resolution budget of {budget} node visits exceeded")]
    ResolutionBudgetExceeded { budget: usize },
}

impl ResolveError {
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unresolved(reference: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnresolvedVariable {
            reference: reference.into(),
            context: context.into(),
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_messages_show_chain() {
        let err = LoadError::CyclicDefinition {
            chain: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "cyclic class composition: A -> B -> A");

        let err = ResolveError::CyclicReference {
            chain: vec!["x".into(), "y".into(), "x".into()],
        };
        assert!(err.to_string().ends_with("x -> y -> x"));
    }
}
