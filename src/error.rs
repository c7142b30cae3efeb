//! Top-level error type for the formgen engine
//!
//! Wraps the per-layer errors of `formgen-core` so callers can use a single
//! `Result` alias across loading, resolution and configuration.

use formgen_core::{LoadError, ResolveError};
use formgen_types::ValueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormgenError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Invalid selections: {0}")]
    Selections(#[from] ValueError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormgenError {
    /// True for failures that only affect one resolution request
    pub fn is_request_scoped(&self) -> bool {
        matches!(self, FormgenError::Resolve(_) | FormgenError::Selections(_))
    }
}

pub type Result<T> = std::result::Result<T, FormgenError>;
