//! Type resolver collaborator
//!
//! The flattener asks a [`TypeResolver`] for the source unit that defines a
//! fully qualified class name. A dotted reference `A.B.C` names the nested
//! path `A.B` and the defining unit `C`.

use crate::ast::StoredDefinition;
use crate::error::{LoadError, LoadResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Looks up the raw source unit defining a qualified class name
pub trait TypeResolver {
    /// `Ok(None)` means not found; errors are reserved for broken sources
    fn resolve(&self, reference: &str) -> LoadResult<Option<StoredDefinition>>;
}

impl<T: TypeResolver + ?Sized> TypeResolver for &T {
    fn resolve(&self, reference: &str) -> LoadResult<Option<StoredDefinition>> {
        (**self).resolve(reference)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Resolver over documents held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTypeResolver {
    units: HashMap<String, StoredDefinition>,
}

impl InMemoryTypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every top-level class of `document` under its qualified name
    pub fn add_document(&mut self, document: StoredDefinition) {
        for class in &document.class_definition {
            let name = document.qualified_name(class);
            self.units.insert(name, document.clone());
        }
    }

    pub fn with_document(mut self, document: StoredDefinition) -> Self {
        self.add_document(document);
        self
    }
}

impl TypeResolver for InMemoryTypeResolver {
    fn resolve(&self, reference: &str) -> LoadResult<Option<StoredDefinition>> {
        if let Some(unit) = self.units.get(reference) {
            return Ok(Some(unit.clone()));
        }
        // Nested class inside a registered unit
        Ok(self
            .units
            .values()
            .find(|unit| unit.find_class(reference).is_some())
            .cloned())
    }
}

// =============================================================================
// File system
// =============================================================================

/// Resolver over exported JSON files laid out by package path:
/// `A.B.C` lives at `<root>/A/B/C.json`. Roots are searched in order.
#[derive(Debug, Clone, Default)]
pub struct FileSystemTypeResolver {
    roots: Vec<PathBuf>,
}

impl FileSystemTypeResolver {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Relative file for a reference: every segment but the last is a
    /// directory, the last is the unit
    fn unit_file(reference: &str) -> PathBuf {
        let mut relative = PathBuf::new();
        let mut segments = reference.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                relative.push(segment);
            } else {
                relative.push(format!("{}.json", segment));
            }
        }
        relative
    }

    fn read_unit(path: &Path) -> LoadResult<StoredDefinition> {
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        StoredDefinition::from_json_str(&source).map_err(|e| LoadError::InvalidDocument {
            origin: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl TypeResolver for FileSystemTypeResolver {
    fn resolve(&self, reference: &str) -> LoadResult<Option<StoredDefinition>> {
        let relative = Self::unit_file(reference);
        for root in &self.roots {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                debug!(reference, file = %candidate.display(), "resolved type reference");
                return Self::read_unit(&candidate).map(Some);
            }
        }
        Ok(None)
    }
}
