//! Engine facade
//!
//! Loads a model once and answers any number of resolution requests against
//! the resulting Type Dictionary. The dictionary is immutable after load and
//! shared through an `Arc`, so an `Engine` can be cloned into worker threads
//! freely. [`Engine::resolve_batch`] fans independent requests out over
//! rayon's pool.

use crate::error::Result;
use formgen_core::{
    build_schema, get_value, resolve_scope, Diagnostic, EngineConfig, FileSystemTypeResolver,
    Schema, ScopeResolver, StoredDefinition, TreeBuilder, TypeDictionary, TypeResolver,
};
use formgen_types::{Expression, Scope, Selections, Value};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Engine {
    dictionary: Arc<TypeDictionary>,
    roots: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    config: EngineConfig,
}

impl Engine {
    /// Flatten `document` and its transitive type closure
    pub fn load<R: TypeResolver + ?Sized>(
        document: &StoredDefinition,
        resolver: &R,
        config: EngineConfig,
    ) -> Result<Self> {
        let output = formgen_core::load(document, resolver)?;
        for diagnostic in &output.diagnostics {
            if diagnostic.is_warning() {
                warn!(%diagnostic, "load diagnostic");
            } else {
                info!(%diagnostic, "load diagnostic");
            }
        }
        info!(
            roots = ?output.roots,
            definitions = output.dictionary.len(),
            "model loaded"
        );
        Ok(Self {
            dictionary: Arc::new(output.dictionary),
            roots: output.roots,
            diagnostics: output.diagnostics,
            config,
        })
    }

    /// Load a JSON document from disk. Types are looked up in the configured
    /// library roots, then next to the document itself.
    pub fn load_file(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let document = StoredDefinition::from_json_str(&source)?;

        let mut roots = config.library_roots.clone();
        if let Some(parent) = path.parent() {
            roots.push(parent.to_path_buf());
        }
        let resolver = FileSystemTypeResolver::new(roots);
        Self::load(&document, &resolver, config)
    }

    /// Wrap an already flattened dictionary, validating it first
    pub fn from_dictionary(dictionary: TypeDictionary, config: EngineConfig) -> Result<Self> {
        TreeBuilder::new(&dictionary).validate_all()?;
        Ok(Self {
            dictionary: Arc::new(dictionary),
            roots: Vec::new(),
            diagnostics: Vec::new(),
            config,
        })
    }

    pub fn dictionary(&self) -> &TypeDictionary {
        &self.dictionary
    }

    pub fn shared_dictionary(&self) -> Arc<TypeDictionary> {
        Arc::clone(&self.dictionary)
    }

    /// Classes declared in the loaded document
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve every instance path below `root`
    pub fn resolve(&self, root: &str, selections: &Selections) -> Result<Scope> {
        let validated = TreeBuilder::new(&self.dictionary).validate(root)?;
        Ok(resolve_scope(
            &validated,
            selections,
            self.config.max_node_visits,
        )?)
    }

    pub fn get_value(&self, scope: &Scope, instance_path: &str) -> Result<Value> {
        Ok(get_value(scope, instance_path)?)
    }

    /// Evaluate an expression over absolute instance paths
    pub fn evaluate(
        &self,
        expression: &Expression,
        scope: &Scope,
        selections: &Selections,
    ) -> Result<Value> {
        Ok(formgen_core::evaluate(expression, scope, selections)?)
    }

    /// Resolve `root` and emit its form schema using the configured policy
    pub fn schema(&self, root: &str, selections: &Selections) -> Result<Schema> {
        let validated = TreeBuilder::new(&self.dictionary).validate(root)?;
        let mut resolver = ScopeResolver::new(&validated, selections, self.config.max_node_visits)?;
        Ok(build_schema(&mut resolver, self.config.enable_policy)?)
    }

    /// Resolve independent requests in parallel. Results keep request order;
    /// a failing request does not affect the others.
    pub fn resolve_batch(&self, root: &str, requests: &[Selections]) -> Vec<Result<Scope>> {
        requests
            .par_iter()
            .map(|selections| self.resolve(root, selections))
            .collect()
    }
}
