//! formgen-core: model flattening, scope resolution and expression evaluation
//!
//! This crate holds all of the engine logic and no I/O beyond the
//! file-system type resolver:
//! - Input AST types (the exporter's JSON shape)
//! - Nom-based expression text parser
//! - Flattener producing the Type Dictionary
//! - Tree Builder (validation and instance tree expansion)
//! - Scope Resolver and Expression Evaluator
//! - Schema emitter for form renderers
//! - YAML engine configuration
//!
//! The `formgen` crate wraps these in a shareable `Engine` and a CLI.

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod dictionary;
pub mod error;
pub mod evaluator;
pub mod flattener;
pub mod parser;
pub mod schema;
pub mod scope;
pub mod tree;
pub mod type_resolver;

// Re-export commonly used types
pub use ast::StoredDefinition;
pub use config::EngineConfig;
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use dictionary::TypeDictionary;
pub use error::{LoadError, LoadResult, ResolveError, ResolveResult};
pub use evaluator::{evaluate, evaluate_term, ExpressionEvaluator, VariableSource};
pub use flattener::{flatten, FlattenOutput, Flattener};
pub use parser::parse_expression;
pub use schema::{build_schema, EnablePolicy, EnableState, Schema, SchemaNode};
pub use scope::{get_value, resolve_scope, ScopeResolver};
pub use tree::{InstanceNode, InstanceTree, TreeBuilder, ValidatedRoot, VisitBudget};
pub use type_resolver::{FileSystemTypeResolver, InMemoryTypeResolver, TypeResolver};

/// Flatten a document and validate the whole resulting dictionary
pub fn load<R: TypeResolver + ?Sized>(
    document: &StoredDefinition,
    resolver: &R,
) -> LoadResult<FlattenOutput> {
    let output = flatten(document, resolver)?;
    TreeBuilder::new(&output.dictionary).validate_all()?;
    Ok(output)
}
