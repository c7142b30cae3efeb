//! formgen - model flattening and form schema resolution
//!
//! Ingests the JSON AST exported for a class-based modeling language and
//! turns it into values and enable states a dynamic form can render.
//!
//! ## Pipeline
//! Exported AST -> Flattener -> Type Dictionary -> Tree Builder ->
//! Scope Resolver + Expression Evaluator -> Scope / Schema
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formgen::{Engine, EngineConfig, Selections};
//!
//! let engine = Engine::load_file("models/TestModel.json", EngineConfig::default())?;
//! let selections = Selections::new().with("subModel.nestedBoolean", false);
//! let scope = engine.resolve("TestModel", &selections)?;
//! println!("{:?}", scope.get("allow_hello"));
//! # Ok::<(), formgen::FormgenError>(())
//! ```

// Core error handling
pub mod error;

// Load-once, resolve-many facade
pub mod engine;

pub use engine::Engine;
pub use error::{FormgenError, Result};

// Re-export the layers below so most callers need only this crate
pub use formgen_core::{
    Diagnostic, EnablePolicy, EnableState, EngineConfig, FileSystemTypeResolver,
    InMemoryTypeResolver, LoadError, ResolveError, Schema, SchemaNode, StoredDefinition,
    TypeDictionary, TypeResolver,
};
pub use formgen_types::{Definition, Expression, Scope, Selections, Term, Value};
