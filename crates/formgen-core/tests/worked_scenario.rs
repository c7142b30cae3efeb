//! End-to-end resolution of the `TestModel` fixture: a value declared before
//! the subtree it depends on, an instantiation override and an enable
//! predicate.
//!
//! Fixtures live in `tests/fixtures/models`, laid out the way the
//! file-system type resolver expects.

use formgen_core::{
    build_schema, evaluate, get_value, load, parse_expression, resolve_scope, EnablePolicy,
    EnableState, FileSystemTypeResolver, FlattenOutput, ResolveError, ScopeResolver,
    StoredDefinition, TreeBuilder,
};
use formgen_types::{DataType, Scope, Selections, Term, Value};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn models_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/models")
}

fn load_test_model() -> FlattenOutput {
    let path = models_dir().join("TestModel.json");
    let source = std::fs::read_to_string(&path).expect("read TestModel.json");
    let document = StoredDefinition::from_json_str(&source).expect("parse TestModel.json");
    let resolver = FileSystemTypeResolver::new([models_dir()]);
    load(&document, &resolver).expect("load TestModel")
}

fn scope_of(pairs: &[(&str, Value)]) -> Scope {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[test]
fn test_dictionary_shape() {
    let output = load_test_model();
    let dict = &output.dictionary;

    assert_eq!(output.roots, vec!["TestModel"]);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(
        dict.get("TestModel").unwrap().children,
        vec!["TestModel.hello", "TestModel.allow_hello", "TestModel.subModel"]
    );
    assert_eq!(
        dict.get("TestModel.subModel").unwrap().data_type,
        DataType::ClassReference("SubFolder.SubModel".into())
    );
    assert_eq!(
        dict.get("SubFolder.SubModel.nestedBoolean").unwrap().declared_value,
        Some(Term::literal(false))
    );
    assert_eq!(dict.get("TestModel.hello").unwrap().description, "Greeting");
}

#[test]
fn test_scope_resolves_forward_dependency() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();
    let scope = resolve_scope(&validated, &Selections::new(), 1_000).unwrap();

    assert_eq!(
        scope,
        scope_of(&[
            ("hello", Value::String("World".into())),
            ("allow_hello", Value::Boolean(true)),
            ("subModel.nestedBoolean", Value::Boolean(true)),
        ])
    );
}

#[test]
fn test_override_beats_class_default() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();
    let scope = resolve_scope(&validated, &Selections::new(), 1_000).unwrap();
    assert_eq!(
        get_value(&scope, "subModel.nestedBoolean").unwrap(),
        Value::Boolean(true)
    );

    // the class on its own keeps its default
    let validated = TreeBuilder::new(&output.dictionary)
        .validate("SubFolder.SubModel")
        .unwrap();
    let scope = resolve_scope(&validated, &Selections::new(), 1_000).unwrap();
    assert_eq!(get_value(&scope, "nestedBoolean").unwrap(), Value::Boolean(false));
}

#[test]
fn test_resolve_twice_is_identical() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();
    let selections = Selections::new().with("hello", "Moon");
    let first = resolve_scope(&validated, &selections, 1_000).unwrap();
    let second = resolve_scope(&validated, &selections, 1_000).unwrap();
    assert_eq!(first, second);
    assert_eq!(get_value(&first, "hello").unwrap(), Value::String("Moon".into()));
}

#[test]
fn test_enable_follows_selection() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();

    let selections = Selections::new();
    let mut resolver = ScopeResolver::new(&validated, &selections, 1_000).unwrap();
    let schema = build_schema(&mut resolver, EnablePolicy::Evaluate).unwrap();
    assert_eq!(schema.get("hello").unwrap().enable, EnableState::Evaluated(true));

    let selections = Selections::new().with("allow_hello", false);
    let mut resolver = ScopeResolver::new(&validated, &selections, 1_000).unwrap();
    let schema = build_schema(&mut resolver, EnablePolicy::Evaluate).unwrap();
    assert_eq!(schema.get("hello").unwrap().enable, EnableState::Evaluated(false));
    assert_eq!(schema.root, "TestModel");
}

#[test]
fn test_schema_json_output() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();
    let selections = Selections::new();
    let mut resolver = ScopeResolver::new(&validated, &selections, 1_000).unwrap();
    let schema = build_schema(&mut resolver, EnablePolicy::Defer).unwrap();

    let json = serde_json::to_value(&schema.nodes[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "path": "hello",
            "type": "String",
            "value": "World",
            "enable": { "expression": {
                "operator": "==",
                "operands": [ { "reference": "allow_hello" }, { "literal": true } ]
            }},
            "description": "Greeting",
            "childNodes": []
        })
    );
}

#[test]
fn test_expression_against_resolved_scope() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();
    let scope = resolve_scope(&validated, &Selections::new(), 1_000).unwrap();

    let Term::Expression(expression) =
        parse_expression("subModel.nestedBoolean and hello == \"World\"").unwrap()
    else {
        panic!("expected an expression");
    };
    assert_eq!(
        evaluate(&expression, &scope, &Selections::new()).unwrap(),
        Value::Boolean(true)
    );

    let Term::Expression(mismatch) = parse_expression("\"abc\" == 3").unwrap() else {
        panic!("expected an expression");
    };
    assert!(matches!(
        evaluate(&mismatch, &scope, &Selections::new()).unwrap_err(),
        ResolveError::TypeMismatch { .. }
    ));
}

#[test]
fn test_budget_exceeded() {
    let output = load_test_model();
    let validated = TreeBuilder::new(&output.dictionary).validate("TestModel").unwrap();
    let err = resolve_scope(&validated, &Selections::new(), 3).unwrap_err();
    assert_eq!(err, ResolveError::ResolutionBudgetExceeded { budget: 3 });
}
