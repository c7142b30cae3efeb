//! Load-time failures and recoveries: structural errors abort the load,
//! malformed annotations and values are kept as diagnostics.

use formgen_core::{
    load, DiagnosticCode, InMemoryTypeResolver, LoadError, StoredDefinition, TreeBuilder,
};
use formgen_types::Term;
use serde_json::json;

fn class(identifier: &str, elements: serde_json::Value) -> serde_json::Value {
    json!({
        "class_prefixes": "model",
        "class_specifier": { "long_class_specifier": {
            "identifier": identifier,
            "composition": { "element_list": elements }
        }}
    })
}

fn component(type_specifier: &str, identifier: &str) -> serde_json::Value {
    json!({ "component_clause": {
        "type_specifier": type_specifier,
        "component_list": [{ "declaration": { "identifier": identifier } }]
    }})
}

fn document(classes: Vec<serde_json::Value>) -> StoredDefinition {
    serde_json::from_value(json!({ "class_definition": classes })).unwrap()
}

#[test]
fn test_mutual_composition_is_cyclic_definition() {
    let doc = document(vec![
        class("A", json!([component("B", "b")])),
        class("B", json!([component("A", "a")])),
    ]);
    let err = load(&doc, &InMemoryTypeResolver::new()).unwrap_err();
    match err {
        LoadError::CyclicDefinition { chain } => {
            assert_eq!(chain.first(), chain.last());
            assert!(chain.contains(&"A".to_string()));
            assert!(chain.contains(&"B".to_string()));
        }
        other => panic!("expected CyclicDefinition, got {other:?}"),
    }
}

#[test]
fn test_self_composition_is_cyclic_definition() {
    let doc = document(vec![class("Node", json!([component("Node", "next")]))]);
    let err = load(&doc, &InMemoryTypeResolver::new()).unwrap_err();
    assert!(matches!(err, LoadError::CyclicDefinition { .. }));
}

#[test]
fn test_unknown_type_names_reference() {
    let doc = document(vec![class("A", json!([component("Lib.Missing", "m")]))]);
    let err = load(&doc, &InMemoryTypeResolver::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "type 'Lib.Missing' referenced from 'A' not found"
    );
}

#[test]
fn test_type_supplied_by_second_document() {
    let library = serde_json::from_value::<StoredDefinition>(json!({
        "within": "Lib",
        "class_definition": [class("Part", json!([component("Integer", "count")]))]
    }))
    .unwrap();
    let resolver = InMemoryTypeResolver::new().with_document(library);
    let doc = document(vec![class("A", json!([component("Lib.Part", "p")]))]);
    let output = load(&doc, &resolver).unwrap();
    assert!(output.dictionary.contains("Lib.Part.count"));
    TreeBuilder::new(&output.dictionary).validate("A").unwrap();
}

#[test]
fn test_malformed_annotation_recovered() {
    let doc = document(vec![class(
        "A",
        json!([{ "component_clause": {
            "type_specifier": "Boolean",
            "component_list": [{
                "declaration": { "identifier": "x" },
                "description": { "annotation": [{ "name": "Dialog", "modification": {
                    "class_modification": [{ "name": "enable", "modification": {
                        "equal": true,
                        "expression": { "simple_expression": "(a and" }
                    }}]
                }}]}
            }]
        }}]),
    )]);
    let output = load(&doc, &InMemoryTypeResolver::new()).unwrap();
    assert_eq!(output.dictionary.get("A.x").unwrap().enable, Term::literal_true());
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].code, DiagnosticCode::MalformedAnnotation);
    assert!(output.diagnostics[0].is_warning());
}

#[test]
fn test_broken_library_file_aborts_load() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("Lib")).unwrap();
    std::fs::write(dir.path().join("Lib").join("Part.json"), "[1, 2").unwrap();
    let resolver = formgen_core::FileSystemTypeResolver::new([dir.path()]);
    let doc = document(vec![class("A", json!([component("Lib.Part", "p")]))]);
    let err = load(&doc, &resolver).unwrap_err();
    assert!(matches!(err, LoadError::InvalidDocument { .. }), "{err:?}");
}
