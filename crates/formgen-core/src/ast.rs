//! Input AST - the JSON shape produced by the upstream model exporter
//!
//! These types mirror the exporter's output field for field; they carry no
//! behaviour beyond small lookups. The flattener turns them into
//! [`formgen_types::Definition`]s.
//!
//! ```text
//! StoredDefinition { within?, class_definition: [ClassDefinition] }
//!   ClassDefinition { class_prefixes, class_specifier.long_class_specifier }
//!     LongClassSpecifier { identifier, description_string?, composition }
//!       Composition { element_list: [Element] }
//!         Element = component_clause | extends_clause | class_definition
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// DOCUMENT
// =============================================================================

/// One exported source unit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredDefinition {
    /// Package prefix the classes live in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
    #[serde(default)]
    pub class_definition: Vec<ClassDefinition>,
}

impl StoredDefinition {
    pub fn from_json_str(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Fully qualified name of a top-level class in this unit
    pub fn qualified_name(&self, class: &ClassDefinition) -> String {
        qualify(self.within.as_deref(), class.identifier())
    }

    /// Find a class by its fully qualified name, descending into nested
    /// class definitions
    pub fn find_class(&self, qualified: &str) -> Option<&ClassDefinition> {
        let local = match self.within.as_deref().filter(|w| !w.is_empty()) {
            Some(within) => qualified.strip_prefix(within)?.strip_prefix('.')?,
            None => qualified,
        };
        let mut segments = local.split('.');
        let first = segments.next()?;
        let mut current = self
            .class_definition
            .iter()
            .find(|c| c.identifier() == first)?;
        for segment in segments {
            current = current.nested_classes().find(|c| c.identifier() == segment)?;
        }
        Some(current)
    }
}

/// Join a prefix and an identifier with a dot, skipping an empty prefix
pub fn qualify(prefix: Option<&str>, identifier: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}.{}", p, identifier),
        _ => identifier.to_string(),
    }
}

// =============================================================================
// CLASSES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDefinition {
    /// Restricted-class keyword(s): `model`, `block`, `partial model`, ...
    #[serde(default)]
    pub class_prefixes: String,
    pub class_specifier: ClassSpecifier,
}

impl ClassDefinition {
    pub fn identifier(&self) -> &str {
        &self.class_specifier.long_class_specifier.identifier
    }

    pub fn description(&self) -> Option<&str> {
        self.class_specifier
            .long_class_specifier
            .description_string
            .as_deref()
    }

    pub fn elements(&self) -> &[Element] {
        &self
            .class_specifier
            .long_class_specifier
            .composition
            .element_list
    }

    pub fn nested_classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.elements().iter().filter_map(|e| match e {
            Element::ClassDefinition(c) => Some(c),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSpecifier {
    pub long_class_specifier: LongClassSpecifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongClassSpecifier {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_string: Option<String>,
    #[serde(default)]
    pub composition: Composition,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Composition {
    #[serde(default)]
    pub element_list: Vec<Element>,
}

/// One entry of a class body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    ComponentClause(ComponentClause),
    ExtendsClause(ExtendsClause),
    ClassDefinition(ClassDefinition),
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// `parameter Boolean a = true, b = false;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_prefix: Option<String>,
    pub type_specifier: String,
    #[serde(default)]
    pub component_list: Vec<ComponentDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDeclaration {
    pub declaration: Declaration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
}

impl ComponentDeclaration {
    pub fn identifier(&self) -> &str {
        &self.declaration.identifier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<Modification>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Description {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_string: Option<String>,
    #[serde(default)]
    pub annotation: Vec<ElementModification>,
}

impl Description {
    /// The `Dialog(enable = ...)` annotation expression, if any
    pub fn enable_annotation(&self) -> Option<&ModificationExpression> {
        self.annotation
            .iter()
            .find(|a| a.name == "Dialog")?
            .modification
            .as_ref()?
            .class_modification
            .iter()
            .find(|m| m.name == "enable")?
            .modification
            .as_ref()?
            .expression
            .as_ref()
    }
}

/// `extends Base(x = 1);`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendsClause {
    pub name: String,
    #[serde(default)]
    pub class_modification: Vec<ElementModification>,
}

// =============================================================================
// MODIFICATIONS AND EXPRESSIONS
// =============================================================================

/// `(a = 1, b(c = 2)) = expr`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default)]
    pub class_modification: Vec<ElementModification>,
    #[serde(default)]
    pub equal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<ModificationExpression>,
}

/// One `name(...) = expr` entry inside a class modification or annotation.
/// `name` may be dotted (`sub.x = 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementModification {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<Modification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_string: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationExpression {
    pub simple_expression: SimpleExpression,
}

/// The exporter emits most expressions as source text, but plain booleans
/// and numbers sometimes arrive as JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SimpleExpression {
    Boolean(bool),
    Number(serde_json::Number),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredDefinition {
        serde_json::from_value(serde_json::json!({
            "within": "Lib",
            "class_definition": [{
                "class_prefixes": "model",
                "class_specifier": { "long_class_specifier": {
                    "identifier": "Outer",
                    "composition": { "element_list": [
                        { "class_definition": {
                            "class_prefixes": "record",
                            "class_specifier": { "long_class_specifier": {
                                "identifier": "Inner"
                            }}
                        }},
                        { "component_clause": {
                            "type_specifier": "Boolean",
                            "component_list": [{
                                "declaration": { "identifier": "flag" },
                                "description": {
                                    "description_string": "A flag",
                                    "annotation": [{
                                        "name": "Dialog",
                                        "modification": { "class_modification": [{
                                            "name": "enable",
                                            "modification": {
                                                "equal": true,
                                                "expression": { "simple_expression": "other == 1" }
                                            }
                                        }]}
                                    }]
                                }
                            }]
                        }}
                    ]}
                }}
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_find_nested_class_by_qualified_name() {
        let doc = sample();
        assert_eq!(doc.find_class("Lib.Outer").unwrap().identifier(), "Outer");
        assert_eq!(
            doc.find_class("Lib.Outer.Inner").unwrap().class_prefixes,
            "record"
        );
        assert!(doc.find_class("Outer").is_none());
        assert!(doc.find_class("Lib.Missing").is_none());
    }

    #[test]
    fn test_enable_annotation_lookup() {
        let doc = sample();
        let class = doc.find_class("Lib.Outer").unwrap();
        let Element::ComponentClause(clause) = &class.elements()[1] else {
            panic!("expected component clause");
        };
        let description = clause.component_list[0].description.as_ref().unwrap();
        let enable = description.enable_annotation().unwrap();
        assert_eq!(
            enable.simple_expression,
            SimpleExpression::Text("other == 1".into())
        );
    }

    #[test]
    fn test_simple_expression_accepts_scalars() {
        let e: ModificationExpression =
            serde_json::from_value(serde_json::json!({ "simple_expression": true })).unwrap();
        assert_eq!(e.simple_expression, SimpleExpression::Boolean(true));
        let e: ModificationExpression =
            serde_json::from_value(serde_json::json!({ "simple_expression": 4 })).unwrap();
        assert!(matches!(e.simple_expression, SimpleExpression::Number(_)));
    }
}
