//! Schema emitter
//!
//! Turns a resolved instance tree into the node records a form renderer
//! consumes: one [`SchemaNode`] per component instance, in pre-order.
//! Class definitions never appear.
//!
//! The enable predicate is handled uniformly according to [`EnablePolicy`]:
//! evaluated here to a boolean, or deferred as an expression whose
//! references have been rewritten to absolute instance paths.

use crate::error::{ResolveError, ResolveResult};
use crate::scope::ScopeResolver;
use formgen_types::{Expression, Term, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnablePolicy {
    /// Store the evaluated boolean
    #[default]
    Evaluate,
    /// Store the predicate for the consumer to evaluate
    Defer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnableState {
    Evaluated(bool),
    Deferred(Term),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    pub path: String,
    /// Primitive type name or referenced class path
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub enable: EnableState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Instance paths of the direct child nodes
    #[serde(default)]
    pub child_nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub root: String,
    pub nodes: Vec<SchemaNode>,
}

impl Schema {
    pub fn get(&self, path: &str) -> Option<&SchemaNode> {
        self.nodes.iter().find(|n| n.path == path)
    }
}

/// Resolve everything left in `resolver` and emit the schema
pub fn build_schema(resolver: &mut ScopeResolver<'_, '_>, policy: EnablePolicy) -> ResolveResult<Schema> {
    resolver.resolve_all()?;
    let scope = resolver.scope();

    let mut nodes = Vec::with_capacity(resolver.tree().len());
    for index in 0..resolver.tree().len() {
        let node = resolver.tree().node(index);
        let definition = node.definition;
        let path = node.instance_path.clone();
        let context = node.context.clone();
        let child_nodes = node
            .children
            .iter()
            .map(|&child| resolver.tree().node(child).instance_path.clone())
            .collect();

        let enable = match policy {
            EnablePolicy::Evaluate => match resolver.evaluate_in(&definition.enable, &context)? {
                Value::Boolean(enabled) => EnableState::Evaluated(enabled),
                other => {
                    return Err(ResolveError::type_mismatch(
                        format!("enable of '{}'", path),
                        "Boolean",
                        other.kind_name(),
                    ))
                }
            },
            EnablePolicy::Defer => {
                EnableState::Deferred(absolutize(resolver, &definition.enable, &context))
            }
        };

        nodes.push(SchemaNode {
            value: scope.get(&path).cloned(),
            path,
            type_name: definition.data_type.to_string(),
            enable,
            description: definition.description.clone(),
            child_nodes,
        });
    }

    Ok(Schema {
        root: resolver.tree().root_path().to_string(),
        nodes,
    })
}

/// Rewrite every reference in `term` to the absolute path it binds to
fn absolutize(resolver: &ScopeResolver<'_, '_>, term: &Term, context: &str) -> Term {
    match term {
        Term::Literal(_) => term.clone(),
        Term::Reference(reference) => Term::reference(resolver.absolute_path(reference, context)),
        Term::Expression(expression) => Term::Expression(Box::new(Expression {
            operator: expression.operator.clone(),
            operands: expression
                .operands
                .iter()
                .map(|operand| absolutize(resolver, operand, context))
                .collect(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::TypeDictionary;
    use crate::tree::TreeBuilder;
    use formgen_types::{DataType, Definition, Modification, Operator, PrimitiveType, Selections};
    use pretty_assertions::assert_eq;

    fn dictionary() -> TypeDictionary {
        vec![
            Definition::class("Top", vec!["Top.on".into(), "Top.sub".into()]),
            Definition::component("Top.on", DataType::Primitive(PrimitiveType::Boolean))
                .with_value(Term::literal(false))
                .with_description("Switch"),
            Definition::component("Top.sub", DataType::ClassReference("Sub".into()))
                .with_override("n", Modification::with_value(Term::literal(4))),
            Definition::class("Sub", vec!["Sub.n".into(), "Sub.gated".into()]),
            Definition::component("Sub.n", DataType::Primitive(PrimitiveType::Integer)),
            Definition::component("Sub.gated", DataType::Primitive(PrimitiveType::Real))
                .with_enable(Term::expression(
                    Operator::Gt,
                    vec![Term::reference("n"), Term::literal(3)],
                )),
        ]
        .into_iter()
        .collect()
    }

    fn schema(policy: EnablePolicy, selections: &Selections) -> ResolveResult<Schema> {
        let dict = dictionary();
        let validated = TreeBuilder::new(&dict).validate("Top").unwrap();
        let mut resolver = ScopeResolver::new(&validated, selections, 1_000)?;
        build_schema(&mut resolver, policy)
    }

    #[test]
    fn test_evaluated_schema() {
        let schema = schema(EnablePolicy::Evaluate, &Selections::new()).unwrap();
        let paths: Vec<&str> = schema.nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["on", "sub", "sub.n", "sub.gated"]);

        let sub = schema.get("sub").unwrap();
        assert_eq!(sub.type_name, "Sub");
        assert_eq!(sub.child_nodes, vec!["sub.n", "sub.gated"]);
        assert_eq!(sub.value, None);

        assert_eq!(schema.get("sub.n").unwrap().value, Some(Value::Integer(4)));
        assert_eq!(schema.get("sub.gated").unwrap().enable, EnableState::Evaluated(true));
        assert_eq!(schema.get("on").unwrap().description, "Switch");
    }

    #[test]
    fn test_deferred_enable_uses_absolute_paths() {
        let schema = schema(EnablePolicy::Defer, &Selections::new()).unwrap();
        assert_eq!(
            schema.get("sub.gated").unwrap().enable,
            EnableState::Deferred(Term::expression(
                Operator::Gt,
                vec![Term::reference("sub.n"), Term::literal(3)],
            ))
        );
    }

    #[test]
    fn test_serialized_shape() {
        let schema = schema(EnablePolicy::Evaluate, &Selections::new().with("sub.n", 1)).unwrap();
        let json = serde_json::to_value(schema.get("sub.gated").unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "sub.gated",
                "type": "Real",
                "enable": false,
                "childNodes": []
            })
        );
    }

    #[test]
    fn test_non_boolean_enable_is_type_mismatch() {
        let mut dict = dictionary();
        dict.insert(Definition::class("Bad", vec!["Bad.x".into()]));
        dict.insert(
            Definition::component("Bad.x", DataType::Primitive(PrimitiveType::Boolean))
                .with_enable(Term::literal(1)),
        );
        let validated = TreeBuilder::new(&dict).validate("Bad").unwrap();
        let selections = Selections::new();
        let mut resolver = ScopeResolver::new(&validated, &selections, 1_000).unwrap();
        let err = build_schema(&mut resolver, EnablePolicy::Evaluate).unwrap_err();
        assert_eq!(err, ResolveError::type_mismatch("enable of 'x'", "Boolean", "Integer"));
    }
}
