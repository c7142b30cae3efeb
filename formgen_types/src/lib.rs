//! formgen types - foundation data model
//!
//! Pure data structures shared by every formgen crate. Nothing in here walks
//! a tree or resolves a reference; that logic lives in `formgen-core`.
//!
//! ## Contents
//!
//! - Scalar values and primitive types
//! - Data types (primitive vs class reference) and definition kinds
//! - The closed expression language: `Term`, `Expression`, `Operator`
//! - Instantiation-site modifications
//! - Type Dictionary entries (`Definition`)
//! - Per-request maps: `Selections` (input) and `Scope` (output)
//!
//! ## Rules
//!
//! 1. **NO TRAVERSAL LOGIC** - constructors, accessors and small conversions only
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - every type round-trips through serde
//! 4. **THREAD SAFE** - every type is `Send + Sync`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ============================================================================
// VALUES
// ============================================================================

/// A concrete scalar value held in a Scope or supplied as a Selection.
///
/// Serialized as the bare JSON scalar (`true`, `3`, `2.5`, `"text"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
}

/// Errors converting external JSON into values
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("'{key}' must be a boolean, number or string, found {found}")]
    NotAScalar { key: String, found: String },

    #[error("selections must be a JSON object, found {0}")]
    NotAnObject(String),
}

impl Value {
    /// Name of the value's kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Real(_) => "Real",
            Value::String(_) => "String",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    /// Coerce into the given primitive type.
    ///
    /// Only `Integer -> Real` widening is performed; every other kind change
    /// returns `None`.
    pub fn coerce_to(&self, target: PrimitiveType) -> Option<Value> {
        match (target, self) {
            (PrimitiveType::Boolean, Value::Boolean(_))
            | (PrimitiveType::Integer, Value::Integer(_))
            | (PrimitiveType::Real, Value::Real(_))
            | (PrimitiveType::String, Value::String(_)) => Some(self.clone()),
            (PrimitiveType::Real, Value::Integer(i)) => Some(Value::Real(*i as f64)),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a value; `key` names the origin for errors
    pub fn from_json(key: &str, json: &serde_json::Value) -> Result<Self, ValueError> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Integer(i)),
                None => Ok(Value::Real(n.as_f64().unwrap_or(f64::NAN))),
            },
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(ValueError::NotAScalar {
                key: key.to_string(),
                found: json_kind(other).to_string(),
            }),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Built-in scalar types of the modeling language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    String,
    Integer,
    Real,
}

impl PrimitiveType {
    /// Look up a primitive by its type-specifier name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Boolean" => Some(PrimitiveType::Boolean),
            "String" => Some(PrimitiveType::String),
            "Integer" => Some(PrimitiveType::Integer),
            "Real" => Some(PrimitiveType::Real),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::String => "String",
            PrimitiveType::Integer => "Integer",
            PrimitiveType::Real => "Real",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The declared type of a definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Primitive(PrimitiveType),
    /// Absolute dotted path of a class definition in the Type Dictionary
    ClassReference(String),
}

impl DataType {
    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            DataType::Primitive(p) => Some(*p),
            DataType::ClassReference(_) => None,
        }
    }

    pub fn class_path(&self) -> Option<&str> {
        match self {
            DataType::Primitive(_) => None,
            DataType::ClassReference(path) => Some(path),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{}", p),
            DataType::ClassReference(path) => f.write_str(path),
        }
    }
}

/// Whether a definition is a class (never addressable on its own) or a
/// component that always occupies an instance path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    ClassDefinition,
    InstantiableComponent,
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// A dotted instance-path reference, resolved against a Scope at evaluation time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableReference(pub String);

impl VariableReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed operator set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::And,
        Operator::Or,
        Operator::Not,
    ];

    /// Map a serialized operator symbol onto the closed set
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Not => "!",
        }
    }

    /// Fixed operand count
    pub fn arity(&self) -> usize {
        match self {
            Operator::Not => 1,
            _ => 2,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A literal, a variable reference or a nested expression.
///
/// Used for declared values, override values, expression operands and
/// enable predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Literal(Value),
    Reference(VariableReference),
    Expression(Box<Expression>),
}

impl Term {
    /// The default enable predicate
    pub fn literal_true() -> Self {
        Term::Literal(Value::Boolean(true))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Term::Literal(value.into())
    }

    pub fn reference(path: impl Into<String>) -> Self {
        Term::Reference(VariableReference::new(path))
    }

    pub fn expression(operator: Operator, operands: Vec<Term>) -> Self {
        Term::Expression(Box::new(Expression::new(operator, operands)))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Term::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Every variable reference in this term, depth-first left-to-right
    pub fn references(&self) -> Vec<&VariableReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a VariableReference>) {
        match self {
            Term::Literal(_) => {}
            Term::Reference(r) => out.push(r),
            Term::Expression(e) => {
                for operand in &e.operands {
                    operand.collect_references(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Literal(v) => write!(f, "{}", v),
            Term::Reference(r) => write!(f, "{}", r),
            Term::Expression(e) => write!(f, "{}", e),
        }
    }
}

/// Operator application.
///
/// The operator is kept as its symbol so serialized output preserves it
/// verbatim; the evaluator maps it onto [`Operator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub operator: String,
    pub operands: Vec<Term>,
}

impl Expression {
    pub fn new(operator: Operator, operands: Vec<Term>) -> Self {
        Self {
            operator: operator.symbol().to_string(),
            operands,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operands.as_slice() {
            [single] => write!(f, "{}({})", self.operator, single),
            [lhs, rhs] => write!(f, "({} {} {})", lhs, self.operator, rhs),
            operands => {
                write!(f, "{}(", self.operator)?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// MODIFICATIONS
// ============================================================================

/// Values supplied at an instantiation site: `sub(x = 1, inner(y = true))`.
///
/// `value` replaces the modified element's own value, `nested` descends into
/// its members by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Term>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested: BTreeMap<String, Modification>,
}

impl Modification {
    pub fn with_value(value: Term) -> Self {
        Self {
            value: Some(value),
            nested: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.nested.is_empty()
    }

    /// Follow a relative dotted path (`a.b`) through nested modifications
    pub fn lookup(&self, relative: &[&str]) -> Option<&Modification> {
        let mut current = self;
        for segment in relative {
            current = current.nested.get(*segment)?;
        }
        Some(current)
    }

    /// Overlay `winner` on top of this modification; `winner` takes
    /// precedence wherever both supply something.
    pub fn overlay(&mut self, winner: &Modification) {
        if let Some(value) = &winner.value {
            self.value = Some(value.clone());
        }
        for (name, nested) in &winner.nested {
            self.nested.entry(name.clone()).or_default().overlay(nested);
        }
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

/// One entry in the Type Dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Absolute dotted path, unique key in the dictionary
    pub path: String,
    pub kind: DefinitionKind,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<Term>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Term::literal_true")]
    pub enable: Term,
    /// Ordered child definition paths (composite kinds only)
    #[serde(default)]
    pub children: Vec<String>,
    /// Modifications supplied where this component is instantiated
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, Modification>,
    /// Restricted-class keyword for class definitions (`model`, `record`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_prefix: Option<String>,
}

impl Definition {
    /// A class definition with the given member paths
    pub fn class(path: impl Into<String>, children: Vec<String>) -> Self {
        let path = path.into();
        Self {
            data_type: DataType::ClassReference(path.clone()),
            path,
            kind: DefinitionKind::ClassDefinition,
            declared_value: None,
            description: String::new(),
            enable: Term::literal_true(),
            children,
            overrides: BTreeMap::new(),
            class_prefix: None,
        }
    }

    /// A component of the given type; class-typed components get the class
    /// path as their single child
    pub fn component(path: impl Into<String>, data_type: DataType) -> Self {
        let children = match &data_type {
            DataType::ClassReference(class_path) => vec![class_path.clone()],
            DataType::Primitive(_) => Vec::new(),
        };
        Self {
            path: path.into(),
            kind: DefinitionKind::InstantiableComponent,
            data_type,
            declared_value: None,
            description: String::new(),
            enable: Term::literal_true(),
            children,
            overrides: BTreeMap::new(),
            class_prefix: None,
        }
    }

    pub fn with_value(mut self, value: Term) -> Self {
        self.declared_value = Some(value);
        self
    }

    pub fn with_enable(mut self, enable: Term) -> Self {
        self.enable = enable;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_override(mut self, child: impl Into<String>, modification: Modification) -> Self {
        self.overrides.insert(child.into(), modification);
        self
    }

    /// Last path segment
    pub fn identifier(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    pub fn is_class(&self) -> bool {
        self.kind == DefinitionKind::ClassDefinition
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    /// Same definition moved to a new path (used when copying inherited members)
    pub fn relocated(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

// ============================================================================
// PER-REQUEST MAPS
// ============================================================================

/// Externally supplied user choices, keyed by instance path
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selections(BTreeMap<String, Value>);

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(path.into(), value.into());
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(path.into(), value.into());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Parse a flat JSON object of scalars
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValueError> {
        let object = json
            .as_object()
            .ok_or_else(|| ValueError::NotAnObject(json_kind(json).to_string()))?;
        let mut selections = Selections::new();
        for (key, value) in object {
            selections.insert(key.clone(), Value::from_json(key, value)?);
        }
        Ok(selections)
    }
}

impl FromIterator<(String, Value)> for Selections {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolved instance path -> value mapping for one (root, selections) request.
///
/// Immutable once built; iterates in sorted path order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(BTreeMap<String, Value>);

impl Scope {
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<BTreeMap<String, Value>> for Scope {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Scope {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_json_roundtrip_is_bare_scalar() {
        let json = serde_json::to_string(&Value::String("World".into())).unwrap();
        assert_eq!(json, "\"World\"");
        let back: Value = serde_json::from_str("3").unwrap();
        assert_eq!(back, Value::Integer(3));
        let back: Value = serde_json::from_str("2.5").unwrap();
        assert_eq!(back, Value::Real(2.5));
    }

    #[test]
    fn test_coerce_widens_integer_only() {
        assert_eq!(
            Value::Integer(2).coerce_to(PrimitiveType::Real),
            Some(Value::Real(2.0))
        );
        assert_eq!(Value::Real(2.0).coerce_to(PrimitiveType::Integer), None);
        assert_eq!(Value::from("x").coerce_to(PrimitiveType::Boolean), None);
    }

    #[test]
    fn test_operator_symbols_are_closed() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(Operator::from_symbol("+"), None);
        assert_eq!(Operator::Not.arity(), 1);
        assert_eq!(Operator::And.arity(), 2);
    }

    #[test]
    fn test_term_references_in_order() {
        let term = Term::expression(
            Operator::And,
            vec![
                Term::reference("a"),
                Term::expression(Operator::Not, vec![Term::reference("b.c")]),
            ],
        );
        let refs: Vec<&str> = term.references().iter().map(|r| r.as_str()).collect();
        assert_eq!(refs, vec!["a", "b.c"]);
    }

    #[test]
    fn test_modification_overlay_winner_takes_precedence() {
        let mut base = Modification::default();
        base.nested
            .insert("x".into(), Modification::with_value(Term::literal(1)));
        base.nested
            .insert("y".into(), Modification::with_value(Term::literal(2)));

        let mut winner = Modification::default();
        winner
            .nested
            .insert("x".into(), Modification::with_value(Term::literal(10)));

        base.overlay(&winner);
        assert_eq!(
            base.nested["x"].value,
            Some(Term::literal(10)),
            "winner replaces"
        );
        assert_eq!(base.nested["y"].value, Some(Term::literal(2)));
    }

    #[test]
    fn test_component_children_point_at_class() {
        let def = Definition::component(
            "TestModel.subModel",
            DataType::ClassReference("SubFolder.SubModel".into()),
        );
        assert_eq!(def.children, vec!["SubFolder.SubModel".to_string()]);
        assert_eq!(def.identifier(), "subModel");
        assert!(!def.is_class());
    }

    #[test]
    fn test_selections_reject_non_scalars() {
        let json = serde_json::json!({ "a": true, "b": [1, 2] });
        let err = Selections::from_json(&json).unwrap_err();
        assert_eq!(
            err,
            ValueError::NotAScalar {
                key: "b".into(),
                found: "array".into()
            }
        );
        let ok = Selections::from_json(&serde_json::json!({ "a": 1 })).unwrap();
        assert_eq!(ok.get("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_definition_deserializes_with_defaults() {
        let def: Definition = serde_json::from_value(serde_json::json!({
            "path": "M.x",
            "kind": "instantiable_component",
            "data_type": { "primitive": "Boolean" }
        }))
        .unwrap();
        assert_eq!(def.enable, Term::literal_true());
        assert!(def.children.is_empty());
    }
}
