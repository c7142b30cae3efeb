//! Expression Evaluator
//!
//! Evaluates the closed operator set over [`Term`] trees. Precedence is
//! already encoded in the tree shape; operands are evaluated depth-first,
//! left to right, and both sides of `&&`/`||` are always evaluated.
//!
//! Variable lookup is delegated to a [`VariableSource`]. The scope resolver
//! supplies one that resolves references on demand; [`evaluate`] uses a
//! finished [`Scope`] plus [`Selections`].

use crate::error::{ResolveError, ResolveResult};
use formgen_types::{Expression, Operator, Scope, Selections, Term, Value, VariableReference};
use std::cmp::Ordering;

/// Supplies values for variable references during evaluation
pub trait VariableSource {
    fn lookup(&mut self, reference: &VariableReference) -> ResolveResult<Value>;
}

pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate_term<S: VariableSource + ?Sized>(
        &self,
        term: &Term,
        source: &mut S,
    ) -> ResolveResult<Value> {
        match term {
            Term::Literal(value) => Ok(value.clone()),
            Term::Reference(reference) => source.lookup(reference),
            Term::Expression(expression) => self.evaluate_expression(expression, source),
        }
    }

    pub fn evaluate_expression<S: VariableSource + ?Sized>(
        &self,
        expression: &Expression,
        source: &mut S,
    ) -> ResolveResult<Value> {
        let operator =
            Operator::from_symbol(&expression.operator).ok_or_else(|| ResolveError::UnknownOperator {
                operator: expression.operator.clone(),
            })?;
        if expression.operands.len() != operator.arity() {
            return Err(arity_mismatch(operator, expression.operands.len()));
        }

        let operands = expression
            .operands
            .iter()
            .map(|operand| self.evaluate_term(operand, source))
            .collect::<ResolveResult<Vec<_>>>()?;

        match (operator, operands.as_slice()) {
            (Operator::Not, [value]) => Ok(Value::Boolean(!require_bool(operator, value)?)),
            (Operator::And, [lhs, rhs]) => {
                let (l, r) = (require_bool(operator, lhs)?, require_bool(operator, rhs)?);
                Ok(Value::Boolean(l && r))
            }
            (Operator::Or, [lhs, rhs]) => {
                let (l, r) = (require_bool(operator, lhs)?, require_bool(operator, rhs)?);
                Ok(Value::Boolean(l || r))
            }
            (op, [lhs, rhs]) if op.is_comparison() => compare(op, lhs, rhs).map(Value::Boolean),
            (op, values) => Err(arity_mismatch(op, values.len())),
        }
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn arity_mismatch(operator: Operator, found: usize) -> ResolveError {
    ResolveError::ArityMismatch {
        operator: operator.symbol().to_string(),
        expected: operator.arity(),
        found,
    }
}

fn require_bool(operator: Operator, value: &Value) -> ResolveResult<bool> {
    value.as_bool().ok_or_else(|| {
        ResolveError::type_mismatch(
            format!("operand of '{}'", operator.symbol()),
            "Boolean",
            value.kind_name(),
        )
    })
}

fn compare(operator: Operator, lhs: &Value, rhs: &Value) -> ResolveResult<bool> {
    let ordering = match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(ResolveError::type_mismatch(
                    format!("comparison '{}'", operator.symbol()),
                    lhs.kind_name(),
                    rhs.kind_name(),
                ))
            }
        },
    };

    // NaN compares unequal to everything
    Ok(match (operator, ordering) {
        (Operator::Ne, ordering) => ordering != Some(Ordering::Equal),
        (_, None) => false,
        (Operator::Eq, Some(o)) => o == Ordering::Equal,
        (Operator::Lt, Some(o)) => o == Ordering::Less,
        (Operator::Le, Some(o)) => o != Ordering::Greater,
        (Operator::Gt, Some(o)) => o == Ordering::Greater,
        (Operator::Ge, Some(o)) => o != Ordering::Less,
        (_, Some(_)) => false,
    })
}

// =============================================================================
// Evaluation against a finished scope
// =============================================================================

/// Looks references up in Selections first, then in a resolved Scope
struct ScopeSource<'a> {
    scope: &'a Scope,
    selections: &'a Selections,
}

impl VariableSource for ScopeSource<'_> {
    fn lookup(&mut self, reference: &VariableReference) -> ResolveResult<Value> {
        let path = reference.as_str();
        self.selections
            .get(path)
            .or_else(|| self.scope.get(path))
            .cloned()
            .ok_or_else(|| ResolveError::unresolved(path, "scope"))
    }
}

/// Evaluate an expression against a resolved scope. References are absolute
/// instance paths.
pub fn evaluate(
    expression: &Expression,
    scope: &Scope,
    selections: &Selections,
) -> ResolveResult<Value> {
    ExpressionEvaluator::new().evaluate_expression(expression, &mut ScopeSource { scope, selections })
}

/// Evaluate any term against a resolved scope
pub fn evaluate_term(term: &Term, scope: &Scope, selections: &Selections) -> ResolveResult<Value> {
    ExpressionEvaluator::new().evaluate_term(term, &mut ScopeSource { scope, selections })
}
