//! Scope Resolver
//!
//! Resolves every node of an [`InstanceTree`] to a concrete value for one
//! (root, selections) request.
//!
//! Value priority per node:
//!
//! 1. `Selections[instance path]`
//! 2. override supplied at an enclosing instantiation site (evaluated in
//!    that site's context)
//! 3. the definition's declared value (evaluated in the node's context)
//!
//! References are resolved on demand: resolving a node first resolves the
//! nodes its value refers to, whatever their position in the document. The
//! walk uses an explicit work stack rather than recursion; re-entering a node
//! on that stack is a [`ResolveError::CyclicReference`].
//!
//! Components whose type is a class are composite and never hold a value;
//! selections keyed on them are ignored.
//!
//! Lookup is lexical. A reference `r` evaluated in context `p.q` tries
//! `p.q.r`, `p.r`, then `r`; at each candidate Selections are consulted
//! before the tree.

use crate::error::{ResolveError, ResolveResult};
use crate::evaluator::{ExpressionEvaluator, VariableSource};
use crate::tree::{InstanceTree, ValidatedRoot, VisitBudget};
use formgen_types::{Definition, Scope, Selections, Term, Value, VariableReference};
use tracing::{debug, info};

#[derive(Debug, Clone)]
enum NodeState {
    Pending,
    Visiting,
    /// `None` for nodes without any value source
    Resolved(Option<Value>),
}

/// What a reference binds to from a given context
enum Binding<'s> {
    Selected(&'s Value),
    Node(usize),
    Unbound,
}

pub struct ScopeResolver<'d, 's> {
    tree: InstanceTree<'d>,
    selections: &'s Selections,
    budget: VisitBudget,
    states: Vec<NodeState>,
    /// Work stack of nodes being resolved; each entry is a dependency of the
    /// one below it
    visiting: Vec<usize>,
}

impl<'d, 's> ScopeResolver<'d, 's> {
    /// Expand the instance tree below `root`; expansion already draws from
    /// the visit budget
    pub fn new(
        root: &ValidatedRoot<'d>,
        selections: &'s Selections,
        max_visits: usize,
    ) -> ResolveResult<Self> {
        let mut budget = VisitBudget::new(max_visits);
        let tree = root.instantiate(&mut budget)?;
        let states = vec![NodeState::Pending; tree.len()];
        Ok(Self {
            tree,
            selections,
            budget,
            states,
            visiting: Vec::new(),
        })
    }

    pub fn tree(&self) -> &InstanceTree<'d> {
        &self.tree
    }

    pub fn selections(&self) -> &'s Selections {
        self.selections
    }

    pub fn budget(&self) -> VisitBudget {
        self.budget
    }

    /// Resolve every node in pre-order
    pub fn resolve_all(&mut self) -> ResolveResult<()> {
        for index in 0..self.tree.len() {
            self.resolve_node(index)?;
        }
        Ok(())
    }

    /// Value of one instance path, resolving it first if needed
    pub fn value_of(&mut self, instance_path: &str) -> ResolveResult<Option<Value>> {
        match self.tree.index_of(instance_path) {
            Some(index) => self.resolve_node(index),
            None => Ok(self.selections.get(instance_path).cloned()),
        }
    }

    /// Snapshot of every node resolved so far that has a value
    pub fn scope(&self) -> Scope {
        self.tree
            .nodes()
            .iter()
            .zip(&self.states)
            .filter_map(|(node, state)| match state {
                NodeState::Resolved(Some(value)) => {
                    Some((node.instance_path.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Evaluate a term with references looked up from `context` outward
    pub fn evaluate_in(&mut self, term: &Term, context: &str) -> ResolveResult<Value> {
        let mut source = ContextSource {
            resolver: self,
            context,
        };
        ExpressionEvaluator::new().evaluate_term(term, &mut source)
    }

    /// Absolute instance path a reference in `context` would bind to, or the
    /// reference unchanged when nothing matches
    pub fn absolute_path(&self, reference: &VariableReference, context: &str) -> String {
        lexical_candidates(context, reference.as_str())
            .into_iter()
            .find(|candidate| {
                self.selected(candidate).is_some() || self.tree.index_of(candidate).is_some()
            })
            .unwrap_or_else(|| reference.as_str().to_string())
    }

    /// Resolve one node and, first, everything its value depends on.
    ///
    /// Dependencies are resolved on an explicit work stack, so chain length
    /// is bounded by the visit budget only. On failure every node this call
    /// entered goes back to pending.
    fn resolve_node(&mut self, index: usize) -> ResolveResult<Option<Value>> {
        match &self.states[index] {
            NodeState::Resolved(value) => return Ok(value.clone()),
            NodeState::Visiting => return Err(self.cycle(index)),
            NodeState::Pending => {}
        }

        let base = self.visiting.len();
        let result = self.drive(index, base);
        if result.is_err() {
            for entered in self.visiting.drain(base..) {
                self.states[entered] = NodeState::Pending;
            }
        }
        result
    }

    fn drive(&mut self, index: usize, base: usize) -> ResolveResult<Option<Value>> {
        self.enter(index)?;
        while self.visiting.len() > base {
            let current = self.visiting[self.visiting.len() - 1];
            match self.pending_dependency(current) {
                Some(dependency) => {
                    if matches!(self.states[dependency], NodeState::Visiting) {
                        return Err(self.cycle(dependency));
                    }
                    self.enter(dependency)?;
                }
                None => {
                    let value = self.compute(current)?;
                    self.states[current] = NodeState::Resolved(value);
                    self.visiting.pop();
                }
            }
        }
        match &self.states[index] {
            NodeState::Resolved(value) => Ok(value.clone()),
            _ => Ok(None),
        }
    }

    fn enter(&mut self, index: usize) -> ResolveResult<()> {
        self.budget.visit()?;
        self.states[index] = NodeState::Visiting;
        self.visiting.push(index);
        Ok(())
    }

    fn cycle(&self, index: usize) -> ResolveError {
        let start = self
            .visiting
            .iter()
            .position(|&entry| entry == index)
            .unwrap_or(0);
        let mut chain: Vec<String> = self.visiting[start..]
            .iter()
            .map(|&entry| self.tree.node(entry).instance_path.clone())
            .collect();
        chain.push(self.tree.node(index).instance_path.clone());
        ResolveError::CyclicReference { chain }
    }

    /// Selection for an instance path. Composite components carry no value,
    /// so selections keyed on them are ignored.
    fn selected(&self, instance_path: &str) -> Option<&'s Value> {
        let composite = self
            .tree
            .get(instance_path)
            .is_some_and(|node| node.definition.data_type.as_primitive().is_none());
        if composite {
            return None;
        }
        self.selections.get(instance_path)
    }

    /// The term a node's value comes from and the context it is evaluated
    /// in; `None` for composite nodes, selected nodes, and nodes without a
    /// source
    fn value_source(&self, index: usize) -> Option<(&Term, &str)> {
        let node = self.tree.node(index);
        node.definition.data_type.as_primitive()?;
        if self.selected(&node.instance_path).is_some() {
            return None;
        }
        match &node.override_value {
            Some(scoped) => Some((&scoped.term, scoped.context.as_str())),
            None => node
                .definition
                .declared_value
                .as_ref()
                .map(|term| (term, node.context.as_str())),
        }
    }

    /// First node referenced by `index`'s value source that is not resolved yet
    fn pending_dependency(&self, index: usize) -> Option<usize> {
        let (term, context) = self.value_source(index)?;
        term.references()
            .into_iter()
            .find_map(|reference| match self.bind(reference, context) {
                Binding::Node(dependency)
                    if !matches!(self.states[dependency], NodeState::Resolved(_)) =>
                {
                    Some(dependency)
                }
                _ => None,
            })
    }

    fn compute(&mut self, index: usize) -> ResolveResult<Option<Value>> {
        let node = self.tree.node(index);
        let definition: &'d Definition = node.definition;
        let path = node.instance_path.clone();
        let context = node.context.clone();
        let override_value = node.override_value.clone();

        let Some(primitive) = definition.data_type.as_primitive() else {
            debug!(path = %path, "composite node has no value");
            return Ok(None);
        };

        let value = if let Some(selected) = self.selected(&path) {
            Some(selected.clone())
        } else if let Some(scoped) = override_value {
            Some(self.evaluate_in(&scoped.term, &scoped.context)?)
        } else if let Some(declared) = &definition.declared_value {
            Some(self.evaluate_in(declared, &context)?)
        } else {
            None
        };

        let value = match value {
            Some(value) => Some(value.coerce_to(primitive).ok_or_else(|| {
                ResolveError::type_mismatch(&path, primitive.as_str(), value.kind_name())
            })?),
            None => None,
        };
        debug!(path = %path, value = ?value, "resolved node");
        Ok(value)
    }

    fn bind(&self, reference: &VariableReference, context: &str) -> Binding<'s> {
        for candidate in lexical_candidates(context, reference.as_str()) {
            if let Some(selected) = self.selected(&candidate) {
                return Binding::Selected(selected);
            }
            if let Some(index) = self.tree.index_of(&candidate) {
                return Binding::Node(index);
            }
        }
        Binding::Unbound
    }

    fn lookup(&mut self, reference: &VariableReference, context: &str) -> ResolveResult<Value> {
        match self.bind(reference, context) {
            Binding::Selected(value) => Ok(value.clone()),
            Binding::Node(index) => self.resolve_node(index)?.ok_or_else(|| {
                ResolveError::unresolved(reference.as_str(), self.requester(context))
            }),
            Binding::Unbound => Err(ResolveError::unresolved(
                reference.as_str(),
                self.requester(context),
            )),
        }
    }

    /// Node on whose behalf a lookup runs, for error messages
    fn requester(&self, context: &str) -> String {
        self.visiting
            .last()
            .map(|&entry| self.tree.node(entry).instance_path.clone())
            .unwrap_or_else(|| context.to_string())
    }
}

struct ContextSource<'r, 'd, 's> {
    resolver: &'r mut ScopeResolver<'d, 's>,
    context: &'r str,
}

impl VariableSource for ContextSource<'_, '_, '_> {
    fn lookup(&mut self, reference: &VariableReference) -> ResolveResult<Value> {
        self.resolver.lookup(reference, self.context)
    }
}

/// `r` in context `p.q` -> `p.q.r`, `p.r`, `r`
fn lexical_candidates(context: &str, reference: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut prefix = (!context.is_empty()).then_some(context);
    while let Some(current) = prefix {
        candidates.push(format!("{}.{}", current, reference));
        prefix = current.rsplit_once('.').map(|(parent, _)| parent);
    }
    candidates.push(reference.to_string());
    candidates
}

// =============================================================================
// Public entry points
// =============================================================================

/// Resolve the full scope of a validated root
pub fn resolve_scope(
    root: &ValidatedRoot<'_>,
    selections: &Selections,
    max_visits: usize,
) -> ResolveResult<Scope> {
    let mut resolver = ScopeResolver::new(root, selections, max_visits)?;
    resolver.resolve_all()?;
    let scope = resolver.scope();
    info!(
        root = %root.definition().path,
        values = scope.len(),
        visits = resolver.budget().used(),
        "resolved scope"
    );
    Ok(scope)
}

/// Read one instance path from a resolved scope
pub fn get_value(scope: &Scope, instance_path: &str) -> ResolveResult<Value> {
    scope
        .get(instance_path)
        .cloned()
        .ok_or_else(|| ResolveError::unresolved(instance_path, "scope"))
}
