//! Tree Builder
//!
//! Two steps between the Type Dictionary and scope resolution:
//!
//! 1. [`TreeBuilder::validate`] checks the composition graph below a root:
//!    every child resolves, kinds alternate correctly (class members are
//!    components, a class-typed component points at a class) and class
//!    composition is acyclic. Failures are [`LoadError`]s.
//! 2. [`ValidatedRoot::instantiate`] materializes the Instance Tree: a
//!    pre-order arena of component nodes keyed by instance path, with the
//!    effective instantiation-site override threaded down to every node.
//!
//! Class definitions never become nodes and never contribute a path segment.

use crate::dictionary::TypeDictionary;
use crate::error::{LoadError, LoadResult, ResolveError, ResolveResult};
use formgen_types::{Definition, DefinitionKind, Modification, Term};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

// =============================================================================
// VALIDATION
// =============================================================================

/// Parent path used in errors for a missing root
pub const ROOT_PARENT: &str = "<root>";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path
    Visiting,
    Done,
}

pub struct TreeBuilder<'d> {
    dictionary: &'d TypeDictionary,
}

impl<'d> TreeBuilder<'d> {
    pub fn new(dictionary: &'d TypeDictionary) -> Self {
        Self { dictionary }
    }

    /// Validate the composition graph reachable from `root`
    pub fn validate(&self, root: &str) -> LoadResult<ValidatedRoot<'d>> {
        let definition = self
            .dictionary
            .get(root)
            .ok_or_else(|| LoadError::dangling(ROOT_PARENT, root))?;
        let mut marks = HashMap::new();
        self.visit(definition, &mut marks, &mut Vec::new())?;
        Ok(ValidatedRoot {
            dictionary: self.dictionary,
            root: definition,
        })
    }

    /// Validate every definition in the dictionary
    pub fn validate_all(&self) -> LoadResult<()> {
        let mut marks = HashMap::new();
        for definition in self.dictionary.iter() {
            if !marks.contains_key(definition.path.as_str()) {
                self.visit(definition, &mut marks, &mut Vec::new())?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        definition: &'d Definition,
        marks: &mut HashMap<&'d str, Mark>,
        stack: &mut Vec<&'d str>,
    ) -> LoadResult<()> {
        let path = definition.path.as_str();
        marks.insert(path, Mark::Visiting);
        stack.push(path);

        for (child_path, child) in self.dictionary.children_of(path) {
            let child = child.ok_or_else(|| LoadError::dangling(path, child_path))?;
            check_kind(definition, child)?;

            match marks.get(child.path.as_str()) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    let start = stack
                        .iter()
                        .position(|p| *p == child.path)
                        .unwrap_or(0);
                    let mut chain: Vec<String> =
                        stack[start..].iter().map(|p| p.to_string()).collect();
                    chain.push(child.path.clone());
                    return Err(LoadError::CyclicDefinition { chain });
                }
                None => self.visit(child, marks, stack)?,
            }
        }

        stack.pop();
        marks.insert(path, Mark::Done);
        Ok(())
    }
}

/// Members of a class are components; the child of a component is a class
fn check_kind(parent: &Definition, child: &Definition) -> LoadResult<()> {
    let expected = match parent.kind {
        DefinitionKind::ClassDefinition => DefinitionKind::InstantiableComponent,
        DefinitionKind::InstantiableComponent => DefinitionKind::ClassDefinition,
    };
    if child.kind == expected {
        Ok(())
    } else {
        Err(LoadError::KindMismatch {
            path: child.path.clone(),
            expected: format!("{:?}", expected),
            found: format!("{:?}", child.kind),
        })
    }
}

// =============================================================================
// BUDGET
// =============================================================================

/// Node-visit budget shared by tree expansion and resolution of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitBudget {
    limit: usize,
    used: usize,
}

impl VisitBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn visit(&mut self) -> ResolveResult<()> {
        if self.used >= self.limit {
            return Err(ResolveError::ResolutionBudgetExceeded { budget: self.limit });
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

// =============================================================================
// INSTANCE TREE
// =============================================================================

/// A term together with the instance prefix it is evaluated in
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedTerm {
    pub term: Term,
    pub context: String,
}

/// One component instance
#[derive(Debug, Clone)]
pub struct InstanceNode<'d> {
    /// Dot-joined component identifiers from the resolution root
    pub instance_path: String,
    pub definition: &'d Definition,
    /// Instance prefix of the enclosing class instance; declared value and
    /// enable predicate are evaluated here
    pub context: String,
    /// Value supplied by an instantiation site further up, with that site's
    /// context
    pub override_value: Option<ScopedTerm>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Pre-order arena of component instances below one root
#[derive(Debug, Clone)]
pub struct InstanceTree<'d> {
    root_path: String,
    nodes: Vec<InstanceNode<'d>>,
    index: IndexMap<String, usize>,
    roots: Vec<usize>,
}

impl<'d> InstanceTree<'d> {
    /// Dictionary path the tree was built from
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Nodes in pre-order
    pub fn nodes(&self) -> &[InstanceNode<'d>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &InstanceNode<'d> {
        &self.nodes[index]
    }

    /// Top-level component nodes
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn index_of(&self, instance_path: &str) -> Option<usize> {
        self.index.get(instance_path).copied()
    }

    pub fn get(&self, instance_path: &str) -> Option<&InstanceNode<'d>> {
        self.index_of(instance_path).map(|i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A root whose composition graph passed validation
#[derive(Debug, Clone, Copy)]
pub struct ValidatedRoot<'d> {
    dictionary: &'d TypeDictionary,
    root: &'d Definition,
}

impl<'d> ValidatedRoot<'d> {
    pub fn definition(&self) -> &'d Definition {
        self.root
    }

    pub fn dictionary(&self) -> &'d TypeDictionary {
        self.dictionary
    }

    /// Expand the instance tree. Every node counts against `budget`.
    pub fn instantiate(&self, budget: &mut VisitBudget) -> ResolveResult<InstanceTree<'d>> {
        let mut expander = Expander {
            dictionary: self.dictionary,
            budget,
            tree: InstanceTree {
                root_path: self.root.path.clone(),
                nodes: Vec::new(),
                index: IndexMap::new(),
                roots: Vec::new(),
            },
        };
        if self.root.is_class() {
            expander.expand_members(self.root, "", None, ScopedModification::default())?;
        } else {
            let root = expander.expand_component(
                self.root,
                self.root.identifier().to_string(),
                String::new(),
                None,
                ScopedModification::default(),
            )?;
            expander.tree.roots.push(root);
        }
        debug!(
            root = %self.root.path,
            nodes = expander.tree.len(),
            "expanded instance tree"
        );
        Ok(expander.tree)
    }
}

/// Modification tree whose values remember the context they were written in
#[derive(Debug, Clone, Default)]
struct ScopedModification {
    value: Option<ScopedTerm>,
    nested: BTreeMap<String, ScopedModification>,
}

impl ScopedModification {
    fn from_overrides(overrides: &BTreeMap<String, Modification>, context: &str) -> Self {
        Self {
            value: None,
            nested: overrides
                .iter()
                .map(|(name, m)| (name.clone(), Self::from_modification(m, context)))
                .collect(),
        }
    }

    fn from_modification(modification: &Modification, context: &str) -> Self {
        Self {
            value: modification.value.as_ref().map(|term| ScopedTerm {
                term: term.clone(),
                context: context.to_string(),
            }),
            nested: modification
                .nested
                .iter()
                .map(|(name, m)| (name.clone(), Self::from_modification(m, context)))
                .collect(),
        }
    }

    /// `winner` takes precedence wherever both supply something
    fn overlay(&mut self, winner: ScopedModification) {
        if winner.value.is_some() {
            self.value = winner.value;
        }
        for (name, nested) in winner.nested {
            self.nested.entry(name).or_default().overlay(nested);
        }
    }
}

struct Expander<'d, 'b> {
    dictionary: &'d TypeDictionary,
    budget: &'b mut VisitBudget,
    tree: InstanceTree<'d>,
}

impl<'d, 'b> Expander<'d, 'b> {
    fn expand_component(
        &mut self,
        definition: &'d Definition,
        instance_path: String,
        context: String,
        parent: Option<usize>,
        inherited: ScopedModification,
    ) -> ResolveResult<usize> {
        self.budget.visit()?;

        // Outer instantiation sites win over this component's own site
        let mut effective = ScopedModification::from_overrides(&definition.overrides, &context);
        effective.overlay(inherited);
        let override_value = effective.value.take();

        let index = self.tree.nodes.len();
        self.tree.index.insert(instance_path.clone(), index);
        self.tree.nodes.push(InstanceNode {
            instance_path: instance_path.clone(),
            definition,
            context,
            override_value,
            parent,
            children: Vec::new(),
        });

        for child in &definition.children {
            if let Some(class) = self.dictionary.get(child) {
                let members = std::mem::take(&mut effective);
                effective = self.expand_members(class, &instance_path, Some(index), members)?;
            }
        }
        Ok(index)
    }

    /// Expand the members of `class` instantiated at `prefix`. Returns the
    /// modification entries no member consumed.
    fn expand_members(
        &mut self,
        class: &'d Definition,
        prefix: &str,
        parent: Option<usize>,
        mut modification: ScopedModification,
    ) -> ResolveResult<ScopedModification> {
        for member_path in &class.children {
            let Some(member) = self.dictionary.get(member_path) else {
                continue;
            };
            let name = member.identifier();
            let instance_path = join(prefix, name);
            let inherited = modification.nested.remove(name).unwrap_or_default();
            let child =
                self.expand_component(member, instance_path, prefix.to_string(), parent, inherited)?;
            match parent {
                Some(p) => self.tree.nodes[p].children.push(child),
                None => self.tree.roots.push(child),
            }
        }
        Ok(modification)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formgen_types::{DataType, PrimitiveType};
    use pretty_assertions::assert_eq;

    fn boolean(path: &str) -> Definition {
        Definition::component(path, DataType::Primitive(PrimitiveType::Boolean))
    }

    fn class_ref(path: &str, class: &str) -> Definition {
        Definition::component(path, DataType::ClassReference(class.into()))
    }

    fn sample() -> TypeDictionary {
        vec![
            Definition::class("Sub", vec!["Sub.flag".into()]),
            boolean("Sub.flag").with_value(Term::literal(false)),
            Definition::class("Top", vec!["Top.a".into(), "Top.sub".into()]),
            boolean("Top.a"),
            class_ref("Top.sub", "Sub")
                .with_override("flag", Modification::with_value(Term::literal(true))),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_validate_accepts_well_formed_root() {
        let dict = sample();
        let validated = TreeBuilder::new(&dict).validate("Top").unwrap();
        assert_eq!(validated.definition().path, "Top");
        TreeBuilder::new(&dict).validate_all().unwrap();
    }

    #[test]
    fn test_missing_root_is_dangling() {
        let dict = sample();
        let err = TreeBuilder::new(&dict).validate("Nope").unwrap_err();
        match err {
            LoadError::DanglingReference { parent, child } => {
                assert_eq!(parent, ROOT_PARENT);
                assert_eq!(child, "Nope");
            }
            other => panic!("expected DanglingReference, got {other:?}"),
        }
    }

    #[test]
    fn test_dangling_child() {
        let dict: TypeDictionary = vec![Definition::class("A", vec!["A.gone".into()])]
            .into_iter()
            .collect();
        let err = TreeBuilder::new(&dict).validate("A").unwrap_err();
        assert!(matches!(err, LoadError::DanglingReference { .. }));
    }

    #[test]
    fn test_composition_cycle_reports_chain() {
        let dict: TypeDictionary = vec![
            Definition::class("A", vec!["A.b".into()]),
            class_ref("A.b", "B"),
            Definition::class("B", vec!["B.a".into()]),
            class_ref("B.a", "A"),
        ]
        .into_iter()
        .collect();
        let err = TreeBuilder::new(&dict).validate("A").unwrap_err();
        match err {
            LoadError::CyclicDefinition { chain } => {
                assert_eq!(chain, vec!["A", "A.b", "B", "B.a", "A"]);
            }
            other => panic!("expected CyclicDefinition, got {other:?}"),
        }
    }

    #[test]
    fn test_component_pointing_at_component_is_kind_mismatch() {
        let dict: TypeDictionary = vec![
            Definition::class("A", vec!["A.x".into()]),
            class_ref("A.x", "A.y"),
            boolean("A.y"),
        ]
        .into_iter()
        .collect();
        let err = TreeBuilder::new(&dict).validate("A").unwrap_err();
        assert!(matches!(err, LoadError::KindMismatch { path, .. } if path == "A.y"));
    }

    #[test]
    fn test_instantiate_skips_class_segments_and_threads_overrides() {
        let dict = sample();
        let validated = TreeBuilder::new(&dict).validate("Top").unwrap();
        let mut budget = VisitBudget::new(100);
        let tree = validated.instantiate(&mut budget).unwrap();

        let paths: Vec<&str> = tree.nodes().iter().map(|n| n.instance_path.as_str()).collect();
        assert_eq!(paths, vec!["a", "sub", "sub.flag"]);
        assert_eq!(budget.used(), 3);

        let flag = tree.get("sub.flag").unwrap();
        assert_eq!(flag.context, "sub");
        assert_eq!(
            flag.override_value,
            Some(ScopedTerm {
                term: Term::literal(true),
                context: String::new(),
            })
        );
        assert_eq!(tree.node(flag.parent.unwrap()).instance_path, "sub");
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn test_outermost_override_wins() {
        let mut dict = sample();
        dict.insert(Definition::class("Outer", vec!["Outer.top".into()]));
        dict.insert(class_ref("Outer.top", "Top").with_override("sub", {
            let mut m = Modification::default();
            m.nested
                .insert("flag".into(), Modification::with_value(Term::reference("x")));
            m
        }));
        let validated = TreeBuilder::new(&dict).validate("Outer").unwrap();
        let tree = validated.instantiate(&mut VisitBudget::new(100)).unwrap();
        let flag = tree.get("top.sub.flag").unwrap();
        assert_eq!(
            flag.override_value,
            Some(ScopedTerm {
                term: Term::reference("x"),
                context: String::new(),
            })
        );
    }

    #[test]
    fn test_component_root_keeps_identifier() {
        let dict = sample();
        let validated = TreeBuilder::new(&dict).validate("Top.sub").unwrap();
        let tree = validated.instantiate(&mut VisitBudget::new(100)).unwrap();
        let paths: Vec<&str> = tree.nodes().iter().map(|n| n.instance_path.as_str()).collect();
        assert_eq!(paths, vec!["sub", "sub.flag"]);
    }

    #[test]
    fn test_budget_exhaustion() {
        let dict = sample();
        let validated = TreeBuilder::new(&dict).validate("Top").unwrap();
        let err = validated.instantiate(&mut VisitBudget::new(2)).unwrap_err();
        assert_eq!(err, ResolveError::ResolutionBudgetExceeded { budget: 2 });
    }
}
