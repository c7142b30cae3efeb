//! AST Flattener
//!
//! Walks exported class definitions depth-first and emits [`Definition`]s into
//! a [`TypeDictionary`]:
//!
//! - every class becomes a `ClassDefinition` at its qualified path
//! - every component becomes an `InstantiableComponent` at
//!   `<class path>.<identifier>`
//! - `extends` clauses copy base members into the derived class unless the
//!   derived class declares a member of the same name
//!
//! Type references are looked up innermost scope first (`P.Q.C.Ref`,
//! `P.Q.Ref`, `P.Ref`, `Ref`), consulting the dictionary, the documents seen
//! so far and finally the [`TypeResolver`]. First hit wins.
//!
//! Malformed `enable` annotations and unparsable values are recovered with a
//! [`Diagnostic`]; unknown types abort the load.

use crate::ast::{
    self, qualify, ClassDefinition, ComponentClause, ComponentDeclaration, Element,
    StoredDefinition,
};
use crate::diagnostics::{
    malformed_annotation, malformed_value, shadowed_member, unknown_modification_target,
    Diagnostic,
};
use crate::dictionary::TypeDictionary;
use crate::error::{LoadError, LoadResult};
use crate::parser::parse_expression;
use crate::type_resolver::TypeResolver;
use formgen_types::{DataType, Definition, Modification, PrimitiveType, Term, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Result of a completed load
#[derive(Debug, Clone)]
pub struct FlattenOutput {
    pub dictionary: TypeDictionary,
    pub diagnostics: Vec<Diagnostic>,
    /// Qualified paths of the classes declared in the loaded document
    pub roots: Vec<String>,
}

/// Flatten a document and every type it transitively references
pub fn flatten<R: TypeResolver + ?Sized>(
    document: &StoredDefinition,
    resolver: &R,
) -> LoadResult<FlattenOutput> {
    let mut flattener = Flattener::new(resolver);
    let roots = flattener.flatten_document(document)?;
    Ok(flattener.finish(roots))
}

pub struct Flattener<'r, R: TypeResolver + ?Sized> {
    resolver: &'r R,
    dictionary: TypeDictionary,
    diagnostics: Vec<Diagnostic>,
    /// Source units already seen, consulted before the resolver
    documents: Vec<StoredDefinition>,
    /// Classes whose flattening has started but not finished
    in_progress: HashSet<String>,
}

impl<'r, R: TypeResolver + ?Sized> Flattener<'r, R> {
    pub fn new(resolver: &'r R) -> Self {
        Self {
            resolver,
            dictionary: TypeDictionary::new(),
            diagnostics: Vec::new(),
            documents: Vec::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn dictionary(&self) -> &TypeDictionary {
        &self.dictionary
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Flatten every top-level class of a document. Returns their paths.
    pub fn flatten_document(&mut self, document: &StoredDefinition) -> LoadResult<Vec<String>> {
        self.documents.push(document.clone());
        let mut roots = Vec::with_capacity(document.class_definition.len());
        for class in &document.class_definition {
            let path = document.qualified_name(class);
            self.flatten_class(class, &path)?;
            roots.push(path);
        }
        Ok(roots)
    }

    /// Resolve a type reference as seen from `context` (a class path) and make
    /// sure its definition is flattened. Returns the qualified class path.
    pub fn flatten_type(&mut self, reference: &str, context: &str) -> LoadResult<String> {
        let reference = reference.trim_start_matches('.');
        for candidate in lookup_candidates(context, reference) {
            if self.dictionary.is_class(&candidate) || self.in_progress.contains(&candidate) {
                return Ok(candidate);
            }
            if let Some(class) = self.find_known_class(&candidate) {
                self.flatten_class(&class, &candidate)?;
                return Ok(candidate);
            }
            if let Some(unit) = self.resolver.resolve(&candidate)? {
                let class = unit.find_class(&candidate).cloned();
                self.documents.push(unit);
                if let Some(class) = class {
                    self.flatten_class(&class, &candidate)?;
                    return Ok(candidate);
                }
            }
        }
        Err(LoadError::type_not_found(reference, context))
    }

    pub fn finish(self, roots: Vec<String>) -> FlattenOutput {
        info!(
            definitions = self.dictionary.len(),
            diagnostics = self.diagnostics.len(),
            "flattened model"
        );
        FlattenOutput {
            dictionary: self.dictionary,
            diagnostics: self.diagnostics,
            roots,
        }
    }

    fn find_known_class(&self, qualified: &str) -> Option<ClassDefinition> {
        self.documents
            .iter()
            .find_map(|doc| doc.find_class(qualified))
            .cloned()
    }

    // =========================================================================
    // Classes
    // =========================================================================

    fn flatten_class(&mut self, class: &ClassDefinition, path: &str) -> LoadResult<()> {
        if self.dictionary.contains(path) || self.in_progress.contains(path) {
            return Ok(());
        }
        self.in_progress.insert(path.to_string());

        // Nested classes first so local type lookups find them
        for nested in class.nested_classes() {
            let nested_path = qualify(Some(path), nested.identifier());
            self.flatten_class(nested, &nested_path)?;
        }

        let mut own_children = Vec::new();
        let mut own_names = HashSet::new();
        let mut bases = Vec::new();
        for element in class.elements() {
            match element {
                Element::ComponentClause(clause) => {
                    for declaration in &clause.component_list {
                        let definition = self.flatten_component(clause, declaration, path)?;
                        own_names.insert(declaration.identifier().to_string());
                        own_children.push(definition.path.clone());
                        self.insert(definition);
                    }
                }
                Element::ExtendsClause(extends) => bases.push(extends),
                Element::ClassDefinition(_) => {}
            }
        }

        let mut children = Vec::new();
        let mut inherited_names = HashSet::new();
        for extends in bases {
            let inherited = self.inherit(extends, path, &own_names, &mut inherited_names)?;
            children.extend(inherited);
        }
        children.extend(own_children);

        let mut definition = Definition::class(path, children);
        definition.description = class.description().unwrap_or_default().to_string();
        if !class.class_prefixes.is_empty() {
            definition.class_prefix = Some(class.class_prefixes.clone());
        }
        self.insert(definition);
        self.in_progress.remove(path);
        Ok(())
    }

    /// Copy the members of an `extends` base into `path`. Returns the copied
    /// member paths in base order.
    fn inherit(
        &mut self,
        extends: &ast::ExtendsClause,
        path: &str,
        own_names: &HashSet<String>,
        inherited_names: &mut HashSet<String>,
    ) -> LoadResult<Vec<String>> {
        let base_path = self.flatten_type(&extends.name, path)?;
        let Some(base) = self.dictionary.get(&base_path).cloned() else {
            // Base is still being flattened further up the stack
            return Err(LoadError::CyclicDefinition {
                chain: vec![path.to_string(), base_path.clone(), path.to_string()],
            });
        };
        let modification = self.lower_class_modification(path, &extends.class_modification);

        let mut copied = Vec::new();
        for member_path in &base.children {
            let member = self
                .dictionary
                .get(member_path)
                .ok_or_else(|| LoadError::dangling(&base_path, member_path))?;
            let name = member.identifier().to_string();
            if own_names.contains(&name) || !inherited_names.insert(name.clone()) {
                let diagnostic = shadowed_member(path, &name, &base_path);
                debug!(%diagnostic, "inherited member shadowed");
                self.diagnostics.push(diagnostic);
                continue;
            }
            let mut copy = member.relocated(qualify(Some(path), &name));
            if let Some(applied) = modification.get(&name) {
                apply_inheritance_modification(&mut copy, applied);
            }
            copied.push(copy.path.clone());
            self.insert(copy);
        }
        self.check_modification_targets(path, &base, modification.keys());
        Ok(copied)
    }

    // =========================================================================
    // Components
    // =========================================================================

    fn flatten_component(
        &mut self,
        clause: &ComponentClause,
        declaration: &ComponentDeclaration,
        class_path: &str,
    ) -> LoadResult<Definition> {
        let path = qualify(Some(class_path), declaration.identifier());
        let type_name = clause.type_specifier.trim_start_matches('.');
        let data_type = match PrimitiveType::from_name(type_name) {
            Some(primitive) => DataType::Primitive(primitive),
            None => DataType::ClassReference(self.flatten_type(type_name, class_path)?),
        };

        let mut definition = Definition::component(&path, data_type);
        if let Some(modification) = &declaration.declaration.modification {
            if let Some(expression) = &modification.expression {
                definition.declared_value = self.lower_value(&path, expression);
            }
            definition.overrides =
                self.lower_class_modification(&path, &modification.class_modification);
        }
        // A class still in progress is a recursive type; the tree builder rejects it
        if let Some(class) = definition
            .data_type
            .class_path()
            .and_then(|class_path| self.dictionary.get(class_path))
            .cloned()
        {
            self.check_modification_targets(&path, &class, definition.overrides.keys());
        }
        if let Some(description) = &declaration.description {
            definition.description = description
                .description_string
                .clone()
                .unwrap_or_default();
            if let Some(enable) = description.enable_annotation() {
                definition.enable = self.lower_enable(&path, enable);
            }
        }
        Ok(definition)
    }

    fn check_modification_targets<'k>(
        &mut self,
        path: &str,
        class: &Definition,
        names: impl Iterator<Item = &'k String>,
    ) {
        for name in names {
            let declared = class
                .children
                .iter()
                .any(|member| member.rsplit('.').next() == Some(name.as_str()));
            if !declared {
                let diagnostic = unknown_modification_target(path, &class.path, name);
                warn!(%diagnostic, "ignored modification");
                self.diagnostics.push(diagnostic);
            }
        }
    }

    fn insert(&mut self, definition: Definition) {
        debug!(path = %definition.path, kind = ?definition.kind, "flattened definition");
        self.dictionary.insert(definition);
    }

    // =========================================================================
    // Expressions and modifications
    // =========================================================================

    fn lower_value(&mut self, path: &str, expression: &ast::ModificationExpression) -> Option<Term> {
        match lower_simple_expression(&expression.simple_expression) {
            Ok(term) => Some(term),
            Err((source, reason)) => {
                let diagnostic = malformed_value(path, &source, &reason);
                warn!(%diagnostic, "recovered malformed value");
                self.diagnostics.push(diagnostic);
                None
            }
        }
    }

    fn lower_enable(&mut self, path: &str, expression: &ast::ModificationExpression) -> Term {
        match lower_simple_expression(&expression.simple_expression) {
            Ok(term) => term,
            Err((source, reason)) => {
                let diagnostic = malformed_annotation(path, &source, &reason);
                warn!(%diagnostic, "recovered malformed annotation");
                self.diagnostics.push(diagnostic);
                Term::literal_true()
            }
        }
    }

    fn lower_class_modification(
        &mut self,
        path: &str,
        elements: &[ast::ElementModification],
    ) -> BTreeMap<String, Modification> {
        let mut out: BTreeMap<String, Modification> = BTreeMap::new();
        for element in elements {
            let target = qualify(Some(path), &element.name);
            let mut modification = Modification::default();
            if let Some(inner) = &element.modification {
                if let Some(expression) = &inner.expression {
                    modification.value = self.lower_value(&target, expression);
                }
                modification.nested = self.lower_class_modification(&target, &inner.class_modification);
            }

            // `a.b.c = v` is shorthand for `a(b(c = v))`
            let mut segments = element.name.split('.');
            let Some(first) = segments.next() else {
                continue;
            };
            let rest: Vec<&str> = segments.collect();
            for segment in rest.iter().rev() {
                let mut wrapper = Modification::default();
                wrapper.nested.insert(segment.to_string(), modification);
                modification = wrapper;
            }
            out.entry(first.to_string())
                .or_default()
                .overlay(&modification);
        }
        out
    }
}

/// Scopes searched for `reference` used inside class `context`, innermost first
fn lookup_candidates(context: &str, reference: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut scope = Some(context);
    while let Some(current) = scope {
        candidates.push(qualify(Some(current), reference));
        scope = current.rsplit_once('.').map(|(parent, _)| parent);
    }
    candidates.push(reference.to_string());
    candidates
}

/// Inheritance-time modification of a copied base member: the value replaces
/// the member's declared value, nested entries win over the member's own
/// overrides
fn apply_inheritance_modification(copy: &mut Definition, modification: &Modification) {
    if let Some(value) = &modification.value {
        copy.declared_value = Some(value.clone());
    }
    for (name, nested) in &modification.nested {
        copy.overrides
            .entry(name.clone())
            .or_default()
            .overlay(nested);
    }
}

fn lower_simple_expression(expression: &ast::SimpleExpression) -> Result<Term, (String, String)> {
    match expression {
        ast::SimpleExpression::Boolean(b) => Ok(Term::Literal(Value::Boolean(*b))),
        ast::SimpleExpression::Number(n) => match n.as_i64() {
            Some(i) => Ok(Term::Literal(Value::Integer(i))),
            None => n
                .as_f64()
                .map(|r| Term::Literal(Value::Real(r)))
                .ok_or_else(|| (n.to_string(), "number out of range".to_string())),
        },
        ast::SimpleExpression::Text(text) => {
            parse_expression(text).map_err(|reason| (text.clone(), reason))
        }
    }
}
