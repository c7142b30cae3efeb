//! Type Dictionary
//!
//! Flat, path-keyed store of [`Definition`]s. Built once by the flattener,
//! then shared read-only. Insertion is first-writer-wins so re-flattening a
//! path can never replace what is already there.
//!
//! Iteration follows insertion order; equality compares contents only, so two
//! dictionaries built from differently ordered sources compare equal when
//! they hold the same definitions.

use formgen_types::Definition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDictionary {
    definitions: IndexMap<String, Definition>,
}

impl TypeDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition unless its path is already taken.
    ///
    /// Returns `false` when an earlier definition kept the slot.
    pub fn insert(&mut self, definition: Definition) -> bool {
        if self.definitions.contains_key(&definition.path) {
            return false;
        }
        self.definitions
            .insert(definition.path.clone(), definition);
        true
    }

    pub fn get(&self, path: &str) -> Option<&Definition> {
        self.definitions.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.definitions.contains_key(path)
    }

    /// True when `path` exists and is a class definition
    pub fn is_class(&self, path: &str) -> bool {
        self.get(path).is_some_and(Definition::is_class)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Resolved child definitions of `path`; `None` entries are dangling
    pub fn children_of<'a>(
        &'a self,
        path: &str,
    ) -> impl Iterator<Item = (&'a str, Option<&'a Definition>)> + 'a {
        self.get(path)
            .into_iter()
            .flat_map(|def| def.children.iter())
            .map(move |child| (child.as_str(), self.get(child)))
    }
}

impl FromIterator<Definition> for TypeDictionary {
    fn from_iter<I: IntoIterator<Item = Definition>>(iter: I) -> Self {
        let mut dictionary = TypeDictionary::new();
        for definition in iter {
            dictionary.insert(definition);
        }
        dictionary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formgen_types::{DataType, PrimitiveType, Term};

    #[test]
    fn test_first_writer_wins() {
        let mut dict = TypeDictionary::new();
        let first = Definition::component("M.x", DataType::Primitive(PrimitiveType::Integer))
            .with_value(Term::literal(1));
        let second = first.clone().with_value(Term::literal(2));

        assert!(dict.insert(first));
        assert!(!dict.insert(second));
        assert_eq!(
            dict.get("M.x").unwrap().declared_value,
            Some(Term::literal(1))
        );
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let a = Definition::class("A", vec![]);
        let b = Definition::class("B", vec![]);
        let forward: TypeDictionary = vec![a.clone(), b.clone()].into_iter().collect();
        let backward: TypeDictionary = vec![b, a].into_iter().collect();
        assert_eq!(forward, backward);
        assert_eq!(forward.paths().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_children_of_reports_dangling() {
        let dict: TypeDictionary = vec![
            Definition::class("A", vec!["A.x".into(), "A.missing".into()]),
            Definition::component("A.x", DataType::Primitive(PrimitiveType::Boolean)),
        ]
        .into_iter()
        .collect();

        let children: Vec<(&str, bool)> = dict
            .children_of("A")
            .map(|(path, def)| (path, def.is_some()))
            .collect();
        assert_eq!(children, vec![("A.x", true), ("A.missing", false)]);
    }
}
