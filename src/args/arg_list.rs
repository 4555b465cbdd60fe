// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::Arg;
use crate::errors::ArgError;
use serde::de::DeserializeOwned;

/// An ordered collection of [`Arg`]s.
///
/// Later entries win when a name appears twice, which lets configuration
/// values be layered over code defaults by appending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgList {
    name: String,
    args: Vec<Arg>,
}

impl ArgList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends an argument; the argument must be named.
    pub fn add(&mut self, arg: Arg) -> Result<(), ArgError> {
        if arg.name().is_empty() {
            return Err(ArgError::EmptyName);
        }
        self.args.push(arg);
        Ok(())
    }

    /// Builder form of [`ArgList::add`].
    pub fn with(mut self, arg: Arg) -> Result<Self, ArgError> {
        self.add(arg)?;
        Ok(self)
    }

    /// Moves every argument of `other` onto the end of this list.
    pub fn extend(&mut self, other: ArgList) {
        self.args.extend(other.args);
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn clear(&mut self) {
        self.args.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arg> {
        self.args.iter()
    }

    /// Last argument with the given name.
    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.args.iter().rev().find(|a| a.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Typed read of a named argument; `Ok(None)` when it is absent or unset.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ArgError> {
        match self.get(name) {
            Some(arg) if arg.has_value() => arg.get().map(Some),
            _ => Ok(None),
        }
    }

    pub fn description(&self) -> String {
        self.args
            .iter()
            .map(|a| a.description())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a ArgList {
    type Item = &'a Arg;
    type IntoIter = std::slice::Iter<'a, Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

impl IntoIterator for ArgList {
    type Item = Arg;
    type IntoIter = std::vec::IntoIter<Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.into_iter()
    }
}

impl FromIterator<Arg> for ArgList {
    /// Collects named arguments; unnamed ones are skipped.
    fn from_iter<I: IntoIterator<Item = Arg>>(iter: I) -> Self {
        Self {
            name: String::new(),
            args: iter.into_iter().filter(|a| !a.name().is_empty()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_unnamed_args() {
        let mut list = ArgList::new();
        assert_eq!(list.add(Arg::new("", 1i64)), Err(ArgError::EmptyName));
        assert!(list.is_empty());
    }

    #[test]
    fn test_later_entries_win() {
        let mut list = ArgList::named("op");
        list.add(Arg::new("rate", 1i64)).unwrap();
        list.add(Arg::new("rate", 5i64)).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.value::<i64>("rate").unwrap(), Some(5));
    }

    #[test]
    fn test_extend_moves_all_arguments() {
        let mut base = ArgList::new().with(Arg::new("a", 1i64)).unwrap();
        let extra: ArgList = vec![Arg::new("b", "two"), Arg::new("c", 3.0f64)]
            .into_iter()
            .collect();
        base.extend(extra);

        let names: Vec<&str> = base.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_value_of_missing_or_unset_is_none() {
        let list = ArgList::new().with(Arg::named("unset")).unwrap();
        assert_eq!(list.value::<i64>("unset").unwrap(), None);
        assert_eq!(list.value::<i64>("absent").unwrap(), None);
    }

    #[test]
    fn test_clear_empties_list() {
        let mut list = ArgList::new().with(Arg::new("a", 1i64)).unwrap();
        list.clear();
        assert_eq!(list.len(), 0);
    }
}
