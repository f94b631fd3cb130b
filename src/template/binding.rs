//! Values captured by a successful template match.

use std::collections::{HashMap, HashSet};

/// Mapping from capture name to the literal values it matched.
///
/// A name holds an ordered list because one capture can see several values:
/// a `{name=**}` path capture binds every segment it consumed, and a query
/// capture binds every value of a repeated parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchBinding {
    values: HashMap<String, Vec<String>>,
    /// Query capture values whose parameter had no `=`, by name and index
    valueless: HashSet<(String, usize)>,
    extra_query: Vec<(String, Option<String>)>,
}

impl MatchBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a binding from single-valued pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut binding = Self::new();
        for (k, v) in pairs {
            binding.insert(k, vec![v.into()]);
        }
        binding
    }

    /// All values bound to `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(|v| v.as_slice())
    }

    /// The first value bound to `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra_query.is_empty()
    }

    /// Query parameters of the candidate that no query matcher claimed.
    pub fn extra_query(&self) -> &[(String, Option<String>)] {
        &self.extra_query
    }

    /// Whether value `index` of `name` came from a bare query parameter
    /// (`?flag` rather than `?flag=`).
    pub fn is_valueless(&self, name: &str, index: usize) -> bool {
        self.valueless.contains(&(name.to_string(), index))
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        self.valueless.retain(|(n, _)| *n != name);
        self.values.insert(name, values);
    }

    /// Bind query values, remembering which parameters had no value.
    pub(crate) fn insert_query(&mut self, name: impl Into<String>, values: Vec<Option<String>>) {
        let name = name.into();
        self.valueless.retain(|(n, _)| *n != name);
        for (i, value) in values.iter().enumerate() {
            if value.is_none() {
                self.valueless.insert((name.clone(), i));
            }
        }
        self.values
            .insert(name, values.into_iter().map(Option::unwrap_or_default).collect());
    }

    pub(crate) fn set_extra_query(&mut self, extra: Vec<(String, Option<String>)>) {
        self.extra_query = extra;
    }

    /// Fold `newer` into this binding; its names shadow existing ones.
    pub fn merge(&mut self, newer: MatchBinding) {
        self.valueless
            .retain(|(name, _)| !newer.values.contains_key(name));
        self.valueless.extend(newer.valueless);
        self.values.extend(newer.values);
        if !newer.extra_query.is_empty() {
            self.extra_query = newer.extra_query;
        }
    }
}
