//! Per-direction rule set selection.

use crate::config::{Direction, UnknownDirection};
use crate::rule::{RuleCatalog, RuleSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Rule set names chosen per direction for one deployment or exchange.
///
/// Directions without an entry use the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionOverrides {
    names: BTreeMap<Direction, String>,
}

impl DirectionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from string-keyed settings (`request.url=...`).
    pub fn from_params<I, K, V>(params: I) -> Result<Self, UnknownDirection>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut overrides = Self::new();
        for (key, name) in params {
            overrides.set(key.as_ref().parse()?, name);
        }
        Ok(overrides)
    }

    pub fn set(&mut self, direction: Direction, name: impl Into<String>) -> &mut Self {
        self.names.insert(direction, name.into());
        self
    }

    pub fn with(mut self, direction: Direction, name: impl Into<String>) -> Self {
        self.set(direction, name);
        self
    }

    pub fn get(&self, direction: Direction) -> Option<&str> {
        self.names.get(&direction).map(String::as_str)
    }

    /// Entries of `self`, with `fallback` filling directions left unset.
    pub fn or(&self, fallback: &DirectionOverrides) -> Self {
        let mut names = fallback.names.clone();
        names.extend(self.names.iter().map(|(d, n)| (*d, n.clone())));
        Self { names }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, &str)> {
        self.names.iter().map(|(d, n)| (*d, n.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<BTreeMap<Direction, String>> for DirectionOverrides {
    fn from(names: BTreeMap<Direction, String>) -> Self {
        Self { names }
    }
}

/// Errors raised while resolving a direction's rule set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("default rule set '{name}' for {direction} does not exist")]
    UnknownRuleSet { direction: Direction, name: String },

    #[error("'{name}' selected for {direction} names no rule set or rule")]
    UnknownRule { direction: Direction, name: String },

    #[error(transparent)]
    UnknownDirection(#[from] UnknownDirection),
}

/// Resolves the rule set for each direction.
#[derive(Debug, Clone, Copy)]
pub struct DirectionDispatcher<'a> {
    catalog: &'a RuleCatalog,
    defaults: &'a BTreeMap<Direction, String>,
}

impl<'a> DirectionDispatcher<'a> {
    pub fn new(catalog: &'a RuleCatalog, defaults: &'a BTreeMap<Direction, String>) -> Self {
        Self { catalog, defaults }
    }

    /// An explicit override names a loaded rule set or a single rule. A rule
    /// is looked up from the direction's default set first, then across the
    /// catalog, and runs as a one-rule set. Without an override the
    /// direction's default applies, or the identity rule set if none is
    /// configured.
    pub fn resolve_rule_set(
        &self,
        direction: Direction,
        override_name: Option<&str>,
    ) -> Result<Arc<RuleSet>, DispatchError> {
        let default = self.defaults.get(&direction).map(String::as_str);
        let Some(name) = override_name else {
            return match default {
                Some(name) => {
                    self.catalog
                        .get(name)
                        .cloned()
                        .ok_or_else(|| DispatchError::UnknownRuleSet {
                            direction,
                            name: name.to_string(),
                        })
                }
                None => Ok(Arc::clone(self.catalog.identity())),
            };
        };

        if let Some(set) = self.catalog.get(name) {
            return Ok(Arc::clone(set));
        }
        let found = default
            .and_then(|d| self.catalog.get(d))
            .and_then(|set| self.catalog.find_rule(set, name))
            .or_else(|| self.catalog.find_rule_anywhere(name));
        match found {
            Some((owner, rule)) => {
                debug!(
                    direction = %direction,
                    rule_set = %owner.name(),
                    rule = %rule.name,
                    "Override selects a single rule"
                );
                Ok(Arc::new(RuleSet::single(owner, rule)))
            }
            None => Err(DispatchError::UnknownRule {
                direction,
                name: name.to_string(),
            }),
        }
    }

    /// Resolve every direction at once, failing on the first bad name.
    pub fn resolve_all(
        &self,
        directions: &[Direction],
        overrides: &DirectionOverrides,
    ) -> Result<BTreeMap<Direction, Arc<RuleSet>>, DispatchError> {
        directions
            .iter()
            .map(|d| {
                self.resolve_rule_set(*d, overrides.get(*d))
                    .map(|set| (*d, set))
            })
            .collect()
    }
}
