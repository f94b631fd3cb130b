//! Rule sets, rules and steps.
//!
//! The configuration's [`RuleSetDef`]s are compiled into a [`RuleCatalog`]:
//! every template parsed, every `call` checked against the rules it can
//! reach. A compiled catalog is immutable and shared across requests.

mod evaluator;
mod function;

pub use evaluator::{Evaluation, EvaluationError, Evaluator, MAX_CALL_DEPTH};
pub use function::{
    FunctionError, FunctionRegistry, RewriteFunction, ServiceDirectory, ServiceEndpoint,
};

use crate::config::{RuleDef, RuleSetDef, StepDef};
use crate::template::{Segment, TemplateError, UrlTemplate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One unit of rule logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Match(UrlTemplate),
    Rewrite(UrlTemplate),
    Call(String),
    And(Vec<Step>),
    Or(Vec<Step>),
}

impl Step {
    fn compile(def: &StepDef) -> Result<Self, TemplateError> {
        Ok(match def {
            StepDef::Match(text) => {
                let template = UrlTemplate::parse(text)?;
                if let Some(name) = first_function(&template) {
                    return Err(TemplateError::FunctionInPattern(name));
                }
                Step::Match(template)
            }
            StepDef::Rewrite(text) => Step::Rewrite(UrlTemplate::parse(text)?),
            StepDef::Call(name) => Step::Call(name.clone()),
            StepDef::And(children) => Step::And(
                children
                    .iter()
                    .map(Step::compile)
                    .collect::<Result<_, _>>()?,
            ),
            StepDef::Or(children) => Step::Or(
                children
                    .iter()
                    .map(Step::compile)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// The persisted form of this step.
    pub fn to_def(&self) -> StepDef {
        match self {
            Step::Match(t) => StepDef::Match(t.to_string()),
            Step::Rewrite(t) => StepDef::Rewrite(t.to_string()),
            Step::Call(name) => StepDef::Call(name.clone()),
            Step::And(children) => StepDef::And(children.iter().map(Step::to_def).collect()),
            Step::Or(children) => StepDef::Or(children.iter().map(Step::to_def).collect()),
        }
    }

    fn calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Step::Call(name) => out.push(name),
            Step::And(children) | Step::Or(children) => {
                for child in children {
                    child.calls(out);
                }
            }
            Step::Match(_) | Step::Rewrite(_) => {}
        }
    }
}

fn first_function(template: &UrlTemplate) -> Option<String> {
    let scalars = [template.scheme(), template.host(), template.port(), template.fragment()];
    scalars
        .into_iter()
        .flatten()
        .chain(template.path())
        .chain(template.query().iter().filter_map(|q| q.value.as_ref()))
        .find_map(|s| match s {
            Segment::Function { name, .. } => Some(name.clone()),
            _ => None,
        })
}

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl Rule {
    fn compile(def: &RuleDef) -> Result<Self, RuleError> {
        if def.name.is_empty() {
            return Err(RuleError::EmptyName("rule"));
        }
        let steps = def
            .steps
            .iter()
            .map(Step::compile)
            .collect::<Result<_, _>>()
            .map_err(|source| RuleError::Template {
                rule: def.name.clone(),
                source,
            })?;
        Ok(Self {
            name: def.name.clone(),
            description: def.description.clone(),
            steps,
        })
    }

    pub fn to_def(&self) -> RuleDef {
        RuleDef {
            name: self.name.clone(),
            description: self.description.clone(),
            steps: self.steps.iter().map(Step::to_def).collect(),
        }
    }
}

/// A named collection of rules, tried in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSet {
    name: String,
    includes: Vec<String>,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// A rule set with no rules: everything passes through.
    pub fn identity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// A set holding only `rule`. Calls from it still resolve through
    /// `owner`, which must be in the catalog.
    pub fn single(owner: &RuleSet, rule: &Rule) -> Self {
        Self {
            name: format!("{}/{}", owner.name, rule.name),
            includes: vec![owner.name.clone()],
            rules: vec![rule.clone()],
        }
    }

    fn compile(def: &RuleSetDef) -> Result<Self, RuleError> {
        if def.name.is_empty() {
            return Err(RuleError::EmptyName("rule set"));
        }
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(def.rules.len());
        for rule_def in &def.rules {
            if !seen.insert(rule_def.name.as_str()) {
                return Err(RuleError::DuplicateRule {
                    rule_set: def.name.clone(),
                    rule: rule_def.name.clone(),
                });
            }
            rules.push(Rule::compile(rule_def)?);
        }
        Ok(Self {
            name: def.name.clone(),
            includes: def.includes.clone(),
            rules,
        })
    }

    pub fn to_def(&self) -> RuleSetDef {
        RuleSetDef {
            name: self.name.clone(),
            includes: self.includes.clone(),
            rules: self.rules.iter().map(Rule::to_def).collect(),
        }
    }
}

/// Name of the built-in pass-through rule set.
pub const IDENTITY_RULE_SET: &str = "identity";

/// All loaded rule sets, by name.
#[derive(Debug)]
pub struct RuleCatalog {
    sets: HashMap<String, Arc<RuleSet>>,
    order: Vec<String>,
    identity: Arc<RuleSet>,
}

impl RuleCatalog {
    /// Compile rule set definitions, rejecting duplicate names and dangling
    /// `includes` or `call` references.
    pub fn compile<'a, I>(defs: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = &'a RuleSetDef>,
    {
        let mut sets = HashMap::new();
        let mut order = Vec::new();
        for def in defs {
            let set = RuleSet::compile(def)?;
            if sets.contains_key(&set.name) {
                return Err(RuleError::DuplicateRuleSet(set.name));
            }
            order.push(set.name.clone());
            sets.insert(set.name.clone(), Arc::new(set));
        }

        let catalog = Self {
            sets,
            order,
            identity: Arc::new(RuleSet::identity(IDENTITY_RULE_SET)),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), RuleError> {
        for set in self.sets.values() {
            for include in &set.includes {
                if !self.sets.contains_key(include) {
                    return Err(RuleError::UnknownRuleSet {
                        referenced_by: set.name.clone(),
                        name: include.clone(),
                    });
                }
            }
            for rule in &set.rules {
                let mut calls = Vec::new();
                for step in &rule.steps {
                    step.calls(&mut calls);
                }
                for target in calls {
                    if self.find_rule(set, target).is_none() {
                        return Err(RuleError::UnknownRule {
                            rule_set: set.name.clone(),
                            rule: rule.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RuleSet>> {
        self.sets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    /// The pass-through rule set used when a direction has no default.
    pub fn identity(&self) -> &Arc<RuleSet> {
        &self.identity
    }

    /// Rule sets in load order.
    pub fn rule_sets(&self) -> impl Iterator<Item = &Arc<RuleSet>> {
        self.order.iter().filter_map(|name| self.sets.get(name))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Resolve a rule name from `set`: its own rules first, then its
    /// includes depth-first. Returns the owning set with the rule.
    pub fn find_rule<'a>(&'a self, set: &'a RuleSet, name: &str) -> Option<(&'a RuleSet, &'a Rule)> {
        let mut visited = HashSet::new();
        self.find_rule_in(set, name, &mut visited)
    }

    fn find_rule_in<'a>(
        &'a self,
        set: &'a RuleSet,
        name: &str,
        visited: &mut HashSet<&'a str>,
    ) -> Option<(&'a RuleSet, &'a Rule)> {
        if !visited.insert(set.name.as_str()) {
            return None;
        }
        if let Some(rule) = set.rule(name) {
            return Some((set, rule));
        }
        set.includes
            .iter()
            .filter_map(|include| self.sets.get(include))
            .find_map(|included| self.find_rule_in(included, name, visited))
    }

    /// The first rule named `name` in any rule set, in load order.
    pub fn find_rule_anywhere(&self, name: &str) -> Option<(&RuleSet, &Rule)> {
        self.rule_sets()
            .find_map(|set| set.rule(name).map(|rule| (set.as_ref(), rule)))
    }

    /// The persisted form of every rule set, in load order.
    pub fn to_defs(&self) -> Vec<RuleSetDef> {
        self.rule_sets().map(|set| set.to_def()).collect()
    }
}

/// Errors raised while compiling rule sets.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid template in rule '{rule}': {source}")]
    Template {
        rule: String,
        #[source]
        source: TemplateError,
    },

    #[error("invalid route pattern for service '{role}': {source}")]
    RoutePattern {
        role: String,
        #[source]
        source: TemplateError,
    },

    #[error("service '{role}' has an invalid url '{url}'")]
    InvalidServiceUrl { role: String, url: String },

    #[error("{0} name must not be empty")]
    EmptyName(&'static str),

    #[error("duplicate rule set '{0}'")]
    DuplicateRuleSet(String),

    #[error("duplicate rule '{rule}' in rule set '{rule_set}'")]
    DuplicateRule { rule_set: String, rule: String },

    #[error("rule '{rule}' in rule set '{rule_set}' calls unknown rule '{target}'")]
    UnknownRule {
        rule_set: String,
        rule: String,
        target: String,
    },

    #[error("'{referenced_by}' references unknown rule set '{name}'")]
    UnknownRuleSet { referenced_by: String, name: String },
}
