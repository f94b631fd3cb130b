//! Rule evaluation.
//!
//! Evaluation threads a `(value, bindings)` pair through a rule's steps.
//! A step either produces the next pair or fails, and a failure makes the
//! enclosing rule a [`Evaluation::NoMatch`]. Configuration problems that
//! only surface at evaluation time (an unregistered function, a call that
//! cannot be resolved, runaway recursion) are errors, never `NoMatch`.

use super::{FunctionRegistry, Rule, RuleCatalog, RuleSet, Step};
use crate::template::{MatchBinding, RenderError, UrlTemplate};
use tracing::trace;

/// Deepest chain of `call` steps before evaluation fails.
pub const MAX_CALL_DEPTH: usize = 32;

/// Outcome of evaluating a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Rewritten(String),
    NoMatch,
}

impl Evaluation {
    pub fn into_option(self) -> Option<String> {
        match self {
            Evaluation::Rewritten(value) => Some(value),
            Evaluation::NoMatch => None,
        }
    }
}

/// Fatal per-rule evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("rule '{rule}' in rule set '{rule_set}' calls unknown rule '{target}'")]
    UnknownRule {
        rule_set: String,
        rule: String,
        target: String,
    },

    #[error("rule '{rule}' references unregistered function '{function}'")]
    UnknownFunction { rule: String, function: String },

    #[error("function '{function}' failed in rule '{rule}': {message}")]
    Function {
        rule: String,
        function: String,
        message: String,
    },

    #[error("call depth exceeded {limit} in rule '{rule}'")]
    RecursionLimit { rule: String, limit: usize },
}

#[derive(Debug, Clone)]
struct State {
    value: String,
    bindings: MatchBinding,
    rewritten: bool,
}

/// Evaluates rules of a catalog using a function registry.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    catalog: &'a RuleCatalog,
    functions: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a RuleCatalog, functions: &'a FunctionRegistry) -> Self {
        Self { catalog, functions }
    }

    /// Evaluate one rule of `set` against `input`.
    pub fn evaluate(
        &self,
        set: &RuleSet,
        rule: &Rule,
        input: &str,
        bindings: &MatchBinding,
    ) -> Result<Evaluation, EvaluationError> {
        let state = State {
            value: input.to_string(),
            bindings: bindings.clone(),
            rewritten: false,
        };
        Ok(match self.eval_rule(set, rule, state, 0)? {
            Some(state) if state.rewritten => Evaluation::Rewritten(state.value),
            _ => Evaluation::NoMatch,
        })
    }

    /// Try each rule of `set` in order; the first rewrite wins.
    ///
    /// Returns the name of the rule that fired with its output.
    pub fn rewrite<'s>(
        &self,
        set: &'s RuleSet,
        input: &str,
        bindings: &MatchBinding,
    ) -> Result<Option<(&'s str, String)>, EvaluationError> {
        for rule in set.rules() {
            if let Evaluation::Rewritten(value) = self.evaluate(set, rule, input, bindings)? {
                return Ok(Some((rule.name.as_str(), value)));
            }
        }
        Ok(None)
    }

    fn eval_rule(
        &self,
        set: &RuleSet,
        rule: &Rule,
        state: State,
        depth: usize,
    ) -> Result<Option<State>, EvaluationError> {
        if rule.steps.is_empty() {
            return Ok(None);
        }
        self.eval_sequence(set, rule, &rule.steps, state, depth)
    }

    fn eval_sequence(
        &self,
        set: &RuleSet,
        rule: &Rule,
        steps: &[Step],
        mut state: State,
        depth: usize,
    ) -> Result<Option<State>, EvaluationError> {
        for step in steps {
            match self.eval_step(set, rule, step, state, depth)? {
                Some(next) => state = next,
                None => return Ok(None),
            }
        }
        Ok(Some(state))
    }

    fn eval_step(
        &self,
        set: &RuleSet,
        rule: &Rule,
        step: &Step,
        state: State,
        depth: usize,
    ) -> Result<Option<State>, EvaluationError> {
        match step {
            Step::Match(pattern) => Ok(self.eval_match(pattern, state)),
            Step::Rewrite(template) => self.eval_rewrite(rule, template, state),
            Step::Call(target) => {
                if depth >= MAX_CALL_DEPTH {
                    return Err(EvaluationError::RecursionLimit {
                        rule: rule.name.clone(),
                        limit: MAX_CALL_DEPTH,
                    });
                }
                let (owner, callee) = self.catalog.find_rule(set, target).ok_or_else(|| {
                    EvaluationError::UnknownRule {
                        rule_set: set.name().to_string(),
                        rule: rule.name.clone(),
                        target: target.clone(),
                    }
                })?;
                trace!(rule = %rule.name, callee = %callee.name, depth, "Calling rule");
                self.eval_rule(owner, callee, state, depth + 1)
            }
            Step::And(children) => self.eval_sequence(set, rule, children, state, depth),
            Step::Or(children) => {
                for child in children {
                    if let Some(next) = self.eval_step(set, rule, child, state.clone(), depth)? {
                        return Ok(Some(next));
                    }
                }
                Ok(None)
            }
        }
    }

    fn eval_match(&self, pattern: &UrlTemplate, mut state: State) -> Option<State> {
        let found = pattern.match_url(&state.value)?;
        state.bindings.merge(found);
        Some(state)
    }

    fn eval_rewrite(
        &self,
        rule: &Rule,
        template: &UrlTemplate,
        mut state: State,
    ) -> Result<Option<State>, EvaluationError> {
        match template.render_with(&state.bindings, self.functions) {
            Ok(value) => {
                state.value = value;
                state.rewritten = true;
                Ok(Some(state))
            }
            Err(RenderError::UnboundCapture(name)) => {
                trace!(rule = %rule.name, capture = %name, "Unbound capture, rule does not match");
                Ok(None)
            }
            Err(RenderError::UnknownFunction(function)) => Err(EvaluationError::UnknownFunction {
                rule: rule.name.clone(),
                function,
            }),
            Err(RenderError::Function { name, message }) => Err(EvaluationError::Function {
                rule: rule.name.clone(),
                function: name,
                message,
            }),
        }
    }
}
