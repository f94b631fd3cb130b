//! Per-exchange rewrite state and the request/response values the host
//! supplies.

use crate::config::Direction;
use crate::rule::{EvaluationError, Evaluator, RuleSet};
use crate::template::MatchBinding;
use std::cell::Cell;
use std::sync::Arc;
use tracing::{debug, trace};

/// Rewrite state for one direction of one exchange.
///
/// Holds a reference to the shared rule set, never a copy. Created per
/// exchange and dropped with it.
pub struct RewriteContext<'a> {
    direction: Direction,
    rule_set: Arc<RuleSet>,
    evaluator: Evaluator<'a>,
    bindings: MatchBinding,
    rewrites: Cell<usize>,
}

impl<'a> RewriteContext<'a> {
    pub fn new(direction: Direction, rule_set: Arc<RuleSet>, evaluator: Evaluator<'a>) -> Self {
        Self {
            direction,
            rule_set,
            evaluator,
            bindings: MatchBinding::new(),
            rewrites: Cell::new(0),
        }
    }

    /// Seed every evaluation with `bindings`.
    pub fn with_bindings(mut self, bindings: MatchBinding) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    /// Number of values rewritten through this context so far.
    pub fn rewrites(&self) -> usize {
        self.rewrites.get()
    }

    /// Offer one candidate value to the active rule set.
    ///
    /// `Ok(None)` is pass-through: no rule matched and the caller keeps the
    /// original.
    pub fn rewrite_value(&self, value: &str) -> Result<Option<String>, EvaluationError> {
        match self.evaluator.rewrite(&self.rule_set, value, &self.bindings)? {
            Some((rule, output)) => {
                debug!(
                    direction = %self.direction,
                    rule_set = %self.rule_set.name(),
                    rule = %rule,
                    input = %value,
                    output = %output,
                    "Rule matched"
                );
                self.rewrites.set(self.rewrites.get() + 1);
                Ok(Some(output))
            }
            None => {
                trace!(direction = %self.direction, value = %value, "No rule matched");
                Ok(None)
            }
        }
    }
}

/// Request information supplied by the hosting layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Fully resolved absolute request URL
    pub url: String,
    /// Request headers in wire order
    pub headers: Vec<(String, String)>,
    /// Request body, if any
    pub body: Option<Vec<u8>>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Response information supplied by the hosting layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    /// HTTP status code
    pub status: u16,
    /// Response headers in wire order
    pub headers: Vec<(String, String)>,
    /// Response body, if any
    pub body: Option<Vec<u8>>,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            status: 200,
            headers: vec![],
            body: None,
        }
    }
}

impl ResponseInfo {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Request to dispatch to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RewrittenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response to return to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RewrittenResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
