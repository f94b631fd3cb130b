//! Header rewriting.

use crate::context::RewriteContext;
use crate::rule::EvaluationError;
use std::collections::HashSet;

/// Rewrites the whole value of each configured URL header.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    /// Lowercased header names
    names: HashSet<String>,
}

impl HeaderRewriter {
    pub fn new(names: &[String]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_ascii_lowercase()).collect(),
        }
    }

    pub fn handles(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    /// Rewrite headers, preserving order, names and multiplicity. Other
    /// headers are copied as-is.
    pub fn rewrite_headers(
        &self,
        ctx: &RewriteContext<'_>,
        headers: &[(String, String)],
    ) -> Result<Vec<(String, String)>, EvaluationError> {
        headers
            .iter()
            .map(|(name, value)| {
                if !self.handles(name) {
                    return Ok((name.clone(), value.clone()));
                }
                let value = ctx.rewrite_value(value.trim())?.unwrap_or_else(|| value.clone());
                Ok((name.clone(), value))
            })
            .collect()
    }
}
