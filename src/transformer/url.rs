//! Request URL rewriting.

use crate::context::RewriteContext;
use crate::rule::EvaluationError;

/// Rewrites the request line URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlRewriter;

impl UrlRewriter {
    pub fn new() -> Self {
        Self
    }

    /// The dispatch URL: the rewritten URL, or the original on pass-through.
    pub fn rewrite_url(
        &self,
        ctx: &RewriteContext<'_>,
        url: &str,
    ) -> Result<String, EvaluationError> {
        Ok(ctx.rewrite_value(url)?.unwrap_or_else(|| url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Direction;
    use crate::transformer::test_support::Fixture;

    #[test]
    fn test_path_rewrite() {
        let fixture = Fixture::new();
        let ctx = fixture.context(Direction::RequestUrl);
        let rewriter = UrlRewriter::new();
        assert_eq!(
            rewriter.rewrite_url(&ctx, "http://mock-host:1/test-input-path").unwrap(),
            "http://mock-host:1/test-output-path-1"
        );
        assert_eq!(
            rewriter.rewrite_url(&ctx, "http://mock-host:1/other?x=1").unwrap(),
            "http://mock-host:1/other?x=1"
        );
    }
}
