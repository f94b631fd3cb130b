//! Content handlers: find URL-shaped values inside headers and bodies and
//! offer each one to the active rule set.
//!
//! Every handler splices replacements into the original text. Bytes outside
//! a rewritten value are copied through untouched, and a body in which
//! nothing was rewritten comes back as the original bytes.

pub mod charset;
pub mod form;
pub mod header;
pub mod html;
pub mod json;
mod markup;
pub mod url;
pub mod xml;

pub use charset::MediaType;
pub use form::FormHandler;
pub use header::HeaderRewriter;
pub use html::HtmlHandler;
pub use json::JsonHandler;
pub use url::UrlRewriter;
pub use xml::XmlHandler;

use crate::config::Settings;
use crate::context::RewriteContext;
use crate::rule::EvaluationError;
use glob::Pattern;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace};

/// Errors raised while rewriting content.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed XML body: {0}")]
    Xml(String),

    #[error("Unsupported charset '{0}'")]
    Charset(String),

    #[error("Body is not valid {0}")]
    Decode(&'static str),

    #[error("Rewritten body cannot be represented in {0}")]
    Encode(&'static str),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// A handler for one family of body content types.
pub trait ContentHandler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &'static str;

    /// Content-type glob patterns this handler claims.
    fn content_types(&self) -> &[&'static str];

    /// Rewrite decoded body text. `None` means nothing changed.
    fn rewrite(&self, ctx: &RewriteContext<'_>, text: &str)
        -> Result<Option<String>, TransformError>;
}

struct Claimed {
    patterns: Vec<Pattern>,
    handler: Arc<dyn ContentHandler>,
}

/// Content handlers in priority order.
pub struct ContentHandlers {
    handlers: Vec<Claimed>,
}

impl ContentHandlers {
    /// The JSON, HTML, XML and form handlers. HTML is consulted before XML
    /// so that XHTML gets tolerant parsing.
    pub fn new(settings: &Settings) -> Self {
        let mut handlers = Self { handlers: vec![] };
        handlers.register(Arc::new(JsonHandler::new()));
        handlers.register(Arc::new(HtmlHandler::new(&settings.html_attributes)));
        handlers.register(Arc::new(XmlHandler::new()));
        handlers.register(Arc::new(FormHandler::new()));
        handlers
    }

    /// Add a handler after the existing ones.
    pub fn register(&mut self, handler: Arc<dyn ContentHandler>) {
        let patterns = handler
            .content_types()
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        self.handlers.push(Claimed { patterns, handler });
    }

    /// The handler claiming `media`, if any.
    pub fn handler_for(&self, media: &MediaType) -> Option<&dyn ContentHandler> {
        self.handlers
            .iter()
            .find(|c| c.patterns.iter().any(|p| p.matches(media.essence())))
            .map(|c| c.handler.as_ref())
    }

    /// Rewrite a body of the given content type.
    ///
    /// Unclaimed or missing content types pass through unparsed; so does a
    /// body in which nothing matched. Returns `None` for pass-through.
    pub fn rewrite_body(
        &self,
        ctx: &RewriteContext<'_>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, TransformError> {
        let Some(media) = content_type.map(MediaType::parse) else {
            trace!(direction = %ctx.direction(), "No content type, body passed through");
            return Ok(None);
        };
        let Some(handler) = self.handler_for(&media) else {
            trace!(
                direction = %ctx.direction(),
                content_type = %media.essence(),
                "Unclaimed content type, body passed through"
            );
            return Ok(None);
        };

        let decoded = charset::decode(&media, body)?;
        let Some(rewritten) = handler.rewrite(ctx, &decoded.text)? else {
            return Ok(None);
        };
        debug!(
            direction = %ctx.direction(),
            handler = handler.name(),
            charset = decoded.encoding.name(),
            "Body rewritten"
        );
        Ok(Some(decoded.encode(&rewritten)?))
    }
}

/// Ordered, non-overlapping replacements over a source string.
pub(crate) struct Splice<'s> {
    source: &'s str,
    edits: Vec<(Range<usize>, String)>,
}

impl<'s> Splice<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: vec![],
        }
    }

    /// Replace `range`; ranges must be pushed in ascending order.
    pub(crate) fn replace(&mut self, range: Range<usize>, replacement: String) {
        debug_assert!(self.edits.last().map_or(true, |(r, _)| r.end <= range.start));
        self.edits.push((range, replacement));
    }

    /// The edited text, or `None` if nothing was replaced.
    pub(crate) fn finish(self) -> Option<String> {
        if self.edits.is_empty() {
            return None;
        }
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for (range, replacement) in self.edits {
            out.push_str(&self.source[cursor..range.start]);
            out.push_str(&replacement);
            cursor = range.end;
        }
        out.push_str(&self.source[cursor..]);
        Some(out)
    }
}
