//! HTML body handler.
//!
//! Markup is scanned tolerantly with regexes rather than parsed: a broken
//! tag is simply skipped. Only configured URL attributes and absolute URLs
//! in text are offered for rewriting. Script and style content is skipped.

use super::markup::scan_attributes;
use super::{ContentHandler, Splice, TransformError};
use crate::context::RewriteContext;
use quick_xml::escape::{escape, partial_escape, unescape};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Comments, declarations, CDATA and tags.
static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<[!?][^>]*>|</?[A-Za-z][A-Za-z0-9:_-]*(?:[^>"']|"[^"]*"|'[^']*')*>"#,
    )
    .unwrap()
});

static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[A-Za-z][A-Za-z0-9+.-]*://[^\s<>"']+"#).unwrap());

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')'];

static SCRIPT_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</script\s*>").unwrap());

static STYLE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</style\s*>").unwrap());

/// HTML body handler.
#[derive(Debug)]
pub struct HtmlHandler {
    /// Lowercased URL-bearing attribute names
    attributes: HashSet<String>,
}

impl HtmlHandler {
    pub fn new(attributes: &[String]) -> Self {
        Self {
            attributes: attributes.iter().map(|a| a.to_ascii_lowercase()).collect(),
        }
    }

    fn rewrite_tag(
        &self,
        ctx: &RewriteContext<'_>,
        start: usize,
        tag: &str,
        splice: &mut Splice<'_>,
    ) -> Result<(), TransformError> {
        for attr in scan_attributes(tag) {
            if attr.value.is_empty() || !self.attributes.contains(&attr.name.to_ascii_lowercase()) {
                continue;
            }
            let value = unescape(attr.value).unwrap_or(attr.value.into());
            let Some(rewritten) = ctx.rewrite_value(&value)? else {
                continue;
            };
            let range = start + attr.range.start..start + attr.range.end;
            let needs_quotes = attr.quote.is_none()
                && rewritten
                    .bytes()
                    .any(|b| b.is_ascii_whitespace() || matches!(b, b'"' | b'\'' | b'=' | b'<' | b'>' | b'`'));
            let replacement = if needs_quotes {
                format!("\"{}\"", escape(&rewritten))
            } else if attr.quote.is_some() {
                escape(&rewritten).into_owned()
            } else {
                partial_escape(&rewritten).into_owned()
            };
            splice.replace(range, replacement);
        }
        Ok(())
    }
}

impl ContentHandler for HtmlHandler {
    fn name(&self) -> &'static str {
        "html"
    }

    fn content_types(&self) -> &[&'static str] {
        &["text/html*", "application/html*", "application/xhtml+xml*"]
    }

    fn rewrite(
        &self,
        ctx: &RewriteContext<'_>,
        text: &str,
    ) -> Result<Option<String>, TransformError> {
        let mut splice = Splice::new(text);
        let mut pos = 0;

        while let Some(m) = MARKUP.find_at(text, pos) {
            rewrite_text(ctx, pos, &text[pos..m.start()], &mut splice)?;
            pos = m.end();

            let tag = m.as_str();
            if tag.starts_with("</") || tag.starts_with("<!") || tag.starts_with("<?") {
                continue;
            }
            self.rewrite_tag(ctx, m.start(), tag, &mut splice)?;

            if tag.ends_with("/>") {
                continue;
            }
            let raw_end = match element_name(tag).to_ascii_lowercase().as_str() {
                "script" => Some(&*SCRIPT_END),
                "style" => Some(&*STYLE_END),
                _ => None,
            };
            if let Some(end) = raw_end {
                pos = end.find_at(text, pos).map_or(text.len(), |e| e.start());
            }
        }
        rewrite_text(ctx, pos, &text[pos..], &mut splice)?;

        Ok(splice.finish())
    }
}

fn element_name(tag: &str) -> &str {
    let name = &tag[1..];
    let end = name
        .find(|c: char| c.is_ascii_whitespace() || c == '>' || c == '/')
        .unwrap_or(name.len());
    &name[..end]
}

fn rewrite_text(
    ctx: &RewriteContext<'_>,
    offset: usize,
    chunk: &str,
    splice: &mut Splice<'_>,
) -> Result<(), TransformError> {
    for m in ABSOLUTE_URL.find_iter(chunk) {
        // Sentence punctuation after a URL is not part of it
        let raw = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        let value = unescape(raw).unwrap_or(raw.into());
        if let Some(rewritten) = ctx.rewrite_value(&value)? {
            let range = offset + m.start()..offset + m.start() + raw.len();
            splice.replace(range, partial_escape(&rewritten).into_owned());
        }
    }
    Ok(())
}
