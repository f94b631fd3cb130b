//! XML body handler.

use super::markup::{scan_attributes, trimmed_range};
use super::{ContentHandler, Splice, TransformError};
use crate::context::RewriteContext;
use quick_xml::escape::{escape, partial_escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::ops::Range;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// XML body handler.
///
/// Attribute values and text content are offered individually. Names,
/// namespace declarations, comments and processing instructions are never
/// touched, and the document must be well-formed.
#[derive(Debug, Default)]
pub struct XmlHandler;

impl XmlHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ContentHandler for XmlHandler {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn content_types(&self) -> &[&'static str] {
        &["application/xml*", "text/xml*", "*+xml"]
    }

    fn rewrite(
        &self,
        ctx: &RewriteContext<'_>,
        text: &str,
    ) -> Result<Option<String>, TransformError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().check_end_names = true;

        let mut splice = Splice::new(text);
        let mut pos = 0;
        let mut depth = 0usize;
        let mut seen_root = false;

        loop {
            let event = reader.read_event().map_err(|e| {
                TransformError::Xml(format!("{} at byte {}", e, reader.error_position()))
            })?;
            match event {
                Event::Start(ref tag) | Event::Empty(ref tag) => {
                    if depth == 0 && seen_root {
                        return Err(TransformError::Xml("multiple root elements".to_string()));
                    }
                    seen_root = true;
                    for attr in tag.attributes() {
                        attr.map_err(|e| TransformError::Xml(e.to_string()))?;
                    }
                    let end = reader.buffer_position() as usize;
                    let start = markup_start(text, pos);
                    rewrite_attributes(ctx, text, start..end, &mut splice)?;
                    if matches!(event, Event::Start(_)) {
                        depth += 1;
                    }
                    pos = end;
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    pos = reader.buffer_position() as usize;
                }
                Event::Text(_) => {
                    let end = text[pos..].find('<').map_or(text.len(), |p| pos + p);
                    let raw = &text[pos..end];
                    if depth == 0 {
                        if !raw.trim().is_empty() {
                            return Err(TransformError::Xml(
                                "text outside the root element".to_string(),
                            ));
                        }
                    } else if let Some(r) = trimmed_range(raw) {
                        rewrite_text(ctx, text, pos + r.start..pos + r.end, &mut splice)?;
                    }
                    pos = end;
                }
                Event::CData(_) => {
                    let end = reader.buffer_position() as usize;
                    let start = markup_start(text, pos);
                    let inner = start + CDATA_OPEN.len()..end - CDATA_CLOSE.len();
                    if let Some(r) = trimmed_range(&text[inner.clone()]) {
                        let range = inner.start + r.start..inner.start + r.end;
                        if let Some(rewritten) = ctx.rewrite_value(&text[range.clone()])? {
                            if !rewritten.contains(CDATA_CLOSE) {
                                splice.replace(range, rewritten);
                            }
                        }
                    }
                    pos = end;
                }
                Event::Eof => break,
                _ => pos = reader.buffer_position() as usize,
            }
        }

        if depth != 0 {
            return Err(TransformError::Xml("unclosed element at end of document".to_string()));
        }
        if !seen_root {
            return Err(TransformError::Xml("no root element".to_string()));
        }
        Ok(splice.finish())
    }
}

fn markup_start(text: &str, from: usize) -> usize {
    text[from..].find('<').map_or(from, |p| from + p)
}

fn is_namespace_declaration(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

fn rewrite_attributes(
    ctx: &RewriteContext<'_>,
    text: &str,
    tag: Range<usize>,
    splice: &mut Splice<'_>,
) -> Result<(), TransformError> {
    for attr in scan_attributes(&text[tag.clone()]) {
        if is_namespace_declaration(attr.name) || attr.value.is_empty() {
            continue;
        }
        let value = unescape(attr.value).map_err(|e| TransformError::Xml(e.to_string()))?;
        if let Some(rewritten) = ctx.rewrite_value(&value)? {
            let range = tag.start + attr.range.start..tag.start + attr.range.end;
            splice.replace(range, escape(&rewritten).into_owned());
        }
    }
    Ok(())
}

fn rewrite_text(
    ctx: &RewriteContext<'_>,
    text: &str,
    range: Range<usize>,
    splice: &mut Splice<'_>,
) -> Result<(), TransformError> {
    let value = unescape(&text[range.clone()]).map_err(|e| TransformError::Xml(e.to_string()))?;
    if let Some(rewritten) = ctx.rewrite_value(&value)? {
        splice.replace(range, partial_escape(&rewritten).into_owned());
    }
    Ok(())
}
