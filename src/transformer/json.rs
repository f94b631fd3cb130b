//! JSON body handler.
//!
//! The document is validated with `serde_json`, then string values (never
//! keys) are located by a token scan and offered for rewriting. A rewritten
//! value is re-encoded as a JSON string in place, so key order, whitespace
//! and number formatting are kept exactly.

use super::{ContentHandler, Splice, TransformError};
use crate::context::RewriteContext;
use serde::de::IgnoredAny;

/// JSON body handler.
#[derive(Debug, Default)]
pub struct JsonHandler;

impl JsonHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ContentHandler for JsonHandler {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_types(&self) -> &[&'static str] {
        &["application/json*", "*+json", "text/json*"]
    }

    fn rewrite(
        &self,
        ctx: &RewriteContext<'_>,
        text: &str,
    ) -> Result<Option<String>, TransformError> {
        serde_json::from_str::<IgnoredAny>(text)?;

        let bytes = text.as_bytes();
        let mut splice = Splice::new(text);
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'"' {
                i += 1;
                continue;
            }
            let end = string_end(bytes, i);
            if !is_key(bytes, end) {
                let value: String = serde_json::from_str(&text[i..end])?;
                if let Some(rewritten) = ctx.rewrite_value(&value)? {
                    splice.replace(i..end, serde_json::to_string(&rewritten)?);
                }
            }
            i = end;
        }
        Ok(splice.finish())
    }
}

/// Index just past the closing quote of the string starting at `start`.
fn string_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// In a valid document a string followed by `:` is an object key.
fn is_key(bytes: &[u8], after: usize) -> bool {
    bytes[after..]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b':')
}
