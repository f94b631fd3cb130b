//! Content-type parsing and character encoding round trips.

use super::TransformError;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use regex::bytes::Regex;
use std::sync::LazyLock;

/// How far into a body to look for an in-document charset declaration.
const SNIFF_LIMIT: usize = 1024;

static XML_DECL_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\bencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .unwrap()
});

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9._:-]+)"#).unwrap()
});

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    charset: Option<String>,
}

impl MediaType {
    /// Parse `type/subtype; param=value...`. The essence is lowercased.
    pub fn parse(content_type: &str) -> Self {
        let mut parts = content_type.split(';');
        let essence = parts
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let charset = parts.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
        });
        Self { essence, charset }
    }

    pub fn essence(&self) -> &str {
        &self.essence
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }
}

/// Body text decoded from its declared encoding.
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    bom: Vec<u8>,
}

impl Decoded {
    /// Encode `text` back into the body's encoding, restoring any BOM.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, TransformError> {
        let mut out = self.bom.clone();
        if self.encoding == UTF_16LE {
            out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        } else if self.encoding == UTF_16BE {
            out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
        } else {
            let (bytes, _, unmappable) = self.encoding.encode(text);
            if unmappable {
                return Err(TransformError::Encode(self.encoding.name()));
            }
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }
}

/// Decode `body` using, in order: a byte order mark, the content-type
/// charset, an XML declaration or HTML meta charset, then UTF-8.
pub fn decode(media: &MediaType, body: &[u8]) -> Result<Decoded, TransformError> {
    let (encoding, bom_len) = match Encoding::for_bom(body) {
        Some((encoding, len)) => (encoding, len),
        None => (resolve(media, body)?, 0),
    };
    let (bom, rest) = body.split_at(bom_len);
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(rest)
        .ok_or(TransformError::Decode(encoding.name()))?
        .into_owned();
    Ok(Decoded {
        text,
        encoding,
        bom: bom.to_vec(),
    })
}

fn resolve(media: &MediaType, body: &[u8]) -> Result<&'static Encoding, TransformError> {
    if let Some(label) = media.charset() {
        return Encoding::for_label(label.as_bytes())
            .ok_or_else(|| TransformError::Charset(label.to_string()));
    }
    let head = &body[..body.len().min(SNIFF_LIMIT)];
    let sniffed = XML_DECL_ENCODING
        .captures(head)
        .or_else(|| META_CHARSET.captures(head))
        .and_then(|c| c.get(1));
    // An ASCII-readable declaration never means UTF-16
    match sniffed {
        Some(label) => Encoding::for_label(label.as_bytes())
            .map(Encoding::output_encoding)
            .ok_or_else(|| {
                TransformError::Charset(String::from_utf8_lossy(label.as_bytes()).into_owned())
            }),
        None => Ok(UTF_8),
    }
}
