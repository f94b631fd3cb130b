//! Attribute scanning over the raw text of a start tag, shared by the XML
//! and HTML handlers. Offsets are relative to the tag text so callers can
//! splice values without re-serializing the tag.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribute<'t> {
    pub name: &'t str,
    pub value: &'t str,
    /// Byte range of the value inside the tag, quotes excluded.
    pub range: Range<usize>,
    pub quote: Option<u8>,
}

/// Attributes with a value, in document order. Valueless (boolean)
/// attributes are skipped.
pub(crate) fn scan_attributes(tag: &str) -> Vec<Attribute<'_>> {
    let bytes = tag.as_bytes();
    let mut attrs = vec![];
    let mut i = 1;

    // element name
    while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }

    loop {
        while i < bytes.len() && (is_space(bytes[i]) || bytes[i] == b'/') {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b'>' || bytes[i] == b'?' {
            break;
        }

        let name_start = i;
        while i < bytes.len() && !is_space(bytes[i]) && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let name = &tag[name_start..i];

        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            continue;
        }
        i += 1;
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let (range, quote) = match bytes[i] {
            q @ (b'"' | b'\'') => {
                let start = i + 1;
                let end = bytes[start..]
                    .iter()
                    .position(|&b| b == q)
                    .map_or(bytes.len(), |p| start + p);
                i = (end + 1).min(bytes.len());
                (start..end, Some(q))
            }
            _ => {
                let start = i;
                while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'>' {
                    i += 1;
                }
                (start..i, None)
            }
        };
        attrs.push(Attribute {
            name,
            value: &tag[range.clone()],
            range,
            quote,
        });
    }

    attrs
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

/// Range of `text` without leading and trailing whitespace, or `None` if
/// nothing remains.
pub(crate) fn trimmed_range(text: &str) -> Option<Range<usize>> {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len();
    (start < end).then_some(start..end)
}
