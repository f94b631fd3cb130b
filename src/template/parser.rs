//! Template text parsing.

use super::{QueryParam, Segment, TemplateError, UrlTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// Braces and asterisks carry meaning.
    Pattern,
    /// Everything is literal text.
    Literal,
}

impl Mode {
    fn braces(self) -> bool {
        self == Mode::Pattern
    }
}

pub(super) fn parse(text: &str, mode: Mode) -> Result<UrlTemplate, TemplateError> {
    if mode.braces() {
        check_braces(text)?;
    }

    let mut template = UrlTemplate::default();
    let braces = mode.braces();

    let (rest, fragment) = match find_top(text, "#", braces) {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    };
    let (rest, query) = match find_top(rest, "?", braces) {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };

    let path = match find_top(rest, "://", braces) {
        Some(i) if is_scheme(&rest[..i], mode) => {
            template.scheme = Some(parse_segment(&rest[..i], mode)?);
            let after = &rest[i + 3..];
            let end = find_top(after, "/", braces).unwrap_or(after.len());
            parse_authority(&after[..end], mode, &mut template)?;
            &after[end..]
        }
        _ => rest,
    };

    if let Some(stripped) = path.strip_prefix('/') {
        template.absolute = true;
        template.path = split_top(stripped, '/', braces)
            .into_iter()
            .map(|s| parse_segment(s, mode))
            .collect::<Result<_, _>>()?;
    } else if !path.is_empty() {
        template.path = split_top(path, '/', braces)
            .into_iter()
            .map(|s| parse_segment(s, mode))
            .collect::<Result<_, _>>()?;
    }

    if let Some(query) = query {
        for part in split_top(query, '&', braces) {
            if part.is_empty() {
                continue;
            }
            if braces && (part == "{**}" || part == "**") {
                template.query_glob = true;
                continue;
            }
            let param = match find_top(part, "=", braces) {
                Some(i) => QueryParam {
                    name: literal(&part[..i])?,
                    value: Some(parse_segment(&part[i + 1..], mode)?),
                },
                None => QueryParam {
                    name: literal(part)?,
                    value: None,
                },
            };
            template.query.push(param);
        }
    }

    if let Some(fragment) = fragment {
        template.fragment = Some(parse_segment(fragment, mode)?);
    }

    Ok(template)
}

fn parse_authority(
    authority: &str,
    mode: Mode,
    template: &mut UrlTemplate,
) -> Result<(), TemplateError> {
    let braces = mode.braces();
    let (host, port) = if authority.starts_with('[') {
        // IPv6 literal
        match authority.find(']') {
            Some(end) => {
                let rest = &authority[end + 1..];
                (&authority[..=end], rest.strip_prefix(':'))
            }
            None => (authority, None),
        }
    } else {
        match rfind_top(authority, ':', braces) {
            Some(i) => (&authority[..i], Some(&authority[i + 1..])),
            None => (authority, None),
        }
    };

    template.host = Some(parse_segment(host, mode)?);
    if let Some(port) = port {
        template.port = Some(parse_segment(port, mode)?);
    }
    Ok(())
}

fn parse_segment(text: &str, mode: Mode) -> Result<Segment, TemplateError> {
    if mode == Mode::Literal {
        return Ok(Segment::Literal(literal(text)?));
    }
    match text {
        "*" => return Ok(Segment::Wildcard),
        "**" => return Ok(Segment::Glob),
        _ => {}
    }
    if text.starts_with('{') && text.ends_with('}') && text[1..].find('}') == Some(text.len() - 2)
    {
        return parse_expression(&text[1..text.len() - 1], text);
    }
    if text.contains('{') || text.contains('}') {
        return Err(TemplateError::PartialCapture(text.to_string()));
    }
    Ok(Segment::Literal(literal(text)?))
}

fn parse_expression(inner: &str, text: &str) -> Result<Segment, TemplateError> {
    if let Some(call) = inner.strip_prefix('$') {
        let (name, args) = match call.find('[') {
            Some(open) => {
                let args = call[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| TemplateError::InvalidFunction(text.to_string()))?;
                let args = if args.is_empty() {
                    Vec::new()
                } else {
                    args.split(',').map(|a| a.trim().to_string()).collect()
                };
                (&call[..open], args)
            }
            None => (call, Vec::new()),
        };
        if name.is_empty() || name.contains(']') {
            return Err(TemplateError::InvalidFunction(text.to_string()));
        }
        return Ok(Segment::Function {
            name: name.to_string(),
            args,
        });
    }

    let (name, pattern) = match inner.split_once('=') {
        Some((name, pattern)) => (name.trim(), Some(pattern.trim())),
        None => (inner.trim(), None),
    };
    if name.is_empty() {
        return Err(TemplateError::EmptyCapture(text.to_string()));
    }
    let glob = match pattern {
        None | Some("*") => false,
        Some("**") => true,
        Some(other) => {
            return Err(TemplateError::InvalidCapture {
                name: name.to_string(),
                pattern: other.to_string(),
            })
        }
    };
    Ok(Segment::Capture {
        name: name.to_string(),
        glob,
    })
}

/// Validate percent-encoding and return the text unchanged.
fn literal(text: &str) -> Result<String, TemplateError> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(TemplateError::Encoding {
                    text: text.to_string(),
                    offset: i,
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(text.to_string())
}

fn is_scheme(text: &str, mode: Mode) -> bool {
    if mode.braces() && (text == "*" || (text.starts_with('{') && text.ends_with('}'))) {
        return true;
    }
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn check_braces(text: &str) -> Result<(), TemplateError> {
    let mut open = false;
    for c in text.chars() {
        match c {
            '{' if open => return Err(TemplateError::UnbalancedBraces(text.to_string())),
            '{' => open = true,
            '}' if !open => return Err(TemplateError::UnbalancedBraces(text.to_string())),
            '}' => open = false,
            _ => {}
        }
    }
    if open {
        return Err(TemplateError::UnbalancedBraces(text.to_string()));
    }
    Ok(())
}

/// Byte offsets of `text` that sit outside any `{...}` expression.
fn top_level(text: &str, braces: bool) -> impl Iterator<Item = usize> + '_ {
    let mut depth = 0usize;
    text.char_indices().filter_map(move |(i, c)| {
        if !braces {
            return Some(i);
        }
        match c {
            '{' => {
                depth += 1;
                None
            }
            '}' => {
                depth = depth.saturating_sub(1);
                None
            }
            _ if depth == 0 => Some(i),
            _ => None,
        }
    })
}

fn find_top(text: &str, needle: &str, braces: bool) -> Option<usize> {
    top_level(text, braces).find(|&i| text[i..].starts_with(needle))
}

fn rfind_top(text: &str, needle: char, braces: bool) -> Option<usize> {
    top_level(text, braces)
        .filter(|&i| text[i..].starts_with(needle))
        .last()
}

fn split_top(text: &str, sep: char, braces: bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for i in top_level(text, braces) {
        if text[i..].starts_with(sep) {
            parts.push(&text[start..i]);
            start = i + sep.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}
