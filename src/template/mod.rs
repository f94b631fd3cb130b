//! URL templates.
//!
//! A template describes the shape of a URL:
//!
//! ```text
//! {scheme}://{host}:{port}/api/{path=**}?user.name={user}&{**}#{frag}
//! ```
//!
//! Every component is a [`Segment`]: a literal, an anonymous wildcard (`*`
//! for one value, `**` for any number of path segments), a named capture
//! (`{name}`, `{name=*}`, `{name=**}`) or, in rewrite templates only, a
//! function call (`{$name[arg,...]}`).
//!
//! Concrete URLs are parsed with [`UrlTemplate::parse_literal`], which treats
//! every component as a literal, and are then matched against a pattern with
//! [`UrlTemplate::match_url`].

mod binding;
mod matcher;
mod parser;
mod render;

pub use binding::MatchBinding;
pub use render::{FunctionResolver, NoFunctions, RenderError};

use std::fmt;

/// One component of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text that must match exactly (still percent-encoded).
    Literal(String),
    /// `*`: exactly one non-empty value.
    Wildcard,
    /// `**`: zero or more path segments.
    Glob,
    /// `{name}` or `{name=**}`.
    Capture { name: String, glob: bool },
    /// `{$name[args]}`, resolved at render time.
    Function { name: String, args: Vec<String> },
}

impl Segment {
    /// The literal text, if this is a literal segment.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            _ => None,
        }
    }

    fn is_function(&self) -> bool {
        matches!(self, Self::Function { .. })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => f.write_str(s),
            Self::Wildcard => f.write_str("*"),
            Self::Glob => f.write_str("**"),
            Self::Capture { name, glob: false } => write!(f, "{{{}}}", name),
            Self::Capture { name, glob: true } => write!(f, "{{{}=**}}", name),
            Self::Function { name, args } if args.is_empty() => write!(f, "{{${}}}", name),
            Self::Function { name, args } => write!(f, "{{${}[{}]}}", name, args.join(",")),
        }
    }
}

/// A query parameter matcher (`name=value`, or a bare `name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: String,
    pub value: Option<Segment>,
}

/// A parsed URL or URL pattern.
///
/// Immutable once parsed. Equality is by canonical string form, so two
/// templates written differently (`{id}` vs `{id=*}`) compare equal.
#[derive(Debug, Clone, Default)]
pub struct UrlTemplate {
    scheme: Option<Segment>,
    host: Option<Segment>,
    port: Option<Segment>,
    absolute: bool,
    path: Vec<Segment>,
    query: Vec<QueryParam>,
    query_glob: bool,
    fragment: Option<Segment>,
}

impl UrlTemplate {
    /// Parse a URL pattern, interpreting wildcards, captures and functions.
    pub fn parse(text: &str) -> Result<Self, TemplateError> {
        parser::parse(text, parser::Mode::Pattern)
    }

    /// Parse a concrete URL; braces and asterisks are plain text.
    pub fn parse_literal(text: &str) -> Result<Self, TemplateError> {
        parser::parse(text, parser::Mode::Literal)
    }

    pub fn scheme(&self) -> Option<&Segment> {
        self.scheme.as_ref()
    }

    pub fn host(&self) -> Option<&Segment> {
        self.host.as_ref()
    }

    pub fn port(&self) -> Option<&Segment> {
        self.port.as_ref()
    }

    /// Whether the path starts with `/`.
    pub fn is_absolute_path(&self) -> bool {
        self.absolute
    }

    /// Path segments. A trailing slash is an empty final segment.
    pub fn path(&self) -> &[Segment] {
        &self.path
    }

    pub fn query(&self) -> &[QueryParam] {
        &self.query
    }

    /// Whether the query carries `{**}`.
    pub fn has_query_glob(&self) -> bool {
        self.query_glob
    }

    pub fn fragment(&self) -> Option<&Segment> {
        self.fragment.as_ref()
    }

    /// Whether any component is a function call.
    pub fn has_functions(&self) -> bool {
        self.components().any(Segment::is_function)
    }

    fn components(&self) -> impl Iterator<Item = &Segment> {
        self.scheme
            .iter()
            .chain(self.host.iter())
            .chain(self.port.iter())
            .chain(self.path.iter())
            .chain(self.query.iter().filter_map(|q| q.value.as_ref()))
            .chain(self.fragment.iter())
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref scheme) = self.scheme {
            write!(f, "{}://", scheme)?;
        } else if self.host.is_some() {
            f.write_str("//")?;
        }
        if let Some(ref host) = self.host {
            write!(f, "{}", host)?;
        }
        if let Some(ref port) = self.port {
            write!(f, ":{}", port)?;
        }
        if self.absolute {
            f.write_str("/")?;
        }
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", segment)?;
        }
        if !self.query.is_empty() || self.query_glob {
            f.write_str("?")?;
            let mut first = true;
            for param in &self.query {
                if !first {
                    f.write_str("&")?;
                }
                first = false;
                f.write_str(&param.name)?;
                if let Some(ref value) = param.value {
                    write!(f, "={}", value)?;
                }
            }
            if self.query_glob {
                if !first {
                    f.write_str("&")?;
                }
                f.write_str("{**}")?;
            }
        }
        if let Some(ref fragment) = self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

impl PartialEq for UrlTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for UrlTemplate {}

impl std::str::FromStr for UrlTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors raised while parsing a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("malformed percent-encoding at offset {offset} in '{text}'")]
    Encoding { text: String, offset: usize },

    #[error("unbalanced braces in '{0}'")]
    UnbalancedBraces(String),

    #[error("empty capture name in '{0}'")]
    EmptyCapture(String),

    #[error("unsupported capture pattern '{pattern}' for '{name}'")]
    InvalidCapture { name: String, pattern: String },

    #[error("malformed function call '{0}'")]
    InvalidFunction(String),

    #[error("captures must span a whole component: '{0}'")]
    PartialCapture(String),

    #[error("function '{0}' cannot be used in a match pattern")]
    FunctionInPattern(String),
}
