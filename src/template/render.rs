//! Rendering templates back into literal URLs.

use super::{MatchBinding, Segment, UrlTemplate};

/// Resolves `{$name[args]}` calls while rendering.
pub trait FunctionResolver {
    fn invoke(
        &self,
        name: &str,
        args: &[String],
        bindings: &MatchBinding,
    ) -> Result<String, RenderError>;
}

/// Resolver with no functions; every call is unknown.
pub struct NoFunctions;

impl FunctionResolver for NoFunctions {
    fn invoke(&self, name: &str, _: &[String], _: &MatchBinding) -> Result<String, RenderError> {
        Err(RenderError::UnknownFunction(name.to_string()))
    }
}

/// Errors raised while rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("no binding for capture '{0}'")]
    UnboundCapture(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },
}

impl UrlTemplate {
    /// Render with bound values only; any function call fails.
    pub fn render(&self, bindings: &MatchBinding) -> Result<String, RenderError> {
        self.render_with(bindings, &NoFunctions)
    }

    /// Render, substituting captures from `bindings` and calling `functions`.
    ///
    /// Anonymous wildcards have nothing to substitute and fail as unbound.
    /// `{**}` in the query re-emits the extra query parameters recorded by
    /// the match that produced `bindings`.
    pub fn render_with(
        &self,
        bindings: &MatchBinding,
        functions: &dyn FunctionResolver,
    ) -> Result<String, RenderError> {
        let mut out = String::new();

        if let Some(ref scheme) = self.scheme {
            out.push_str(&render_scalar(scheme, bindings, functions)?);
            out.push_str("://");
        } else if self.host.is_some() {
            out.push_str("//");
        }
        if let Some(ref host) = self.host {
            out.push_str(&render_scalar(host, bindings, functions)?);
        }
        if let Some(ref port) = self.port {
            out.push(':');
            out.push_str(&render_scalar(port, bindings, functions)?);
        }

        let mut parts = Vec::with_capacity(self.path.len());
        for segment in &self.path {
            match segment {
                Segment::Capture { name, .. } => {
                    let values = lookup(name, bindings)?;
                    parts.extend(values.iter().cloned());
                }
                other => parts.push(render_scalar(other, bindings, functions)?),
            }
        }
        if self.absolute {
            out.push('/');
        }
        out.push_str(&parts.join("/"));

        let mut query = Vec::new();
        for param in &self.query {
            match param.value {
                None => query.push(param.name.clone()),
                Some(Segment::Capture { ref name, .. }) => {
                    for (i, value) in lookup(name, bindings)?.iter().enumerate() {
                        if bindings.is_valueless(name, i) {
                            query.push(param.name.clone());
                        } else {
                            query.push(format!("{}={}", param.name, value));
                        }
                    }
                }
                Some(ref value) => {
                    let value = render_scalar(value, bindings, functions)?;
                    query.push(format!("{}={}", param.name, value));
                }
            }
        }
        if self.query_glob {
            for (name, value) in bindings.extra_query() {
                match value {
                    Some(value) => query.push(format!("{}={}", name, value)),
                    None => query.push(name.clone()),
                }
            }
        }
        if !query.is_empty() {
            out.push('?');
            out.push_str(&query.join("&"));
        }

        if let Some(ref fragment) = self.fragment {
            out.push('#');
            out.push_str(&render_scalar(fragment, bindings, functions)?);
        }

        Ok(out)
    }
}

fn lookup<'a>(name: &str, bindings: &'a MatchBinding) -> Result<&'a [String], RenderError> {
    bindings
        .get(name)
        .ok_or_else(|| RenderError::UnboundCapture(name.to_string()))
}

fn render_scalar(
    segment: &Segment,
    bindings: &MatchBinding,
    functions: &dyn FunctionResolver,
) -> Result<String, RenderError> {
    match segment {
        Segment::Literal(s) => Ok(s.clone()),
        Segment::Wildcard => Err(RenderError::UnboundCapture("*".to_string())),
        Segment::Glob => Err(RenderError::UnboundCapture("**".to_string())),
        Segment::Capture { name, .. } => Ok(lookup(name, bindings)?.join("/")),
        Segment::Function { name, args } => functions.invoke(name, args, bindings),
    }
}
