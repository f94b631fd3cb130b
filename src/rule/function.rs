//! Named functions callable from rewrite templates as `{$name[args]}`.

use crate::template::{FunctionResolver, MatchBinding, RenderError, Segment, UrlTemplate};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A pure function of its arguments and the current bindings.
pub trait RewriteFunction: Send + Sync {
    fn call(&self, args: &[String], bindings: &MatchBinding) -> Result<String, FunctionError>;
}

impl<F> RewriteFunction for F
where
    F: Fn(&[String], &MatchBinding) -> Result<String, FunctionError> + Send + Sync,
{
    fn call(&self, args: &[String], bindings: &MatchBinding) -> Result<String, FunctionError> {
        self(args, bindings)
    }
}

type FnResult = Result<String, FunctionError>;

/// Errors a function can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionError {
    #[error("missing argument {0}")]
    MissingArgument(usize),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown service role '{0}'")]
    UnknownService(String),

    #[error("service '{0}' has no {1}")]
    MissingComponent(String, &'static str),

    /// Treated like an unbound template capture: the rule does not match.
    #[error("no binding for capture '{0}'")]
    UnboundCapture(String),

    #[error("{0}")]
    Message(String),
}

/// Lookup table of rewrite functions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn RewriteFunction>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `var`, `encode` and `service*` functions.
    pub fn builtins(variables: BTreeMap<String, String>, services: ServiceDirectory) -> Self {
        let mut registry = Self::new();
        let variables = Arc::new(variables);
        let services = Arc::new(services);

        registry.register("var", move |args: &[String], _: &MatchBinding| -> FnResult {
            let name = arg(args, 0)?;
            variables
                .get(name)
                .cloned()
                .ok_or_else(|| FunctionError::UnknownVariable(name.to_string()))
        });

        registry.register("encode", |args: &[String], bindings: &MatchBinding| -> FnResult {
            let name = arg(args, 0)?;
            let values = bindings
                .get(name)
                .ok_or_else(|| FunctionError::UnboundCapture(name.to_string()))?;
            Ok(urlencoding::encode(&values.join("/")).into_owned())
        });

        let service_fns: [(&str, fn(&ServiceEndpoint) -> Option<String>); 6] = [
            ("serviceUrl", |e| Some(e.url.clone())),
            ("serviceScheme", |e| e.scheme.clone()),
            ("serviceHost", |e| e.host.clone()),
            ("servicePort", |e| e.port.clone()),
            ("serviceAddr", ServiceEndpoint::addr),
            ("servicePath", |e| Some(e.path.clone())),
        ];
        for (name, component) in service_fns {
            let services = Arc::clone(&services);
            registry.register(name, move |args: &[String], _: &MatchBinding| -> FnResult {
                let role = arg(args, 0)?;
                let endpoint = services
                    .get(role)
                    .ok_or_else(|| FunctionError::UnknownService(role.to_string()))?;
                component(endpoint)
                    .ok_or_else(|| FunctionError::MissingComponent(role.to_string(), name))
            });
        }

        registry
    }

    /// Register `function` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: RewriteFunction + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Copy every function of `other` into this registry; `other` wins on
    /// name clashes.
    pub fn extend(&mut self, other: &FunctionRegistry) {
        for (name, function) in &other.functions {
            self.functions.insert(name.clone(), Arc::clone(function));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RewriteFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FunctionResolver for FunctionRegistry {
    fn invoke(
        &self,
        name: &str,
        args: &[String],
        bindings: &MatchBinding,
    ) -> Result<String, RenderError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| RenderError::UnknownFunction(name.to_string()))?;
        function.call(args, bindings).map_err(|e| match e {
            FunctionError::UnboundCapture(capture) => RenderError::UnboundCapture(capture),
            other => RenderError::Function {
                name: name.to_string(),
                message: other.to_string(),
            },
        })
    }
}

fn arg(args: &[String], index: usize) -> Result<&str, FunctionError> {
    args.get(index)
        .map(String::as_str)
        .ok_or(FunctionError::MissingArgument(index))
}

/// Backend address of one service role, split into components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub url: String,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: String,
}

impl ServiceEndpoint {
    /// Split a backend URL. The port falls back to the scheme default.
    pub fn parse(url: &str) -> Option<Self> {
        let parsed = UrlTemplate::parse_literal(url).ok()?;
        let text = |s: Option<&Segment>| s.and_then(Segment::as_literal).map(str::to_string);
        let scheme = text(parsed.scheme());
        let port = text(parsed.port()).or_else(|| match scheme.as_deref() {
            Some("http") | Some("ws") => Some("80".to_string()),
            Some("https") | Some("wss") => Some("443".to_string()),
            _ => None,
        });
        let segments: Vec<&str> = parsed
            .path()
            .iter()
            .filter_map(Segment::as_literal)
            .collect();
        let mut path = segments.join("/");
        if parsed.is_absolute_path() {
            path.insert(0, '/');
        }
        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            scheme,
            host: text(parsed.host()),
            port,
            path,
        })
    }

    fn addr(&self) -> Option<String> {
        match (&self.host, &self.port) {
            (Some(host), Some(port)) => Some(format!("{}:{}", host, port)),
            (Some(host), None) => Some(host.clone()),
            _ => None,
        }
    }
}

/// Role name to backend endpoint.
#[derive(Debug, Clone, Default)]
pub struct ServiceDirectory {
    endpoints: HashMap<String, ServiceEndpoint>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role. Returns `false` if `url` is not a usable URL.
    pub fn insert(&mut self, role: impl Into<String>, url: &str) -> bool {
        match ServiceEndpoint::parse(url) {
            Some(endpoint) => {
                self.endpoints.insert(role.into(), endpoint);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, role: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.get(role)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
