//! Rewrite engine: the compiled configuration and the exchange pipeline.

use crate::config::{Direction, RewriteConfig};
use crate::context::{
    RequestInfo, ResponseInfo, RewriteContext, RewrittenRequest, RewrittenResponse,
};
use crate::dispatch::{DirectionDispatcher, DirectionOverrides, DispatchError};
use crate::rule::{EvaluationError, Evaluator, FunctionRegistry, RuleCatalog, RuleError};
use crate::service::ServiceBindings;
use crate::transformer::{ContentHandlers, HeaderRewriter, TransformError, UrlRewriter};
use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One complete, immutable configuration. Exchanges hold an `Arc` to the
/// snapshot they started with, so a reload never changes rules mid-exchange.
pub struct Snapshot {
    config: RewriteConfig,
    catalog: RuleCatalog,
    functions: FunctionRegistry,
    services: ServiceBindings,
    handlers: ContentHandlers,
    headers: HeaderRewriter,
}

impl Snapshot {
    fn compile(config: RewriteConfig, custom: &FunctionRegistry) -> Result<Self, RuleError> {
        let service_sets = config.services.iter().flat_map(|s| &s.rule_sets);
        let catalog = RuleCatalog::compile(config.rule_sets.iter().chain(service_sets))?;

        for (direction, name) in &config.defaults {
            if !catalog.contains(name) {
                return Err(RuleError::UnknownRuleSet {
                    referenced_by: format!("default for {}", direction),
                    name: name.clone(),
                });
            }
        }

        let services = ServiceBindings::compile(&config.services, &catalog)?;
        let mut functions =
            FunctionRegistry::builtins(config.variables.clone(), services.directory().clone());
        functions.extend(custom);

        Ok(Self {
            handlers: ContentHandlers::new(&config.settings),
            headers: HeaderRewriter::new(&config.settings.url_headers),
            config,
            catalog,
            functions,
            services,
        })
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn services(&self) -> &ServiceBindings {
        &self.services
    }

    pub fn content_handlers(&self) -> &ContentHandlers {
        &self.handlers
    }

    pub fn dispatcher(&self) -> DirectionDispatcher<'_> {
        DirectionDispatcher::new(&self.catalog, &self.config.defaults)
    }

    /// Explicit overrides, with the matching service route filling the
    /// directions they leave unset.
    pub fn effective_overrides(
        &self,
        request_url: &str,
        explicit: &DirectionOverrides,
    ) -> DirectionOverrides {
        match self.services.route_for(request_url) {
            Some(route) => {
                debug!(role = %route.role, url = %request_url, "Service route selected");
                explicit.or(&route.overrides)
            }
            None => explicit.clone(),
        }
    }

    fn context(
        &self,
        direction: Direction,
        overrides: &DirectionOverrides,
    ) -> Result<RewriteContext<'_>, DispatchError> {
        let set = self
            .dispatcher()
            .resolve_rule_set(direction, overrides.get(direction))?;
        Ok(RewriteContext::new(
            direction,
            set,
            Evaluator::new(&self.catalog, &self.functions),
        ))
    }

    /// Bodies over `max_body_size` are not buffered for rewriting.
    fn rewrite_body(
        &self,
        ctx: &RewriteContext<'_>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, TransformError> {
        let limit = self.config.settings.max_body_size;
        if body.len() > limit {
            warn!(
                direction = %ctx.direction(),
                size = body.len(),
                limit,
                "Body exceeds max_body_size, passed through"
            );
            return Ok(None);
        }
        self.handlers.rewrite_body(ctx, content_type, body)
    }
}

/// Counters since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub requests_total: u64,
    pub requests_rewritten: u64,
    pub rewrite_errors: u64,
}

/// URL rewrite engine.
///
/// Holds the active [`Snapshot`] behind an atomic pointer. Reads are
/// lock-free; [`reload`](Self::reload) compiles a new snapshot and swaps it
/// in only if compilation succeeds.
pub struct RewriteEngine {
    /// Active configuration
    snapshot: ArcSwap<Snapshot>,
    /// Functions registered by the embedder, applied on every reload
    custom_functions: FunctionRegistry,
    /// Metrics: total exchanges processed (request and response halves)
    requests_total: AtomicU64,
    /// Metrics: exchanges in which at least one value was rewritten
    requests_rewritten: AtomicU64,
    /// Metrics: exchanges that failed
    rewrite_errors: AtomicU64,
}

impl RewriteEngine {
    /// Create a new rewrite engine from configuration.
    pub fn new(config: RewriteConfig) -> Result<Self, RewriteEngineError> {
        Self::with_functions(config, FunctionRegistry::new())
    }

    /// Create an engine with additional rewrite functions. They override
    /// built-ins of the same name.
    pub fn with_functions(
        config: RewriteConfig,
        functions: FunctionRegistry,
    ) -> Result<Self, RewriteEngineError> {
        let snapshot = Snapshot::compile(config, &functions)?;

        info!(
            rule_sets = snapshot.catalog.len(),
            services = snapshot.config.services.len(),
            functions = snapshot.functions.len(),
            "Rewrite engine initialized"
        );

        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            custom_functions: functions,
            requests_total: AtomicU64::new(0),
            requests_rewritten: AtomicU64::new(0),
            rewrite_errors: AtomicU64::new(0),
        })
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RewriteEngineError> {
        Self::new(serde_yaml::from_str(yaml)?)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, RewriteEngineError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Create from a file; `.json` files are JSON, anything else YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RewriteEngineError> {
        Self::new(load_config(path.as_ref())?)
    }

    /// Replace the active configuration. On error the previous snapshot
    /// stays active.
    pub fn reload(&self, config: RewriteConfig) -> Result<(), RewriteEngineError> {
        match Snapshot::compile(config, &self.custom_functions) {
            Ok(snapshot) => {
                info!(
                    rule_sets = snapshot.catalog.len(),
                    version = %snapshot.config.version,
                    "Configuration reloaded"
                );
                self.snapshot.store(Arc::new(snapshot));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Reload rejected, keeping previous configuration");
                Err(e.into())
            }
        }
    }

    /// The active snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_rewritten: self.requests_rewritten.load(Ordering::Relaxed),
            rewrite_errors: self.rewrite_errors.load(Ordering::Relaxed),
        }
    }

    /// Rewrite the request half of an exchange: URL, then headers, then
    /// body. All three rule sets are resolved first, so a bad override
    /// fails the exchange before anything is rewritten.
    pub fn rewrite_request(
        &self,
        request: &RequestInfo,
        overrides: &DirectionOverrides,
    ) -> Result<RewrittenRequest, ExchangeError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot.load_full();
        let result = Self::process_request(&snapshot, request, overrides);
        self.record(result, &request.url)
    }

    fn process_request(
        snapshot: &Snapshot,
        request: &RequestInfo,
        overrides: &DirectionOverrides,
    ) -> Result<(RewrittenRequest, bool), ExchangeError> {
        let overrides = snapshot.effective_overrides(&request.url, overrides);
        let url_ctx = snapshot.context(Direction::RequestUrl, &overrides)?;
        let headers_ctx = snapshot.context(Direction::RequestHeaders, &overrides)?;
        let body_ctx = snapshot.context(Direction::RequestBody, &overrides)?;

        let url = UrlRewriter::new().rewrite_url(&url_ctx, &request.url)?;
        let headers = snapshot
            .headers
            .rewrite_headers(&headers_ctx, &request.headers)?;
        let body = match request.body {
            Some(ref body) => Some(
                snapshot
                    .rewrite_body(&body_ctx, request.content_type(), body)?
                    .unwrap_or_else(|| body.clone()),
            ),
            None => None,
        };

        let rewritten = url_ctx.rewrites() + headers_ctx.rewrites() + body_ctx.rewrites() > 0;
        Ok((RewrittenRequest { url, headers, body }, rewritten))
    }

    /// Rewrite the response half of an exchange. `request` is the inbound
    /// request, used for service route selection. The status is returned
    /// unchanged.
    pub fn rewrite_response(
        &self,
        request: &RequestInfo,
        response: &ResponseInfo,
        overrides: &DirectionOverrides,
    ) -> Result<RewrittenResponse, ExchangeError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.snapshot.load_full();
        let result = Self::process_response(&snapshot, request, response, overrides);
        self.record(result, &request.url)
    }

    fn process_response(
        snapshot: &Snapshot,
        request: &RequestInfo,
        response: &ResponseInfo,
        overrides: &DirectionOverrides,
    ) -> Result<(RewrittenResponse, bool), ExchangeError> {
        let overrides = snapshot.effective_overrides(&request.url, overrides);
        let headers_ctx = snapshot.context(Direction::ResponseHeaders, &overrides)?;
        let body_ctx = snapshot.context(Direction::ResponseBody, &overrides)?;

        let headers = snapshot
            .headers
            .rewrite_headers(&headers_ctx, &response.headers)?;
        let body = match response.body {
            Some(ref body) => Some(
                snapshot
                    .rewrite_body(&body_ctx, response.content_type(), body)?
                    .unwrap_or_else(|| body.clone()),
            ),
            None => None,
        };

        let rewritten = headers_ctx.rewrites() + body_ctx.rewrites() > 0;
        Ok((
            RewrittenResponse {
                status: response.status,
                headers,
                body,
            },
            rewritten,
        ))
    }

    /// Rewrite a single value for one direction.
    pub fn rewrite_value(
        &self,
        direction: Direction,
        overrides: &DirectionOverrides,
        value: &str,
    ) -> Result<Option<String>, ExchangeError> {
        let snapshot = self.snapshot.load_full();
        let ctx = snapshot.context(direction, overrides)?;
        Ok(ctx.rewrite_value(value)?)
    }

    /// Rewrite a body for one direction. `None` means pass-through.
    pub fn rewrite_body(
        &self,
        direction: Direction,
        overrides: &DirectionOverrides,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, ExchangeError> {
        let snapshot = self.snapshot.load_full();
        let ctx = snapshot.context(direction, overrides)?;
        Ok(snapshot.rewrite_body(&ctx, content_type, body)?)
    }

    fn record<T>(
        &self,
        result: Result<(T, bool), ExchangeError>,
        url: &str,
    ) -> Result<T, ExchangeError> {
        match result {
            Ok((value, rewritten)) => {
                if rewritten {
                    self.requests_rewritten.fetch_add(1, Ordering::Relaxed);
                }
                Ok(value)
            }
            Err(e) => {
                self.rewrite_errors.fetch_add(1, Ordering::Relaxed);
                warn!(url = %url, error = %e, status = e.status_code(), "Exchange failed");
                Err(e)
            }
        }
    }
}

/// Rewrite engine errors.
#[derive(Debug, thiserror::Error)]
pub enum RewriteEngineError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed exchange. The host should answer with
/// [`status_code`](Self::status_code) and forward nothing.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl ExchangeError {
    pub fn status_code(&self) -> u16 {
        500
    }
}

/// Load a configuration document; `.json` files are JSON, anything else YAML.
pub fn load_config(path: &Path) -> Result<RewriteConfig, RewriteEngineError> {
    let text = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::FunctionError;
    use crate::template::MatchBinding;

    const CONFIG: &str = r#"
version: "1"
defaults:
  request.url: default
  request.headers: default
  response.headers: default
rule_sets:
  - name: default
    rules:
      - name: test-rule-1
        steps:
          - match: "{scheme}://{host}:{port}/test-input-path"
          - rewrite: "{scheme}://{host}:{port}/test-output-path-1"
"#;

    #[test]
    fn test_engine_from_yaml() {
        let engine = RewriteEngine::from_yaml(CONFIG).unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.catalog().len(), 1);
        assert!(snapshot.functions().contains("serviceUrl"));
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn test_engine_from_json() {
        let json = r#"{"rule_sets": [{"name": "default", "rules": []}], "defaults": {"response.body": "default"}}"#;
        let engine = RewriteEngine::from_json(json).unwrap();
        assert!(engine.snapshot().catalog().contains("default"));
    }

    #[test]
    fn test_unknown_default_rejected() {
        let yaml = r#"
defaults:
  request.url: nope
"#;
        assert!(matches!(
            RewriteEngine::from_yaml(yaml),
            Err(RewriteEngineError::Rule(RuleError::UnknownRuleSet { .. }))
        ));
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let engine = RewriteEngine::from_yaml(CONFIG).unwrap();
        let mut bad: RewriteConfig = serde_yaml::from_str(CONFIG).unwrap();
        bad.rule_sets[0].rules[0].steps.push(crate::config::StepDef::Call("missing".to_string()));

        assert!(engine.reload(bad).is_err());
        let out = engine
            .rewrite_value(
                Direction::RequestUrl,
                &DirectionOverrides::new(),
                "http://mock-host:1/test-input-path",
            )
            .unwrap();
        assert_eq!(out.as_deref(), Some("http://mock-host:1/test-output-path-1"));
    }

    #[test]
    fn test_stats_count_exchanges() {
        let engine = RewriteEngine::from_yaml(CONFIG).unwrap();
        let request = RequestInfo::new("GET", "http://mock-host:1/test-input-path");
        engine
            .rewrite_request(&request, &DirectionOverrides::new())
            .unwrap();
        let other = RequestInfo::new("GET", "http://mock-host:1/unrelated");
        engine.rewrite_request(&other, &DirectionOverrides::new()).unwrap();
        let bad = DirectionOverrides::new().with(Direction::RequestBody, "missing");
        let err = engine.rewrite_request(&request, &bad).unwrap_err();
        assert_eq!(err.status_code(), 500);

        assert_eq!(
            engine.stats(),
            EngineStats {
                requests_total: 3,
                requests_rewritten: 1,
                rewrite_errors: 1,
            }
        );
    }

    #[test]
    fn test_oversized_body_passes_through() {
        let yaml = r#"
settings:
  max_body_size: 8
defaults:
  request.body: default
rule_sets:
  - name: default
    rules:
      - name: r
        steps:
          - match: "{scheme}://{host}:{port}/test-input-path"
          - rewrite: "{scheme}://{host}:{port}/test-output-path-1"
"#;
        let engine = RewriteEngine::from_yaml(yaml).unwrap();
        let body = br#"{"url":"http://mock-host:1/test-input-path"}"#;
        let request = RequestInfo::new("POST", "http://mock-host:1/x")
            .with_header("Content-Type", "application/json")
            .with_body(body.to_vec());
        let out = engine
            .rewrite_request(&request, &DirectionOverrides::new())
            .unwrap();
        assert_eq!(out.body.as_deref(), Some(&body[..]));
    }

    #[test]
    fn test_custom_function() {
        let yaml = r#"
defaults:
  request.url: default
rule_sets:
  - name: default
    rules:
      - name: tenant
        steps:
          - match: "/{rest=**}"
          - rewrite: "/{$tenant}/{rest=**}"
"#;
        let mut functions = FunctionRegistry::new();
        functions.register("tenant", |_: &[String], _: &MatchBinding| {
            Ok::<_, FunctionError>("acme".to_string())
        });
        let engine =
            RewriteEngine::with_functions(serde_yaml::from_str(yaml).unwrap(), functions).unwrap();
        let out = engine
            .rewrite_value(Direction::RequestUrl, &DirectionOverrides::new(), "/a/b")
            .unwrap();
        assert_eq!(out.as_deref(), Some("/acme/a/b"));

        // Custom functions survive a reload
        engine.reload(serde_yaml::from_str(yaml).unwrap()).unwrap();
        assert!(engine.snapshot().functions().contains("tenant"));
    }

    #[test]
    fn test_unknown_function_fails_exchange() {
        let yaml = r#"
defaults:
  request.url: default
rule_sets:
  - name: default
    rules:
      - name: r
        steps:
          - match: "/x"
          - rewrite: "/{$nope}"
"#;
        let engine = RewriteEngine::from_yaml(yaml).unwrap();
        let err = engine
            .rewrite_request(&RequestInfo::new("GET", "/x"), &DirectionOverrides::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Evaluation(EvaluationError::UnknownFunction { .. })
        ));
    }
}
