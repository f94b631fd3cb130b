//! URL rewrite engine for a reverse-proxy gateway.
//!
//! The gateway fronts a set of backend services. This crate rewrites every
//! URL-bearing part of an exchange so that clients see one external
//! namespace while backends keep their own addresses:
//!
//! - URL templates with captures, globs and function calls
//! - Rule sets built from `match`, `rewrite`, `call`, `and` and `or` steps
//! - Independent rule set selection for each of the five directions
//! - Content handlers for JSON, XML, HTML and form bodies, and URL headers
//! - Atomic configuration reload
//!
//! ## Configuration Example
//!
//! ```yaml
//! defaults:
//!   request.url: default
//!   response.headers: default
//! rule_sets:
//!   - name: default
//!     rules:
//!       - name: "inbound"
//!         steps:
//!           - match: "{scheme}://{host}:{port}/gateway/webhdfs/{path=**}?{**}"
//!           - rewrite: "{$serviceUrl[WEBHDFS]}/{path=**}?{**}"
//! services:
//!   - role: WEBHDFS
//!     url: "http://namenode:50070/webhdfs"
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod rule;
pub mod service;
pub mod template;
pub mod transformer;

pub use config::{Direction, RewriteConfig};
pub use context::{RequestInfo, ResponseInfo, RewriteContext, RewrittenRequest, RewrittenResponse};
pub use dispatch::{DirectionDispatcher, DirectionOverrides, DispatchError};
pub use engine::{EngineStats, ExchangeError, RewriteEngine, RewriteEngineError, Snapshot};
pub use rule::{
    Evaluation, EvaluationError, Evaluator, FunctionError, FunctionRegistry, RewriteFunction,
    Rule, RuleCatalog, RuleError, RuleSet, Step,
};
pub use template::{MatchBinding, TemplateError, UrlTemplate};
pub use transformer::{ContentHandler, ContentHandlers, TransformError};
