//! Configuration types for the rewrite engine.
//!
//! This is the persisted form of the rule model. It is loaded from YAML or
//! JSON, compiled into a [`RuleCatalog`](crate::rule::RuleCatalog), and can be
//! regenerated from a compiled catalog without loss.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Main configuration for the rewrite engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Configuration version
    pub version: String,
    /// Global settings
    pub settings: Settings,
    /// Rule set used per direction when no override is supplied
    pub defaults: BTreeMap<Direction, String>,
    /// Named rule sets
    pub rule_sets: Vec<RuleSetDef>,
    /// Values for the `var` function
    pub variables: BTreeMap<String, String>,
    /// Backend service bindings
    pub services: Vec<ServiceDef>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: Settings::default(),
            defaults: BTreeMap::new(),
            rule_sets: vec![],
            variables: BTreeMap::new(),
            services: vec![],
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Largest body the content handlers will buffer (bytes)
    pub max_body_size: usize,
    /// Headers whose whole value is rewritten as a URL
    pub url_headers: Vec<String>,
    /// HTML attributes that carry URLs
    pub html_attributes: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
            url_headers: vec!["Location".to_string(), "Content-Location".to_string()],
            html_attributes: [
                "href",
                "src",
                "action",
                "formaction",
                "cite",
                "background",
                "poster",
                "codebase",
                "longdesc",
                "manifest",
                "data",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Point in the exchange where rewriting applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "request.url")]
    RequestUrl,
    #[serde(rename = "request.headers")]
    RequestHeaders,
    #[serde(rename = "request.body")]
    RequestBody,
    #[serde(rename = "response.headers")]
    ResponseHeaders,
    #[serde(rename = "response.body")]
    ResponseBody,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::RequestUrl,
        Direction::RequestHeaders,
        Direction::RequestBody,
        Direction::ResponseHeaders,
        Direction::ResponseBody,
    ];

    /// Settings key for this direction (`request.url`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Direction::RequestUrl => "request.url",
            Direction::RequestHeaders => "request.headers",
            Direction::RequestBody => "request.body",
            Direction::ResponseHeaders => "response.headers",
            Direction::ResponseBody => "response.body",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.key() == s)
            .ok_or_else(|| UnknownDirection(s.to_string()))
    }
}

/// A string that names none of the five directions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction '{0}' (expected request.url, request.headers, request.body, response.headers or response.body)")]
pub struct UnknownDirection(pub String);

/// A named rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDef {
    /// Rule set name (unique across the document)
    pub name: String,
    /// Other rule sets whose rules may be called from this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    /// Rules, tried in order
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// A named rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    /// Rule name (unique within its rule set)
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Steps, evaluated in order. Written as single-key maps
    /// (`- match: "..."`) in YAML rather than `!match` tags.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<StepDef>,
}

/// One unit of rule logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDef {
    /// Match the current value against a URL pattern
    Match(String),
    /// Render a template as the new value
    Rewrite(String),
    /// Evaluate another rule by name
    Call(String),
    /// All children must succeed, in order
    And(Vec<StepDef>),
    /// First child to succeed wins
    Or(Vec<StepDef>),
}

/// A backend service binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    /// Service role (e.g. `WEBHDFS`)
    pub role: String,
    /// Backend base URL, used by the `service*` functions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inbound URL patterns and the rule sets they select
    #[serde(default)]
    pub routes: Vec<RouteDef>,
    /// Rule sets contributed by this service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_sets: Vec<RuleSetDef>,
}

/// Inbound URL pattern with per-direction rule set selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDef {
    /// URL pattern matched against the inbound request URL
    pub pattern: String,
    /// Rule set per direction for requests on this route
    #[serde(default)]
    pub overrides: BTreeMap<Direction, String>,
}
