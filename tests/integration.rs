//! Integration tests for the gateway rewrite engine.

use gateway_rewrite::config::RuleSetDef;
use gateway_rewrite::dispatch::DispatchError;
use gateway_rewrite::{
    Direction, DirectionOverrides, EngineStats, ExchangeError, RequestInfo, ResponseInfo,
    RewriteConfig, RewriteEngine, RuleCatalog,
};
use std::sync::Arc;

const CONFIG: &str = r#"
version: "1"
defaults:
  request.url: default
  request.headers: default
  request.body: default
  response.headers: default
  response.body: default
variables:
  gateway.url: "https://gw:8443/gateway"
rule_sets:
  - name: default
    rules:
      - name: test-rule-1
        steps:
          - or:
              - match: "{scheme}://{host}:{port}/test-input-path"
              - match: "{scheme}://{host}:{port}/test-input-path-1"
          - rewrite: "{scheme}://{host}:{port}/test-output-path-1"
      - name: webhdfs-inbound
        steps:
          - match: "{scheme}://{host}:{port}/gateway/webhdfs/{path=**}?{**}"
          - rewrite: "{$serviceUrl[WEBHDFS]}/{path=**}?{**}"
      - name: webhdfs-outbound
        steps:
          - match: "{scheme}://{host}:50070/webhdfs/{path=**}?{**}"
          - rewrite: "{$var[gateway.url]}/webhdfs/{path=**}?{**}"
  - name: test-filter-2
    rules:
      - name: test-rule-2
        steps:
          - match: "{scheme}://{host}:{port}/test-input-path-1"
          - rewrite: "{scheme}://{host}:{port}/test-output-path-2"
services:
  - role: WEBHDFS
    url: "http://namenode:50070/webhdfs"
"#;

fn engine() -> RewriteEngine {
    RewriteEngine::from_yaml(CONFIG).unwrap()
}

fn no_overrides() -> DirectionOverrides {
    DirectionOverrides::new()
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_parse_minimal_config() {
    let engine = RewriteEngine::from_yaml("version: \"1\"\n").unwrap();
    let snapshot = engine.snapshot();
    assert!(snapshot.catalog().is_empty());

    // Every direction falls back to pass-through
    let out = engine
        .rewrite_value(Direction::RequestUrl, &no_overrides(), "http://mock-host:1/test-input-path")
        .unwrap();
    assert!(out.is_none());
}

#[test]
fn test_load_json_config_file() {
    let config: RewriteConfig = serde_yaml::from_str(CONFIG).unwrap();
    let path = std::env::temp_dir().join(format!("gateway-rewrite-{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

    let engine = RewriteEngine::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(engine.snapshot().config(), &config);
}

#[test]
fn test_rejects_dangling_call() {
    let yaml = r#"
rule_sets:
  - name: default
    rules:
      - name: r
        steps:
          - call: nowhere
"#;
    assert!(RewriteEngine::from_yaml(yaml).is_err());
}

#[test]
fn test_catalog_round_trip() {
    let engine = engine();
    let snapshot = engine.snapshot();
    let defs = snapshot.catalog().to_defs();

    let yaml = serde_yaml::to_string(&defs).unwrap();
    let reparsed: Vec<RuleSetDef> = serde_yaml::from_str(&yaml).unwrap();
    let recompiled = RuleCatalog::compile(&reparsed).unwrap();

    assert_eq!(recompiled.to_defs(), defs);
    assert_eq!(defs.len(), 2);
    assert_eq!(defs[0].name, "default");
    assert_eq!(defs[1].name, "test-filter-2");
}

// =============================================================================
// URL and Header Tests
// =============================================================================

#[test]
fn test_request_path_rewrite() {
    let engine = engine();
    let request = RequestInfo::new("GET", "http://mock-host:1/test-input-path");
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(out.url, "http://mock-host:1/test-output-path-1");
}

#[test]
fn test_request_url_to_service() {
    let engine = engine();
    let request = RequestInfo::new("GET", "https://gw:8443/gateway/webhdfs/v1/tmp?op=LISTSTATUS");
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(out.url, "http://namenode:50070/webhdfs/v1/tmp?op=LISTSTATUS");
}

#[test]
fn test_unmatched_url_passes_through() {
    let engine = engine();
    let request = RequestInfo::new("GET", "http://mock-host:1/elsewhere");
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(out.url, "http://mock-host:1/elsewhere");
    assert_eq!(engine.stats().requests_rewritten, 0);
}

#[test]
fn test_request_headers_rewrite() {
    let engine = engine();
    let request = RequestInfo::new("GET", "http://mock-host:1/x")
        .with_header("Host", "mock-host:1")
        .with_header("Content-Location", "http://mock-host:1/test-input-path");
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(out.header("host"), Some("mock-host:1"));
    assert_eq!(
        out.header("content-location"),
        Some("http://mock-host:1/test-output-path-1")
    );
}

#[test]
fn test_response_location_rewrite() {
    let engine = engine();
    let request = RequestInfo::new("PUT", "https://gw:8443/gateway/webhdfs/v1/tmp?op=CREATE");
    let response = ResponseInfo::new(307)
        .with_header("Location", "http://namenode:50070/webhdfs/v1/tmp?op=CREATE")
        .with_header("X-Request-Id", "http://namenode:50070/webhdfs/v1/tmp?op=CREATE");
    let out = engine
        .rewrite_response(&request, &response, &no_overrides())
        .unwrap();
    assert_eq!(out.status, 307);
    assert_eq!(
        out.header("location"),
        Some("https://gw:8443/gateway/webhdfs/v1/tmp?op=CREATE")
    );
    assert_eq!(
        out.header("x-request-id"),
        Some("http://namenode:50070/webhdfs/v1/tmp?op=CREATE")
    );
}

#[test]
fn test_request_location_header_rewrite() {
    let engine = engine();
    let request = RequestInfo::new("GET", "http://mock-host:1/x")
        .with_header("Location", "http://mock-host:1/test-input-path");
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(out.header("location"), Some("http://mock-host:1/test-output-path-1"));
}

#[test]
fn test_request_headers_override() {
    let engine = engine();
    let overrides =
        DirectionOverrides::from_params([("request.headers", "test-filter-2")]).unwrap();
    let request = RequestInfo::new("GET", "http://mock-host:1/test-input-path-1")
        .with_header("Location", "http://mock-host:1/test-input-path-1");
    let out = engine.rewrite_request(&request, &overrides).unwrap();

    // The header uses the override, the URL keeps the default
    assert_eq!(out.header("location"), Some("http://mock-host:1/test-output-path-2"));
    assert_eq!(out.url, "http://mock-host:1/test-output-path-1");
}

#[test]
fn test_response_headers_override() {
    let engine = engine();
    let overrides =
        DirectionOverrides::from_params([("response.headers", "test-filter-2")]).unwrap();
    let request = RequestInfo::new("GET", "http://mock-host:1/x");
    let response = ResponseInfo::new(302)
        .with_header("Location", "http://mock-host:1/test-input-path-1");
    let out = engine
        .rewrite_response(&request, &response, &overrides)
        .unwrap();
    assert_eq!(out.header("location"), Some("http://mock-host:1/test-output-path-2"));

    // The default set would have produced output path 1
    let out = engine
        .rewrite_response(&request, &response, &no_overrides())
        .unwrap();
    assert_eq!(out.header("location"), Some("http://mock-host:1/test-output-path-1"));
}

#[test]
fn test_url_override_names_a_rule() {
    let engine = engine();
    let overrides = DirectionOverrides::from_params([("request.url", "test-rule-2")]).unwrap();
    let request = RequestInfo::new("GET", "http://mock-host:1/test-input-path-1");
    let out = engine.rewrite_request(&request, &overrides).unwrap();
    assert_eq!(out.url, "http://mock-host:1/test-output-path-2");

    // Only the named rule applies; other default rules are not consulted
    let request = RequestInfo::new("GET", "http://mock-host:1/test-input-path");
    let out = engine.rewrite_request(&request, &overrides).unwrap();
    assert_eq!(out.url, "http://mock-host:1/test-input-path");
}

// =============================================================================
// Body Tests
// =============================================================================

#[test]
fn test_json_body_default_rule_set() {
    let engine = engine();
    let request = RequestInfo::new("POST", "http://mock-host:1/x")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"url": "http://mock-host:1/test-input-path-1", "name": "John Doe"}"#);
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(
        out.body.as_deref(),
        Some(&br#"{"url": "http://mock-host:1/test-output-path-1", "name": "John Doe"}"#[..])
    );
}

#[test]
fn test_json_body_override() {
    let engine = engine();
    let overrides = DirectionOverrides::from_params([("request.body", "test-filter-2")]).unwrap();
    let request = RequestInfo::new("POST", "http://mock-host:1/test-input-path")
        .with_header("Content-Type", "application/json; charset=UTF-8")
        .with_body(r#"{"url": "http://mock-host:1/test-input-path-1"}"#);
    let out = engine.rewrite_request(&request, &overrides).unwrap();

    // The body uses the override, the URL keeps the default
    assert_eq!(
        out.body.as_deref(),
        Some(&br#"{"url": "http://mock-host:1/test-output-path-2"}"#[..])
    );
    assert_eq!(out.url, "http://mock-host:1/test-output-path-1");
}

#[test]
fn test_xml_response_body() {
    let engine = engine();
    let request = RequestInfo::new("GET", "https://gw:8443/gateway/webhdfs/v1/tmp?op=LISTSTATUS");
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<listing>
  <link href="http://namenode:50070/webhdfs/v1/tmp/a?op=OPEN"/>
  <name>John Doe</name>
</listing>"#;
    let response = ResponseInfo::new(200)
        .with_header("Content-Type", "application/xml")
        .with_body(body);
    let out = engine
        .rewrite_response(&request, &response, &no_overrides())
        .unwrap();
    let expected = r#"<?xml version="1.0" encoding="UTF-8"?>
<listing>
  <link href="https://gw:8443/gateway/webhdfs/v1/tmp/a?op=OPEN"/>
  <name>John Doe</name>
</listing>"#;
    assert_eq!(out.body.as_deref(), Some(expected.as_bytes()));
}

#[test]
fn test_html_response_body() {
    let engine = engine();
    let request = RequestInfo::new("GET", "http://mock-host:1/page");
    let body = concat!(
        "<html><body>",
        "<a href=\"http://mock-host:1/test-input-path\">John Doe</a>",
        "<script>var u = \"http://mock-host:1/test-input-path\";</script>",
        "</body></html>"
    );
    let response = ResponseInfo::new(200)
        .with_header("Content-Type", "application/html")
        .with_body(body);
    let out = engine
        .rewrite_response(&request, &response, &no_overrides())
        .unwrap();
    let expected = concat!(
        "<html><body>",
        "<a href=\"http://mock-host:1/test-output-path-1\">John Doe</a>",
        "<script>var u = \"http://mock-host:1/test-input-path\";</script>",
        "</body></html>"
    );
    assert_eq!(out.body.as_deref(), Some(expected.as_bytes()));
}

#[test]
fn test_form_request_body() {
    let engine = engine();
    let request = RequestInfo::new("POST", "http://mock-host:1/submit")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("name=John+Doe&url=http%3A%2F%2Fmock-host%3A1%2Ftest-input-path");
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(
        out.body.as_deref(),
        Some(&b"name=John+Doe&url=http%3A%2F%2Fmock-host%3A1%2Ftest-output-path-1"[..])
    );
}

#[test]
fn test_unclaimed_content_type_passes_through() {
    let engine = engine();
    let body = b"see http://mock-host:1/test-input-path".to_vec();
    let request = RequestInfo::new("POST", "http://mock-host:1/x")
        .with_header("Content-Type", "text/plain")
        .with_body(body.clone());
    let out = engine.rewrite_request(&request, &no_overrides()).unwrap();
    assert_eq!(out.body, Some(body));
}

#[test]
fn test_non_url_values_preserved() {
    let engine = engine();
    let body = r#"{
  "name": "John Doe",
  "ratio": 1.50e3,
  "tags": ["a", "b"],
  "empty": "",
  "note": "not a url: 100%"
}"#;
    let out = engine
        .rewrite_body(
            Direction::ResponseBody,
            &no_overrides(),
            Some("application/json"),
            body.as_bytes(),
        )
        .unwrap();
    assert!(out.is_none());
}

#[test]
fn test_malformed_body_fails_exchange() {
    let engine = engine();
    let request = RequestInfo::new("POST", "http://mock-host:1/x")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"url": "#);
    let err = engine.rewrite_request(&request, &no_overrides()).unwrap_err();
    assert!(matches!(err, ExchangeError::Transform(_)));
    assert_eq!(err.status_code(), 500);
}

// =============================================================================
// Direction Dispatch Tests
// =============================================================================

#[test]
fn test_invalid_override_fails_closed() {
    let engine = engine();
    let overrides = DirectionOverrides::from_params([("request.body", "test-filter-3")]).unwrap();
    let request = RequestInfo::new("POST", "http://mock-host:1/test-input-path")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"url": "http://mock-host:1/test-input-path"}"#);

    let err = engine.rewrite_request(&request, &overrides).unwrap_err();
    assert_eq!(err.status_code(), 500);
    assert!(matches!(
        err,
        ExchangeError::Dispatch(DispatchError::UnknownRule { direction: Direction::RequestBody, ref name })
            if name == "test-filter-3"
    ));
    assert_eq!(
        engine.stats(),
        EngineStats {
            requests_total: 1,
            requests_rewritten: 0,
            rewrite_errors: 1,
        }
    );
}

#[test]
fn test_directions_are_independent() {
    let engine = engine();
    let overrides = no_overrides().with(Direction::ResponseBody, "test-filter-2");
    let body = r#"["http://mock-host:1/test-input-path-1"]"#.as_bytes();

    let request_body = engine
        .rewrite_body(Direction::RequestBody, &overrides, Some("application/json"), body)
        .unwrap()
        .unwrap();
    let response_body = engine
        .rewrite_body(Direction::ResponseBody, &overrides, Some("application/json"), body)
        .unwrap()
        .unwrap();

    assert_eq!(request_body, br#"["http://mock-host:1/test-output-path-1"]"#);
    assert_eq!(response_body, br#"["http://mock-host:1/test-output-path-2"]"#);
}

#[test]
fn test_unknown_direction_key() {
    assert!(DirectionOverrides::from_params([("request.cookies", "default")]).is_err());
}

#[test]
fn test_service_route_overrides() {
    let yaml = format!(
        r#"{}
  - role: SPECIAL
    routes:
      - pattern: "{{scheme}}://{{host}}:{{port}}/special/**"
        overrides:
          request.body: test-filter-2
"#,
        CONFIG.trim_end()
    );
    let engine = RewriteEngine::from_yaml(&yaml).unwrap();
    let body = r#"{"url": "http://mock-host:1/test-input-path-1"}"#;

    let routed = RequestInfo::new("POST", "http://mock-host:1/special/upload")
        .with_header("Content-Type", "application/json")
        .with_body(body);
    let out = engine.rewrite_request(&routed, &no_overrides()).unwrap();
    assert_eq!(
        out.body.as_deref(),
        Some(&br#"{"url": "http://mock-host:1/test-output-path-2"}"#[..])
    );

    // An explicit override beats the route
    let explicit = no_overrides().with(Direction::RequestBody, "default");
    let out = engine.rewrite_request(&routed, &explicit).unwrap();
    assert_eq!(
        out.body.as_deref(),
        Some(&br#"{"url": "http://mock-host:1/test-output-path-1"}"#[..])
    );

    // Unrouted requests keep the default
    let plain = RequestInfo::new("POST", "http://mock-host:1/plain")
        .with_header("Content-Type", "application/json")
        .with_body(body);
    let out = engine.rewrite_request(&plain, &no_overrides()).unwrap();
    assert_eq!(
        out.body.as_deref(),
        Some(&br#"{"url": "http://mock-host:1/test-output-path-1"}"#[..])
    );
}

// =============================================================================
// Reload Tests
// =============================================================================

#[test]
fn test_reload_switches_rules() {
    let engine = engine();
    let next: RewriteConfig =
        serde_yaml::from_str(&CONFIG.replace("test-output-path-1", "test-output-path-9")).unwrap();
    engine.reload(next).unwrap();

    let out = engine
        .rewrite_value(Direction::RequestUrl, &no_overrides(), "http://mock-host:1/test-input-path")
        .unwrap();
    assert_eq!(out.as_deref(), Some("http://mock-host:1/test-output-path-9"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reload_is_consistent() {
    let engine = Arc::new(engine());
    let first: RewriteConfig = serde_yaml::from_str(CONFIG).unwrap();
    let second: RewriteConfig =
        serde_yaml::from_str(&CONFIG.replace("test-output-path-1", "test-output-path-9")).unwrap();

    let mut readers = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let request = RequestInfo::new("GET", "http://mock-host:1/test-input-path")
                    .with_header("Content-Location", "http://mock-host:1/test-input-path");
                let out = engine.rewrite_request(&request, &DirectionOverrides::new()).unwrap();
                // URL and header come from the same snapshot
                assert_eq!(out.header("content-location"), Some(out.url.as_str()));
                assert!(
                    out.url == "http://mock-host:1/test-output-path-1"
                        || out.url == "http://mock-host:1/test-output-path-9",
                    "unexpected url {}",
                    out.url
                );
                tokio::task::yield_now().await;
            }
        }));
    }

    for i in 0..50 {
        let config = if i % 2 == 0 { second.clone() } else { first.clone() };
        engine.reload(config).unwrap();
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(engine.stats().rewrite_errors, 0);
    assert_eq!(engine.stats().requests_total, 800);
}
