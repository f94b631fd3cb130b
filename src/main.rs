//! Gateway rewrite CLI entry point.
//!
//! Validates rule documents and rewrites a single URL or a body read from
//! stdin, for trying rules out before deploying them.

use anyhow::{Context, Result};
use clap::Parser;
use gateway_rewrite::engine::load_config;
use gateway_rewrite::{Direction, DirectionOverrides, RewriteEngine};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gateway-rewrite")]
#[command(
    author,
    version,
    about = "URL rewrite engine for a reverse-proxy gateway"
)]
struct Args {
    /// Rule document path (YAML, or JSON with a .json extension)
    #[arg(short, long, env = "GATEWAY_REWRITE_CONFIG")]
    config: Option<PathBuf>,

    /// Direction to rewrite for (request.url, request.headers, request.body,
    /// response.headers, response.body)
    #[arg(short, long, default_value = "request.url")]
    direction: String,

    /// Rule set override as direction=name (repeatable)
    #[arg(long = "override", value_parser = parse_override)]
    overrides: Vec<(String, String)>,

    /// Content type of the body read from stdin
    #[arg(long)]
    content_type: Option<String>,

    /// Rewrite this URL instead of reading a body from stdin
    #[arg(long)]
    url: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and exit.
    #[arg(long)]
    validate: bool,
}

fn parse_override(s: &str) -> Result<(String, String), String> {
    let (key, name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected direction=rule-set, got '{}'", s))?;
    Ok((key.trim().to_string(), name.trim().to_string()))
}

fn print_example_config() {
    let example = r#"# Gateway Rewrite Configuration Example
version: "1"

settings:
  # Largest body buffered for rewriting (bytes); larger bodies pass through
  max_body_size: 10485760  # 10MB
  # Headers whose whole value is a URL
  url_headers: ["Location", "Content-Location"]

# Rule set per direction when no override is given.
# Directions without an entry pass everything through.
defaults:
  request.url: default
  request.headers: default
  request.body: default
  response.headers: default
  response.body: default

rule_sets:
  - name: default
    rules:
      - name: "inbound"
        description: "Gateway URL to backend URL"
        steps:
          - match: "{scheme}://{host}:{port}/gateway/webhdfs/{path=**}?{**}"
          - rewrite: "{$serviceUrl[WEBHDFS]}/{path=**}?{**}"

      - name: "outbound"
        description: "Backend URL back to gateway URL"
        steps:
          - or:
              - match: "{scheme}://{host}:50070/webhdfs/{path=**}?{**}"
              - match: "{scheme}://{host}:50075/webhdfs/{path=**}?{**}"
          - rewrite: "{$var[gateway.url]}/webhdfs/{path=**}?{**}"

variables:
  gateway.url: "https://gateway.example.com:8443/gateway"

services:
  - role: WEBHDFS
    url: "http://namenode:50070/webhdfs"
    routes:
      - pattern: "{scheme}://{host}:{port}/gateway/webhdfs/**"
        overrides:
          response.body: default
"#;
    println!("{}", example);
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout carries rewritten output
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Print example config if requested
    if args.example_config {
        print_example_config();
        return Ok(());
    }

    let config_path = args
        .config
        .as_ref()
        .context("--config is required (see --example-config)")?;
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config file: {}", config_path.display()))?;

    let overrides = DirectionOverrides::from_params(args.overrides.iter().cloned())?;
    let direction: Direction = args.direction.parse()?;

    let engine = RewriteEngine::new(config)?;

    // Validate only if requested
    if args.validate {
        engine
            .snapshot()
            .dispatcher()
            .resolve_all(&Direction::ALL, &overrides)?;
        info!(config = %config_path.display(), "Configuration is valid");
        return Ok(());
    }

    if let Some(url) = &args.url {
        let rewritten = engine.rewrite_value(direction, &overrides, url)?;
        debug!(direction = %direction, matched = rewritten.is_some(), "URL processed");
        println!("{}", rewritten.as_deref().unwrap_or(url));
        return Ok(());
    }

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .context("Failed to read body from stdin")?;
    let rewritten = engine.rewrite_body(direction, &overrides, args.content_type.as_deref(), &body)?;
    debug!(direction = %direction, changed = rewritten.is_some(), "Body processed");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rewritten.as_deref().unwrap_or(&body))?;
    stdout.flush()?;

    Ok(())
}
