//! Fieldcalc API Server binary
//!
//! HTTP REST API for the formula engine.
//! Provides evaluate, validate and dependencies endpoints.

use std::path::PathBuf;

use clap::Parser;
use fieldcalc::api::{run_api_server, server::ApiConfig};
use fieldcalc::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "fieldcalc-server")]
#[command(version)]
#[command(about = "Fieldcalc API Server - HTTP REST API for computed field formulas")]
#[command(long_about = r#"
Fieldcalc API Server - HTTP REST API

Provides RESTful endpoints for the formula engine:
  - POST /api/v1/evaluate      - Evaluate a formula against field values
  - POST /api/v1/validate      - Validate a formula before saving it
  - POST /api/v1/dependencies  - List the fields a formula references

Additional endpoints:
  - GET  /health               - Health check
  - GET  /version              - Server version info
  - GET  /                     - API documentation

Features:
  - CORS enabled for cross-origin requests
  - Graceful shutdown on SIGINT/SIGTERM
  - JSON response format with request IDs
  - Tracing and structured logging (RUST_LOG)

Example usage:
  fieldcalc-server                           # Start on localhost:8080
  fieldcalc-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/evaluate \
    -H "Content-Type: application/json" \
    -d '{"expression": "MATH.round({{Value}} / 3)", "fieldValues": {"Value": 10}}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "FIELDCALC_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "FIELDCALC_PORT")]
    port: u16,

    /// Engine configuration file (YAML)
    #[arg(short, long, env = "FIELDCALC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let engine = match args.config {
        Some(path) => EngineConfig::from_yaml_file(&path)?,
        None => EngineConfig::default(),
    };

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        engine,
    };

    run_api_server(config).await
}
