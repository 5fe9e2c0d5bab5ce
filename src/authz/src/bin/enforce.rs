//! # perm-enforce
//!
//! Evaluate one request against a model file and a CSV policy file.
//!
//! ```text
//! perm-enforce --model rbac_model.conf --policy rbac_policy.csv alice data1 read
//! ```
//!
//! Prints `true` or `false` and exits with status 0 on allow, 1 on deny.
//!
//! ## Configuration
//!
//! - `--config` / `PERM_CONFIG` - enforcer TOML configuration
//! - `RUST_LOG` - log level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use perm_authz::{Enforcer, EnforcerConfig, FileAdapter, Model, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "perm-enforce", version, about = "Evaluate an access request against a PERM model")]
struct Cli {
    /// Model definition file
    #[arg(short, long, env = "PERM_MODEL")]
    model: PathBuf,

    /// CSV policy file
    #[arg(short, long, env = "PERM_POLICY")]
    policy: PathBuf,

    /// Enforcer configuration (TOML)
    #[arg(short, long, env = "PERM_CONFIG")]
    config: Option<PathBuf>,

    /// Treat request values as JSON (attribute bags for ABAC models)
    #[arg(long)]
    json: bool,

    /// Request values, in `r` definition order
    #[arg(required = true)]
    request: Vec<String>,
}

fn parse_value(raw: &str, json: bool) -> Result<Value> {
    if !json {
        return Ok(Value::from(raw));
    }
    let parsed: serde_json::Value = serde_json::from_str(raw)
        .or_else(|_| serde_json::from_str(&format!("\"{}\"", raw.replace('"', "\\\""))))
        .with_context(|| format!("invalid JSON request value: {}", raw))?;
    Ok(Value::from(parsed))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("perm-enforce v{}", perm_authz::VERSION);

    let config = match &cli.config {
        Some(path) => EnforcerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EnforcerConfig::default(),
    };

    let model = Model::from_file(&cli.model)
        .with_context(|| format!("loading model {}", cli.model.display()))?;
    let enforcer = Enforcer::with_config(model, FileAdapter::new(&cli.policy), config)
        .await
        .with_context(|| format!("loading policy {}", cli.policy.display()))?;

    let request = cli
        .request
        .iter()
        .map(|raw| parse_value(raw, cli.json))
        .collect::<Result<Vec<_>>>()?;

    let allowed = enforcer.enforce(request)?;
    println!("{}", allowed);

    Ok(if allowed { ExitCode::SUCCESS } else { ExitCode::from(1) })
}
