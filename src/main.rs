//! Query gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     Client (mTLS)          ┌──────────────────────────────────────────────────────┐
//!     ───────────────────────┼─▶ net::listener ─▶ net::tls ─▶ server::worker         │
//!                            │                                   │ one record       │
//!                            │                                   ▼                  │
//!                            │  pipeline: authentication → authorization →          │
//!                            │            validation → rate_limit → audit →         │
//!                            │            execution → response_shaping              │
//!                            │                                   │                  │
//!                            │                                   ▼                  │
//!                            │                      store::registry ─▶ connector    │
//!     ◀──────────────────────┼── one envelope per record                            │
//!                            └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use query_gateway::config::{load_config, validate_config, ConfigError, GatewayConfig};
use query_gateway::lifecycle::startup;
use query_gateway::observability::logging;

#[derive(Parser)]
#[command(name = "query-gateway")]
#[command(about = "Zero-trust query gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn load(path: Option<&PathBuf>) -> Result<GatewayConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = GatewayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("query-gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!("configuration ok");
        return ExitCode::SUCCESS;
    }

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        rate_limit = config.rate_limit.enabled,
        "query-gateway starting"
    );

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
