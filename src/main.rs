//! auth-gate binary.
//!
//! ```text
//!   client ──▶ auth-gate ──subrequest──▶ auth backend
//!                 │  200/202                   │ anything else
//!                 ▼                            ▼
//!              upstream            backend response relayed to client
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use auth_gate::config::validation::validate_config;
use auth_gate::config::{read_config, ConfigError, GateConfig};
use auth_gate::lifecycle::startup;
use auth_gate::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "auth-gate", version)]
#[command(about = "Authorize every request against an auth backend before serving it", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Auth backend URL, e.g. http://127.0.0.1:2015
    #[arg(short, long)]
    backend: Option<String>,

    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<String>,

    /// Upstream URL for allowed requests
    #[arg(long)]
    upstream: Option<String>,
}

impl Cli {
    fn load(&self) -> Result<GateConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => GateConfig::default(),
        };
        if let Some(backend) = &self.backend {
            config.auth_request.backend = Some(backend.clone());
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.address = Some(upstream.clone());
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("auth-gate: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "auth-gate starting"
    );

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "auth-gate failed");
            ExitCode::FAILURE
        }
    }
}
