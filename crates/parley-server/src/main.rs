//! Parley Server - HTTP API for persona-conditioned dialogue backends

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use parley_core::{
    parse_backend_kind, BackendConfig, LoadPolicy, PersonaStore, ResponderRegistry, ServiceConfig,
};
use state::AppState;

const DEFAULT_LOG_FILTER: &str = "parley_server=debug,parley_core=debug,tower_http=debug";

/// Serve dialogue backends over HTTP.
///
/// Values given here override the configuration file.
#[derive(Debug, Parser)]
#[command(name = "parley-server", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// JSON configuration file
    #[arg(short, long, value_name = "PATH", env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long, env = "PARLEY_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PARLEY_PORT")]
    port: Option<u16>,

    /// Persona facts, one per line
    #[arg(long, value_name = "PATH", env = "PARLEY_PERSONA_FILE")]
    persona_file: Option<PathBuf>,

    /// Canned replies for the `qc` backend, one per line
    #[arg(long, value_name = "PATH", env = "PARLEY_FALLBACK_FILE")]
    fallback_file: Option<PathBuf>,

    /// Tokenizer cache directory
    #[arg(short, long, value_name = "PATH", env = "PARLEY_MODELS_DIR")]
    models_dir: Option<PathBuf>,

    /// Maximum generated sequence length
    #[arg(long, env = "PARLEY_MAX_LENGTH")]
    max_length: Option<usize>,

    /// Serve only these backends (registered name, repository id or display name)
    #[arg(long = "backend", value_name = "ID", env = "PARLEY_BACKENDS", value_delimiter = ',')]
    backends: Vec<String>,

    /// Build backends on first use instead of at startup
    #[arg(long, env = "PARLEY_LAZY")]
    lazy: bool,

    /// Generation worker socket
    #[arg(long, value_name = "PATH", env = "PARLEY_WORKER_SOCKET")]
    worker_socket: Option<PathBuf>,

    /// Command that starts the generation worker
    /// [default: "python3 scripts/generation_worker.py"]
    #[arg(long, env = "PARLEY_WORKER_COMMAND")]
    worker_command: Option<String>,

    /// Log filter directives
    #[arg(long, env = "RUST_LOG", default_value = DEFAULT_LOG_FILTER)]
    log_filter: String,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {path:?}"))?,
            None => ServiceConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.persona_file {
            config.persona_file = path;
        }
        if let Some(path) = self.fallback_file {
            config.fallback_file = path;
        }
        if let Some(dir) = self.models_dir {
            config.models_dir = dir;
        }
        if let Some(max_length) = self.max_length {
            config.max_length = max_length;
        }
        if !self.backends.is_empty() {
            config.backends = self
                .backends
                .iter()
                .map(|id| parse_backend_kind(id).map(BackendConfig::for_kind))
                .collect::<Result<Vec<_>, _>>()?;
        }
        if self.lazy {
            config.load_policy = LoadPolicy::Lazy;
        }
        if let Some(socket) = self.worker_socket {
            config.worker.socket_path = socket;
        }
        if let Some(command) = self.worker_command {
            let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            if !parts.is_empty() {
                config.worker.command = Some(parts);
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&args.log_filter).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {e}", args.log_filter);
            DEFAULT_LOG_FILTER.into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley Server");

    let config = args.into_config()?;
    info!("Models directory: {:?}", config.models_dir);

    let personas = PersonaStore::load(&config.persona_file)?;
    info!(
        "Loaded {} personas from {:?}",
        personas.len(),
        config.persona_file
    );

    // Backend construction blocks on downloads and the worker.
    let registry = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || ResponderRegistry::from_config(&config))
            .await
            .context("Backend construction task failed")??
    };

    let state = AppState::new(registry, personas);
    let registry = state.registry.clone();

    // Build router
    let app = api::create_router(state);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    info!("Server ready. Press Ctrl+C to stop.");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = tokio::task::spawn_blocking(move || registry.shutdown()).await? {
        warn!("Failed to stop generation worker: {}", e);
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "parley-server",
            "--port",
            "9000",
            "--lazy",
            "--max-length",
            "256",
            "--worker-command",
            "python3 worker.py --device cpu",
        ]);
        let config = args.into_config().unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_length, 256);
        assert_eq!(config.load_policy, LoadPolicy::Lazy);
        assert_eq!(
            config.worker.command.unwrap(),
            ["python3", "worker.py", "--device", "cpu"]
        );
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"port": 7000, "host": "127.0.0.1"}"#).unwrap();

        let args = Args::parse_from([
            "parley-server",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7001",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7001);
    }

    #[test]
    fn backend_flags_select_kinds() {
        let args = Args::parse_from([
            "parley-server",
            "--backend",
            "qc",
            "--backend",
            "microsoft/DialoGPT-small",
        ]);
        let config = args.into_config().unwrap();
        let names: Vec<_> = config.backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["qc", "vanilla_dialogpt"]);

        let args = Args::parse_from(["parley-server", "--backend", "gpt-9"]);
        assert!(args.into_config().is_err());
    }

    #[test]
    fn zero_max_length_is_rejected() {
        let args = Args::parse_from(["parley-server", "--max-length", "0"]);
        assert!(args.into_config().is_err());
    }
}
