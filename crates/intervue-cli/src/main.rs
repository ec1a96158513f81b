//! Intervue CLI
//!
//! Main entry point for running the Intervue server.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use intervue_provider::{build_gateway, build_transcriber};
use intervue_sandbox::{CodeRunner, DockerSandbox};
use intervue_server::{create_router, AppState, Config};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// How long a `--dev-token` stays valid.
const DEV_TOKEN_TTL_HOURS: i64 = 24;

/// Intervue - AI interview practice backend
///
/// Serves the assessment API, background feedback generation, interview
/// chat and sandboxed code execution.
#[derive(Parser, Debug)]
#[command(name = "intervue")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: intervue.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Address to listen on (overrides server.host)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port for the HTTP API server (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Accept this bearer token for a local development user
    #[arg(long, value_name = "TOKEN", env = "INTERVUE_DEV_TOKEN")]
    dev_token: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Intervue starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, wires the services and serves until Ctrl+C.
async fn run_server(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.apply_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    print_config(&config);

    let provider_config = config.provider_config();
    let gateway = build_gateway(&provider_config).map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialise model provider: {e}\n\nSuggestion: Check provider.baseUrl and your API key"
        )
    })?;
    let transcriber = build_transcriber(&provider_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialise transcriber: {e}"))?;
    println!(
        "Model provider: {} ({})",
        gateway.provider_name(),
        gateway.model_id()
    );

    println!();
    println!("Checking Docker availability...");
    let sandbox = DockerSandbox::connect(config.sandbox_limits()).map_err(|e| {
        anyhow::anyhow!(
            "Docker is not available: {e}\n\nSuggestion: Make sure Docker is installed and running"
        )
    })?;
    match sandbox.health_check().await {
        Ok(()) => println!("Docker is available and healthy"),
        Err(e) => {
            tracing::warn!(error = %e, "Docker health check failed; code execution will report the sandbox as unavailable");
            println!("Docker is not reachable; code execution is disabled until it is");
        }
    }

    let state = AppState::new(config.clone(), gateway, transcriber, Arc::new(sandbox));

    if let Some(token) = args.dev_token {
        let user_id = Uuid::new_v4();
        state
            .auth
            .register(
                token,
                user_id,
                chrono::Utc::now() + chrono::Duration::hours(DEV_TOKEN_TTL_HOURS),
            )
            .await;
        println!("Development token accepted for user {user_id}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid listen address '{}:{}': {e}\n\nSuggestion: Use an IP address with --host",
                config.server.host,
                config.server.port
            )
        })?;

    let router = create_router(state);
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    println!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Workers: {}", config.server.workers);
    println!("  Provider: {}", config.provider.kind.as_str());
    println!("  Prompt version: {}", config.pipeline.prompt_version);
    println!("  Max retries: {}", config.pipeline.max_retries);
    println!(
        "  Sandbox: {}s, {} MB, {} CPU",
        config.sandbox.timeout_seconds, config.sandbox.memory_mb, config.sandbox.cpu_share
    );
}
