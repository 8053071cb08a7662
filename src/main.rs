//! ollama-gateway binary.
//!
//! Resolves configuration from CLI flags and environment, then serves the
//! gateway API until SIGINT/SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ollama_gateway::backend::ollama::OllamaClient;
use ollama_gateway::config::{Cli, Config};
use ollama_gateway::metrics::Metrics;
use ollama_gateway::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.debug {
        "ollama_gateway=debug,tower_http=debug"
    } else {
        "ollama_gateway=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("ollama-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration.
    let config = Arc::new(Config::from_cli(&cli)?);

    info!(
        profile = ?config.profile,
        environment = %config.environment,
        ollama = %config.backend.base_url,
        error_style = ?config.error_style,
        counter_scope = ?config.counter_scope,
        auth = ?config.auth,
        "Configuration loaded"
    );

    let backend = OllamaClient::new(config.backend.clone())?;
    let metrics = Arc::new(Metrics::new()?);
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState {
        config: config.clone(),
        backend: Arc::new(backend),
        metrics: metrics.clone(),
        shutdown: shutdown.clone(),
    });

    tokio::spawn(wait_for_signal(shutdown));

    let listen_addr = config.listen_addr();
    info!(addr = %listen_addr, "Starting server");
    let listener = TcpListener::bind(&listen_addr).await?;

    server::serve(listener, state).await?;

    info!(
        total_requests = metrics.request_count(),
        uptime_secs = metrics.uptime_seconds(),
        "Gateway stopped"
    );

    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
