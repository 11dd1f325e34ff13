//! scrapeproxy - rendezvous proxy between scrapers and polling agents
//!
//! CLI entry point: load config, start the coordinator, serve HTTP.

use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use scrapeproxy::cli::Cli;
use scrapeproxy::config::Config;
use scrapeproxy::coordinator::Coordinator;
use scrapeproxy::server;

fn setup_logging(verbose: bool) {
    // Foreground server: log to stderr so supervisors capture it
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        "scrapeproxy loaded config: listen={}, registration-timeout={}s",
        config.server.listen_address, config.coordinator.registration_timeout_secs
    );

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {}", addr))?;

    let coordinator = Coordinator::start(config.coordinator.clone());

    // Releasing the coordinator first lets long-polls and waiting scrapes
    // return so the server's graceful drain can finish.
    let on_signal = {
        let coordinator = Arc::clone(&coordinator);
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            coordinator.shutdown();
        }
    };

    server::serve(listener, coordinator, on_signal).await
}
