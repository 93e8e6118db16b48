use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoq_core::{
    create_mailbox, create_mirror, create_transfer, load_config, validate_config, CursorStore,
    HttpAnalyzer, InvoiceWorker, TemplateAssembler, WorkerDeps,
};
use invoq_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("INVOQ_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Data directory: {:?}", config.data.root);

    let cursor = CursorStore::new(config.worker.initial_cursor);
    let mirror = create_mirror(&config.mirror).context("Failed to create queue mirror")?;
    info!("Queue mirror: {}", mirror.name());

    let worker = if config.worker.enabled {
        let mailbox = create_mailbox(&config.mailbox).context("Failed to create mailbox")?;
        let analyzer = HttpAnalyzer::new(config.analysis.clone())
            .context("Failed to create analysis client")?;
        let assembler = TemplateAssembler::new(config.data.clone())
            .context("Failed to create IDOC assembler")?;
        let transfer = create_transfer(&config.transfer).context("Failed to create transfer")?;
        info!(
            "Mailbox: {}, transfer: {}, analysis endpoint: {}",
            mailbox.name(),
            transfer.name(),
            config.analysis.endpoint
        );

        let deps = WorkerDeps {
            mailbox,
            analyzer: Arc::new(analyzer),
            assembler: Arc::new(assembler),
            transfer,
            mirror: Arc::clone(&mirror),
            data: config.data.clone(),
        };
        let worker = Arc::new(InvoiceWorker::new(
            config.worker.clone(),
            deps,
            cursor.clone(),
        ));
        worker.start().await;
        info!("Pipeline worker started at cursor {}", config.worker.initial_cursor);
        Some(worker)
    } else {
        info!("Pipeline worker disabled in config");
        None
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        cursor,
        mirror,
        worker.clone(),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some(worker) = worker {
        info!("Stopping pipeline worker...");
        worker.stop().await;
        info!("Pipeline worker stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
