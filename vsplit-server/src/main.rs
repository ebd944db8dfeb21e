//! vsplit-server - Vocal / background separation microservice
//!
//! Accepts media uploads, extracts a canonical waveform, separates it into
//! vocal and background stems, and serves the results per session.
//! Stale sessions are reclaimed by a background loop.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vsplit_common::duration::format_duration;

use vsplit_server::arena::{ActiveSessions, SessionArena};
use vsplit_server::config::{Cli, ServerConfig};
use vsplit_server::logging;
use vsplit_server::pipeline::SessionPipeline;
use vsplit_server::reclaim::Reclaimer;
use vsplit_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_filter = logging::init();

    let config = ServerConfig::load(&cli).context("Failed to load configuration")?;
    log_filter
        .apply_configured_level(&config.log_level)
        .context("Failed to apply configured log level")?;

    info!(
        "Starting vsplit-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &cli.config {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: platform default (compiled defaults if absent)"),
    }

    let arena = SessionArena::new(&config.root_folder);
    arena.ensure_root().with_context(|| {
        format!(
            "Failed to create session root {}",
            config.root_folder.display()
        )
    })?;
    info!("Session root: {}", config.root_folder.display());
    info!(
        "Separator: {:?} ({}), stems {} / {}",
        config.separator.backend,
        config.separator.program.display(),
        config.separator.names.vocals,
        config.separator.names.background
    );

    let active = ActiveSessions::new();
    let pipeline = SessionPipeline::new(
        arena.clone(),
        active.clone(),
        config.build_extractor(),
        config.build_separator(),
    );

    let shutdown = CancellationToken::new();
    let reclaimer = Reclaimer::new(
        arena,
        active,
        config.reclaim_threshold,
        config.reclaim_interval,
    );
    info!(
        "Reclaiming sessions idle for {} every {}",
        format_duration(config.reclaim_threshold),
        format_duration(config.reclaim_interval)
    );
    let reclaim_handle = reclaimer.spawn(shutdown.clone());

    let state = AppState::new(pipeline, config.max_upload_bytes);
    let app = build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);
    info!("Health check: http://{}/healthz", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down reclamation loop");
    shutdown.cancel();
    reclaim_handle.await.context("Reclamation loop panicked")?;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
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
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
