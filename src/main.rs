//! route-prefetch sidecar.
//!
//! Wraps a prefetch coordinator in a small HTTP API so browser pages can
//! report hover/focus intent and warm routes ahead of navigation.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use route_prefetch::config::{Cli, Config};
use route_prefetch::prefetch::{PrefetchCoordinator, QueryCache};
use route_prefetch::server::api::{build_router, AppState};
use route_prefetch::server::metrics::PrefetchMetrics;
use route_prefetch::server::origin::SimulatedOrigin;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "route_prefetch=debug,tower_http=debug"
    } else {
        "route_prefetch=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("route-prefetch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let config = Arc::new(config);

    info!(
        default_delay_ms = config.prefetch.default_delay_ms,
        hover_delay_ms = config.prefetch.hover_delay_ms,
        stale_time_ms = config.prefetch.stale_time_ms,
        "Configuration loaded"
    );

    // The fetch runtime is shared; the coordinator owns ledger and timers.
    let cache = Arc::new(QueryCache::new());
    let coordinator = PrefetchCoordinator::new(cache.clone(), config.prefetch.clone());
    let origin = Arc::new(SimulatedOrigin::new(&config.origin));

    let state = Arc::new(AppState {
        coordinator: coordinator.clone(),
        cache,
        origin,
        metrics: PrefetchMetrics::new()?,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state);

    let listen_addr = config.server.listen.clone();
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.dispose();
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
