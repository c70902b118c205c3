//! Ika Proxy Selection Service - Entry Point
//!
//! Starts the API server and route refresh service with graceful shutdown support.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ika::api::ApiServer;
use ika::config::LogConfig;
use ika::repository::{ProxyListRepository, RouteRepository};
use ika::selection::{RoutingKeyResolver, SelectionManager};
use ika::services::{RouteRefreshConfig, RouteRefreshHandle, RouteRefreshService};
use ika::{Config, Database, ProxyService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);

    info!("Starting Ika Proxy Selection Service");

    // Connect to database
    let db = Database::new(&config).await?;
    let latency = db.health_check().await?;
    info!("Connected to database ({}ms)", latency.as_millis());

    // Run migrations
    db.run_migrations().await?;
    info!("Database migrations complete");

    // Load routes; the service refuses to start without them
    let routes = Arc::new(RouteRepository::new(db.pool().clone()));
    let resolver = Arc::new(RoutingKeyResolver::load(routes).await?);
    let (domains, channels) = resolver.route_counts();
    info!("Loaded {} domain routes and {} channel routes", domains, channels);

    // Proxy queues are built lazily on first use
    let store = Arc::new(ProxyListRepository::new(db.pool().clone()));
    let manager = SelectionManager::new(store, config.selection.clone());
    info!(
        "Failure weight {}, fetch timeout {}s",
        config.selection.failure_weight,
        config.selection.fetch_timeout.as_secs()
    );

    let service = Arc::new(ProxyService::new(resolver.clone(), manager));

    // Start route refresh service
    let (refresh_handle, refresh_shutdown) = RouteRefreshHandle::new();
    let refresh_task = if config.route_refresh_secs > 0 {
        let refresh_service = RouteRefreshService::new(
            resolver,
            RouteRefreshConfig {
                interval: Duration::from_secs(config.route_refresh_secs),
            },
        );
        Some(tokio::spawn(async move {
            refresh_service.run(refresh_shutdown).await;
        }))
    } else {
        warn!("Periodic route refresh disabled");
        None
    };

    // Create API server
    let (shutdown_tx, api_shutdown) = watch::channel(false);
    let api_server = ApiServer::new(config.api.clone(), service.clone(), db.clone());
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started - API: {}", config.api_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    refresh_handle.shutdown();

    let _ = api_task.await;
    if let Some(task) = refresh_task {
        let _ = task.await;
    }

    service.shutdown();
    db.close().await;

    info!("Ika Proxy Selection Service stopped");
    Ok(())
}

/// Install the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ika={},tower_http=debug", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
