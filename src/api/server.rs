//! API server using Axum
//!
//! Serves the proxy selection endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::database::Database;
use crate::error::{IkaError, Result};
use crate::service::ProxyService;

use super::middleware::BasicAuth;
use super::routes;

/// Upper bound on handling a single request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProxyService>,
    pub auth: BasicAuth,
    /// Backing database, reported by the health and status endpoints
    pub database: Option<Database>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<ProxyService>, auth: BasicAuth) -> Self {
        Self {
            service,
            auth,
            database: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, service: Arc<ProxyService>, database: Database) -> Self {
        let auth = BasicAuth::from_config(&config);
        if auth.is_enabled() {
            info!("Basic authentication enabled for proxy endpoints");
        }

        Self {
            config,
            state: AppState::new(service, auth).with_database(database),
        }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        routes::create_router(self.state.clone())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| IkaError::InvalidConfig(format!("Invalid API server address: {}", e)))?;

        let router = self.build_router();

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| IkaError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
