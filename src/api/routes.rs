//! API route definitions

use axum::middleware;
use axum::routing::get;
use axum::Router;

use super::handlers;
use super::middleware::{require_basic_auth, BasicAuth};
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no auth required)
        .route("/health", get(handlers::health::health_check))
        .merge(proxy_routes(state.auth.clone()))
        .with_state(state)
}

/// Proxy selection routes, behind Basic authentication when enabled
fn proxy_routes(auth: BasicAuth) -> Router<AppState> {
    Router::new()
        .route("/proxy", get(handlers::proxy::get_proxy))
        .route(
            "/proxy/meta",
            get(handlers::proxy::report_outcome).post(handlers::proxy::report_outcome),
        )
        .route(
            "/proxy/refresh",
            get(handlers::proxy::refresh_proxies).post(handlers::proxy::refresh_proxies),
        )
        .route("/proxy/status", get(handlers::proxy::status))
        .route_layer(middleware::from_fn_with_state(auth, require_basic_auth))
}
