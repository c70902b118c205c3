//! API server implementation
//!
//! Provides the HTTP endpoints for selecting proxies and reporting outcomes.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use routes::create_router;
pub use server::{ApiServer, AppState};
