use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Ika service
#[derive(Error, Debug)]
pub enum IkaError {
    // Selection errors
    #[error("Queue is empty: {key}")]
    EmptyQueue { key: String },

    #[error("Could not retrieve proxy list: {0}")]
    ProxyListUnavailable(String),

    // Routing errors
    #[error("Could not retrieve domain route: {0}")]
    DomainRouteUnavailable(String),

    #[error("Could not retrieve channel route: {0}")]
    ChannelRouteUnavailable(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // Authentication errors
    #[error("Authentication failed")]
    AuthenticationFailed,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Ika operations
pub type Result<T> = std::result::Result<T, IkaError>;

impl IkaError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            IkaError::InvalidRequest(_) | IkaError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            IkaError::AuthenticationFailed => StatusCode::UNAUTHORIZED,

            // 502 Bad Gateway
            IkaError::ProxyListUnavailable(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            IkaError::EmptyQueue { .. }
            | IkaError::DomainRouteUnavailable(_)
            | IkaError::ChannelRouteUnavailable(_)
            | IkaError::DatabaseConnection(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            IkaError::Database(_) | IkaError::Io(_) | IkaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for IkaError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
