use crate::error::{IkaError, Result};
use crate::selection::{SelectionConfig, DEFAULT_FAILURE_WEIGHT};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Proxy selection configuration
    pub selection: SelectionConfig,
    /// Route refresh interval in seconds (0 disables periodic refresh)
    pub route_refresh_secs: u64,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 4242)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Require HTTP Basic authentication on proxy endpoints
    pub auth_enabled: bool,
    /// Authentication username
    pub auth_username: String,
    /// Authentication password
    pub auth_password: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database name
    pub name: String,
    /// SSL mode (disable, require, prefer)
    pub ssl_mode: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections in pool
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl LogConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api = ApiServerConfig {
            port: get_env_or("API_PORT", "4242").parse().map_err(|_| {
                IkaError::InvalidConfig("API_PORT must be a valid port number".into())
            })?,
            host: get_env_or("API_HOST", "0.0.0.0"),
            auth_enabled: get_env_bool("IKA_AUTH_ENABLED", false)?,
            auth_username: get_env_or("IKA_AUTH_USERNAME", ""),
            auth_password: get_env_or("IKA_AUTH_PASSWORD", ""),
        };

        if api.auth_enabled && api.auth_username.is_empty() {
            return Err(IkaError::InvalidConfig(
                "IKA_AUTH_USERNAME is required when IKA_AUTH_ENABLED is set".into(),
            ));
        }

        Ok(Config {
            api,
            database: DatabaseConfig {
                host: get_env_or("DB_HOST", "localhost"),
                port: get_env_or("DB_PORT", "5432").parse().map_err(|_| {
                    IkaError::InvalidConfig("DB_PORT must be a valid port number".into())
                })?,
                user: get_env_or("DB_USER", "ika"),
                password: get_env_or("DB_PASSWORD", "ika_password"),
                name: get_env_or("DB_NAME", "ika"),
                ssl_mode: get_env_or("DB_SSLMODE", "disable"),
                max_connections: get_env_or("DB_MAX_CONNECTIONS", "20")
                    .parse()
                    .map_err(|_| {
                        IkaError::InvalidConfig("DB_MAX_CONNECTIONS must be a valid number".into())
                    })?,
                min_connections: get_env_or("DB_MIN_CONNECTIONS", "2").parse().map_err(|_| {
                    IkaError::InvalidConfig("DB_MIN_CONNECTIONS must be a valid number".into())
                })?,
            },
            selection: SelectionConfig {
                failure_weight: get_env_or("IKA_FAILURE_WEIGHT", &DEFAULT_FAILURE_WEIGHT.to_string())
                    .parse()
                    .map_err(|_| {
                        IkaError::InvalidConfig("IKA_FAILURE_WEIGHT must be a valid number".into())
                    })?,
                fetch_timeout: Duration::from_secs(
                    get_env_or("IKA_FETCH_TIMEOUT_SECS", "10")
                        .parse::<u64>()
                        .map_err(|_| {
                            IkaError::InvalidConfig(
                                "IKA_FETCH_TIMEOUT_SECS must be a valid number".into(),
                            )
                        })?
                        .max(1),
                ),
            },
            route_refresh_secs: get_env_or("IKA_ROUTE_REFRESH_SECS", "60")
                .parse()
                .map_err(|_| {
                    IkaError::InvalidConfig("IKA_ROUTE_REFRESH_SECS must be a valid number".into())
                })?,
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the database connection URL
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.database.user,
            self.database.password,
            self.database.host,
            self.database.port,
            self.database.name,
            self.database.ssl_mode
        )
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a boolean environment variable, rejecting anything unrecognized
fn get_env_bool(key: &str, default: bool) -> Result<bool> {
    let Ok(value) = env::var(key) else {
        return Ok(default);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(IkaError::InvalidConfig(format!(
            "{} must be a boolean, got {:?}",
            key, value
        ))),
    }
}
