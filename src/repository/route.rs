use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::error::{IkaError, Result};
use crate::selection::RouteSource;

/// Kind of a route row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Domain,
    Channel,
}

impl RouteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Domain => "domain",
            RouteKind::Channel => "channel",
        }
    }

    fn unavailable(&self, reason: String) -> IkaError {
        match self {
            RouteKind::Domain => IkaError::DomainRouteUnavailable(reason),
            RouteKind::Channel => IkaError::ChannelRouteUnavailable(reason),
        }
    }
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Repository for domain and channel routes
#[derive(Clone)]
pub struct RouteRepository {
    pool: PgPool,
}

impl RouteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get all routes of one kind as name -> routing key
    pub async fn get_all(&self, kind: RouteKind) -> Result<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT name, routing_key FROM proxy_routes WHERE kind = $1",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| kind.unavailable(e.to_string()))?;

        debug!(kind = %kind, routes = rows.len(), "Fetched routes");
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl RouteSource for RouteRepository {
    async fn fetch_domain_routes(&self) -> Result<HashMap<String, String>> {
        self.get_all(RouteKind::Domain).await
    }

    async fn fetch_channel_routes(&self) -> Result<HashMap<String, String>> {
        self.get_all(RouteKind::Channel).await
    }
}
