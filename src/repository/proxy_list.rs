use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use crate::error::{IkaError, Result};
use crate::models::Proxy;
use crate::selection::ProxyStore;

/// Repository for proxy lists, stored as one JSON array per routing key
#[derive(Clone)]
pub struct ProxyListRepository {
    pool: PgPool,
}

impl ProxyListRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the proxy list stored under a routing key
    pub async fn get(&self, key: &str) -> Result<Option<Vec<Proxy>>> {
        let payload = sqlx::query_scalar::<_, Value>(
            "SELECT proxies FROM proxy_lists WHERE routing_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        payload.map(|value| decode_proxy_list(key, value)).transpose()
    }
}

#[async_trait]
impl ProxyStore for ProxyListRepository {
    async fn fetch_proxy_list(&self, key: &str) -> Result<Vec<Proxy>> {
        let proxies = self
            .get(key)
            .await
            .map_err(|e| match e {
                IkaError::ProxyListUnavailable(_) => e,
                other => IkaError::ProxyListUnavailable(other.to_string()),
            })?
            .ok_or_else(|| {
                IkaError::ProxyListUnavailable(format!("no proxy list stored for {}", key))
            })?;

        debug!(key, proxies = proxies.len(), "Fetched proxy list");
        Ok(proxies)
    }
}

fn decode_proxy_list(key: &str, value: Value) -> Result<Vec<Proxy>> {
    serde_json::from_value(value).map_err(|e| {
        IkaError::ProxyListUnavailable(format!("malformed proxy list for {}: {}", key, e))
    })
}
