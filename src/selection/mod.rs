//! Proxy selection engine
//!
//! This module provides:
//! - A scored min-heap ordering proxies by recency and failures
//! - Routing key resolution from a request's channel and domain
//! - A manager owning one heap per routing key, built lazily from the store

mod heap;
mod manager;
mod resolver;

#[cfg(test)]
pub(crate) mod testing;

pub use heap::{failure_penalty, ScoredHeap, DEFAULT_FAILURE_WEIGHT};
pub use manager::{SelectionConfig, SelectionManager};
pub use resolver::{RoutingKeyResolver, RoutingTable};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Proxy;

/// Routing key used when neither the domain nor the channel has a route
pub const DEFAULT_ROUTING_KEY: &str = "proxy:queue:master";

/// Source of proxy lists, one per routing key
#[async_trait]
pub trait ProxyStore: Send + Sync {
    /// Fetch the ordered proxy list stored under `key`
    ///
    /// Missing lists and malformed payloads are reported as
    /// `IkaError::ProxyListUnavailable`.
    async fn fetch_proxy_list(&self, key: &str) -> Result<Vec<Proxy>>;
}

/// Source of domain and channel routes
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Fetch the domain -> routing key mapping
    async fn fetch_domain_routes(&self) -> Result<HashMap<String, String>>;

    /// Fetch the channel -> routing key mapping
    async fn fetch_channel_routes(&self) -> Result<HashMap<String, String>>;
}
