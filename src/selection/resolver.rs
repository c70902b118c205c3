//! Routing key resolution
//!
//! Maps a request's (channel, domain) pair to the routing key of the proxy
//! queue serving it. Routes are refreshed wholesale and swapped in atomically,
//! so readers never see a domain map from one refresh paired with a channel
//! map from another.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use super::{RouteSource, DEFAULT_ROUTING_KEY};
use crate::error::{IkaError, Result};
use crate::models::QueueId;

/// Domain and channel routes captured by one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    pub domains: HashMap<String, String>,
    pub channels: HashMap<String, String>,
}

impl RoutingTable {
    /// Resolve a routing key: domain match, then channel match, then default
    pub fn resolve(&self, queue: &QueueId) -> &str {
        self.domains
            .get(&queue.domain)
            .or_else(|| self.channels.get(&queue.channel))
            .map(String::as_str)
            .unwrap_or(DEFAULT_ROUTING_KEY)
    }
}

/// Resolves routing keys against a refreshable routing table
pub struct RoutingKeyResolver {
    source: Arc<dyn RouteSource>,
    table: ArcSwap<RoutingTable>,
}

impl RoutingKeyResolver {
    /// Create a resolver with empty routes
    pub fn new(source: Arc<dyn RouteSource>) -> Self {
        Self {
            source,
            table: ArcSwap::from_pointee(RoutingTable::default()),
        }
    }

    /// Create a resolver and load its routes, failing if they cannot be loaded
    pub async fn load(source: Arc<dyn RouteSource>) -> Result<Self> {
        let resolver = Self::new(source);
        resolver.refresh().await?;
        Ok(resolver)
    }

    pub fn resolve(&self, queue: &QueueId) -> String {
        let key = self.table.load().resolve(queue).to_string();
        debug!(channel = %queue.channel, domain = %queue.domain, key = %key, "Resolved routing key");
        key
    }

    /// Re-fetch both route maps and swap them in together
    ///
    /// On failure the current routes stay in place.
    pub async fn refresh(&self) -> Result<()> {
        let (domains, channels) = futures::join!(
            self.source.fetch_domain_routes(),
            self.source.fetch_channel_routes()
        );

        let domains = domains.map_err(|e| {
            warn!(error = %e, "Failed to refresh domain routes");
            match e {
                IkaError::DomainRouteUnavailable(_) => e,
                other => IkaError::DomainRouteUnavailable(other.to_string()),
            }
        })?;
        let channels = channels.map_err(|e| {
            warn!(error = %e, "Failed to refresh channel routes");
            match e {
                IkaError::ChannelRouteUnavailable(_) => e,
                other => IkaError::ChannelRouteUnavailable(other.to_string()),
            }
        })?;

        info!(
            domains = domains.len(),
            channels = channels.len(),
            "Routing table refreshed"
        );
        self.table.store(Arc::new(RoutingTable { domains, channels }));
        Ok(())
    }

    /// Get the routing table currently in use
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Number of (domain, channel) routes
    pub fn route_counts(&self) -> (usize, usize) {
        let table = self.table.load();
        (table.domains.len(), table.channels.len())
    }
}
