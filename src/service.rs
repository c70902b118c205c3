//! Proxy service
//!
//! Ties routing key resolution to the selection manager. One instance is
//! constructed at startup and shared by every request handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::Result;
use crate::models::{Proxy, ProxyOutcome, QueueId};
use crate::selection::{RoutingKeyResolver, SelectionManager, DEFAULT_ROUTING_KEY};

pub struct ProxyService {
    resolver: Arc<RoutingKeyResolver>,
    manager: SelectionManager,
    shut_down: AtomicBool,
}

impl ProxyService {
    pub fn new(resolver: Arc<RoutingKeyResolver>, manager: SelectionManager) -> Self {
        Self {
            resolver,
            manager,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn resolver(&self) -> &Arc<RoutingKeyResolver> {
        &self.resolver
    }

    pub fn manager(&self) -> &SelectionManager {
        &self.manager
    }

    /// Get a proxy for the request's channel and domain
    #[instrument(skip(self), fields(channel = %queue.channel, domain = %queue.domain))]
    pub async fn get_proxy(&self, queue: &QueueId) -> Result<Proxy> {
        let key = self.resolver.resolve(queue);
        self.manager.select(&key).await
    }

    /// Report how a proxy handed out for the request's channel and domain fared
    pub fn report_outcome(&self, queue: &QueueId, outcome: &ProxyOutcome) -> Result<()> {
        let key = self.resolver.resolve(queue);
        self.manager.record_outcome(&key, outcome)
    }

    /// Rebuild the queue behind `key`
    pub async fn refresh(&self, key: &str) -> Result<()> {
        self.manager.refresh(key).await
    }

    /// Rebuild the queue behind the default routing key
    pub async fn refresh_default(&self) -> Result<()> {
        self.manager.refresh(DEFAULT_ROUTING_KEY).await
    }

    /// Reload domain and channel routes
    pub async fn refresh_routes(&self) -> Result<()> {
        self.resolver.refresh().await
    }

    /// Release all selection state
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let queues = self.manager.len();
        self.manager.clear();
        info!(queues, "Proxy service shut down");
    }
}
