//! Route refresh service
//!
//! Periodically reloads domain and channel routes. A failed reload keeps the
//! routes already in use.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::selection::RoutingKeyResolver;

/// Route refresh service configuration
#[derive(Clone)]
pub struct RouteRefreshConfig {
    /// How often to reload routes
    pub interval: Duration,
}

impl Default for RouteRefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Route refresh service
pub struct RouteRefreshService {
    resolver: Arc<RoutingKeyResolver>,
    config: RouteRefreshConfig,
}

impl RouteRefreshService {
    /// Create a new route refresh service
    pub fn new(resolver: Arc<RoutingKeyResolver>, config: RouteRefreshConfig) -> Self {
        Self { resolver, config }
    }

    /// Run the route refresh service until shutdown is signalled
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting route refresh service ({}s interval)",
            self.config.interval.as_secs()
        );

        let mut refresh_interval = interval(self.config.interval);
        refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        refresh_interval.tick().await; // Routes were loaded at startup

        loop {
            tokio::select! {
                _ = refresh_interval.tick() => {
                    self.refresh_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Route refresh service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Reload routes once, logging the outcome
    async fn refresh_once(&self) -> bool {
        match self.resolver.refresh().await {
            Ok(()) => {
                let (domains, channels) = self.resolver.route_counts();
                debug!(domains, channels, "Routes reloaded");
                true
            }
            Err(e) => {
                warn!("Route refresh failed, keeping current routes: {}", e);
                false
            }
        }
    }
}

/// Handle for stopping the route refresh service
pub struct RouteRefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RouteRefreshHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for RouteRefreshHandle {
    fn default() -> Self {
        Self::new().0
    }
}
