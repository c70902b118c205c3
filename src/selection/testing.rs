//! In-memory store and route source for tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ProxyStore, RouteSource};
use crate::error::{IkaError, Result};
use crate::models::Proxy;

pub fn proxies(addrs: &[&str]) -> Vec<Proxy> {
    addrs.iter().map(|addr| Proxy::new(*addr, "8080")).collect()
}

#[derive(Default)]
pub struct MemoryStore {
    lists: Mutex<HashMap<String, Vec<Proxy>>>,
    fetches: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    /// One-shot answers served ahead of the stored lists
    staged: Mutex<VecDeque<(Vec<Proxy>, Duration)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(self, key: &str, proxies: Vec<Proxy>) -> Self {
        self.set_list(key, proxies);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn set_list(&self, key: &str, proxies: Vec<Proxy>) {
        self.lists.lock().insert(key.to_string(), proxies);
    }

    /// Answer the next fetch with `proxies` after `delay`, whatever the key
    pub fn stage(&self, proxies: Vec<Proxy>, delay: Duration) {
        self.staged.lock().push_back((proxies, delay));
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyStore for MemoryStore {
    async fn fetch_proxy_list(&self, key: &str) -> Result<Vec<Proxy>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let staged = self.staged.lock().pop_front();
        if let Some((proxies, delay)) = staged {
            tokio::time::sleep(delay).await;
            return Ok(proxies);
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(IkaError::ProxyListUnavailable("store offline".to_string()));
        }

        self.lists
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| IkaError::ProxyListUnavailable(format!("no proxy list for {}", key)))
    }
}

#[derive(Default)]
pub struct MemoryRoutes {
    domains: Mutex<HashMap<String, String>>,
    channels: Mutex<HashMap<String, String>>,
    domains_failing: AtomicBool,
    channels_failing: AtomicBool,
}

impl MemoryRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(self, domain: &str, key: &str) -> Self {
        self.domains.lock().insert(domain.to_string(), key.to_string());
        self
    }

    pub fn with_channel(self, channel: &str, key: &str) -> Self {
        self.channels.lock().insert(channel.to_string(), key.to_string());
        self
    }

    pub fn set_domain(&self, domain: &str, key: &str) {
        self.domains.lock().insert(domain.to_string(), key.to_string());
    }

    pub fn set_domains_failing(&self, failing: bool) {
        self.domains_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_channels_failing(&self, failing: bool) {
        self.channels_failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RouteSource for MemoryRoutes {
    async fn fetch_domain_routes(&self) -> Result<HashMap<String, String>> {
        if self.domains_failing.load(Ordering::SeqCst) {
            return Err(IkaError::DomainRouteUnavailable("routes offline".to_string()));
        }
        Ok(self.domains.lock().clone())
    }

    async fn fetch_channel_routes(&self) -> Result<HashMap<String, String>> {
        if self.channels_failing.load(Ordering::SeqCst) {
            return Err(IkaError::ChannelRouteUnavailable("routes offline".to_string()));
        }
        Ok(self.channels.lock().clone())
    }
}
