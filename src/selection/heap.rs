//! Scored min-heap of proxies
//!
//! Each proxy in the current snapshot gets one node whose score is
//! `last_used + failures ^ failure_weight` (unix seconds). The node with the
//! lowest score is handed out next, so rarely used, rarely failing proxies
//! come first and a proxy with a few recorded failures is pushed far behind
//! the others without ever leaving rotation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::Proxy;

/// Exponent applied to the failure count when none is configured
pub const DEFAULT_FAILURE_WEIGHT: u32 = 4;

/// Score penalty for `failures` recorded failures
pub fn failure_penalty(failures: u32, failure_weight: u32) -> i64 {
    i64::from(failures).saturating_pow(failure_weight)
}

/// Scheduling state of one proxy
#[derive(Debug, Clone)]
struct Node {
    /// Index into the snapshot
    index: usize,
    /// Unix timestamp (seconds) of the last hand-out
    last_used: i64,
    failures: u32,
    /// Hand-out order, breaks score ties
    sequence: u64,
    score: i64,
}

impl Node {
    fn new(index: usize, now: i64, failure_weight: u32) -> Self {
        let mut node = Self {
            index,
            last_used: now,
            failures: 0,
            sequence: index as u64,
            score: 0,
        };
        node.update_score(failure_weight);
        node
    }

    fn update_score(&mut self, failure_weight: u32) {
        self.score = self
            .last_used
            .saturating_add(failure_penalty(self.failures, failure_weight));
    }

    /// Ordering key: lower pops first
    fn key(&self) -> (i64, u64) {
        (self.score, self.sequence)
    }
}

/// Array-backed binary min-heap over an immutable proxy snapshot
///
/// The heap does no locking of its own; the owner serializes access.
#[derive(Debug)]
pub struct ScoredHeap {
    failure_weight: u32,
    nodes: Vec<Node>,
    proxies: Arc<[Proxy]>,
    /// Address -> snapshot index (first occurrence wins)
    by_addr: HashMap<String, usize>,
    /// Snapshot index -> position in `nodes`
    positions: Vec<usize>,
    next_sequence: u64,
}

impl ScoredHeap {
    pub fn new(failure_weight: u32) -> Self {
        Self {
            failure_weight,
            nodes: Vec::new(),
            proxies: Arc::from(Vec::new()),
            by_addr: HashMap::new(),
            positions: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn failure_weight(&self) -> u32 {
        self.failure_weight
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get the proxy list captured by the last rebuild
    pub fn snapshot(&self) -> Arc<[Proxy]> {
        self.proxies.clone()
    }

    /// Replace all state with a fresh node per proxy
    pub fn rebuild(&mut self, proxies: Vec<Proxy>) {
        self.rebuild_at(proxies, Utc::now());
    }

    /// Replace all state, stamping every node as used at `now`
    ///
    /// Accumulated failures and recency are discarded. Ties are broken by
    /// position in `proxies`.
    pub fn rebuild_at(&mut self, proxies: Vec<Proxy>, now: DateTime<Utc>) {
        let now = now.timestamp();
        let weight = self.failure_weight;

        self.nodes = (0..proxies.len())
            .map(|index| Node::new(index, now, weight))
            .collect();
        self.positions = (0..proxies.len()).collect();

        self.by_addr = HashMap::with_capacity(proxies.len());
        for (index, proxy) in proxies.iter().enumerate() {
            self.by_addr.entry(proxy.addr.clone()).or_insert(index);
        }

        self.next_sequence = proxies.len() as u64;
        self.proxies = Arc::from(proxies);
        self.heapify();
    }

    /// Hand out the lowest-scored proxy
    pub fn pop(&mut self) -> Option<Proxy> {
        self.pop_at(Utc::now())
    }

    /// Hand out the lowest-scored proxy and mark it used at `now`
    ///
    /// Returns `None` when the snapshot is empty.
    pub fn pop_at(&mut self, now: DateTime<Utc>) -> Option<Proxy> {
        let weight = self.failure_weight;
        let sequence = self.next_sequence;

        let root = self.nodes.first_mut()?;
        root.last_used = now.timestamp();
        root.sequence = sequence;
        root.update_score(weight);
        let index = root.index;

        self.next_sequence += 1;
        self.sift_down(0);

        Some(self.proxies[index].clone())
    }

    /// Add one failure to the proxy with the given address
    ///
    /// Returns `false` if the address is not part of the current snapshot,
    /// in which case nothing changes.
    ///
    /// Only a sift-down is performed: this relies on the score never
    /// decreasing when the failure count grows. A scoring change that can
    /// lower a node's score must also sift up here.
    pub fn record_failure(&mut self, addr: &str) -> bool {
        let Some(&index) = self.by_addr.get(addr) else {
            return false;
        };

        let weight = self.failure_weight;
        let pos = self.positions[index];
        let node = &mut self.nodes[pos];
        node.failures = node.failures.saturating_add(1);
        node.update_score(weight);

        self.sift_down(pos);
        true
    }

    /// Failure count of the proxy with the given address
    pub fn failures(&self, addr: &str) -> Option<u32> {
        self.node_for(addr).map(|node| node.failures)
    }

    /// Current score of the proxy with the given address
    pub fn score(&self, addr: &str) -> Option<i64> {
        self.node_for(addr).map(|node| node.score)
    }

    fn node_for(&self, addr: &str) -> Option<&Node> {
        let index = *self.by_addr.get(addr)?;
        Some(&self.nodes[self.positions[index]])
    }

    fn heapify(&mut self) {
        for pos in (0..self.nodes.len() / 2).rev() {
            self.sift_down(pos);
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;

            let mut min = pos;
            if left < len && self.nodes[left].key() < self.nodes[min].key() {
                min = left;
            }
            if right < len && self.nodes[right].key() < self.nodes[min].key() {
                min = right;
            }
            if min == pos {
                break;
            }

            self.swap(pos, min);
            pos = min;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.nodes.swap(a, b);
        self.positions[self.nodes[a].index] = a;
        self.positions[self.nodes[b].index] = b;
    }

    #[cfg(test)]
    fn is_heap_ordered(&self) -> bool {
        (1..self.nodes.len()).all(|pos| {
            let parent = &self.nodes[(pos - 1) / 2];
            parent.score <= self.nodes[pos].score && parent.key() <= self.nodes[pos].key()
        }) && self
            .nodes
            .iter()
            .enumerate()
            .all(|(pos, node)| self.positions[node.index] == pos)
    }
}

impl Default for ScoredHeap {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_WEIGHT)
    }
}
