//! Ika - Proxy Selection Service
//!
//! Hands out upstream proxies from per-routing-key queues, preferring the
//! proxy that has gone unused longest and penalizing proxies that fail.
//!
//! ## Features
//!
//! - Recency and failure aware scheduling backed by an indexed binary heap
//! - Domain and channel routing to independent proxy queues
//! - Lazy, single-flight queue initialization from PostgreSQL
//! - Periodic route reloads that keep the last good routes on failure
//! - Optional HTTP Basic authentication on the proxy endpoints

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repository;
pub mod selection;
pub mod service;
pub mod services;

pub use config::Config;
pub use database::Database;
pub use error::{IkaError, Result};
pub use service::ProxyService;
