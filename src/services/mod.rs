//! Background services

pub mod route_refresh;

pub use route_refresh::{RouteRefreshConfig, RouteRefreshHandle, RouteRefreshService};
