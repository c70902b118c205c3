pub mod proxy_list;
pub mod route;

pub use proxy_list::ProxyListRepository;
pub use route::{RouteKind, RouteRepository};
