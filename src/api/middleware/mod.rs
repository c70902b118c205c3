//! API middleware

mod auth;

pub use auth::{require_basic_auth, BasicAuth};
