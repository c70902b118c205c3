//! API authentication middleware
//!
//! Handles Basic authentication for the proxy endpoints.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, warn};

use crate::config::ApiServerConfig;
use crate::error::{IkaError, Result};

/// Basic authentication handler
#[derive(Clone)]
pub struct BasicAuth {
    /// Whether authentication is enabled
    enabled: bool,
    /// Expected username
    username: String,
    /// Expected password
    password: String,
}

impl BasicAuth {
    /// Create a new auth handler
    pub fn new(enabled: bool, username: String, password: String) -> Self {
        Self {
            enabled,
            username,
            password,
        }
    }

    /// Create an auth handler from the API server configuration
    pub fn from_config(config: &ApiServerConfig) -> Self {
        Self::new(
            config.auth_enabled,
            config.auth_username.clone(),
            config.auth_password.clone(),
        )
    }

    /// Create a disabled auth handler
    pub fn disabled() -> Self {
        Self::new(false, String::new(), String::new())
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validate the Authorization header
    pub fn validate(&self, headers: &HeaderMap) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let auth_str = headers
            .get(AUTHORIZATION)
            .ok_or(IkaError::AuthenticationFailed)?
            .to_str()
            .map_err(|_| IkaError::AuthenticationFailed)?;

        // Parse "Basic <base64>"
        let Some(encoded) = auth_str.strip_prefix("Basic ") else {
            warn!("Invalid auth scheme, expected Basic");
            return Err(IkaError::AuthenticationFailed);
        };

        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| IkaError::AuthenticationFailed)?;
        let credentials =
            String::from_utf8(decoded).map_err(|_| IkaError::AuthenticationFailed)?;

        let (user, pass) = credentials
            .split_once(':')
            .ok_or(IkaError::AuthenticationFailed)?;

        // Evaluate both comparisons so timing does not reveal which one failed
        let user_ok = constant_time_eq(user.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(pass.as_bytes(), self.password.as_bytes());

        if user_ok & pass_ok {
            debug!("API authentication successful for user: {}", user);
            Ok(())
        } else {
            warn!("API authentication failed for user: {}", user);
            Err(IkaError::AuthenticationFailed)
        }
    }

    /// Create a 401 response carrying the Basic challenge
    pub fn challenge_response(&self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"proxyAuth\"")],
            Body::from("Unauthorised.\n"),
        )
            .into_response()
    }
}

/// Middleware rejecting requests without valid Basic credentials
pub async fn require_basic_auth(
    State(auth): State<BasicAuth>,
    req: Request,
    next: Next,
) -> Response {
    match auth.validate(req.headers()) {
        Ok(()) => next.run(req).await,
        Err(_) => auth.challenge_response(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(auth: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = auth {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn basic(credentials: &str) -> String {
        format!("Basic {}", BASE64.encode(credentials))
    }

    fn enabled() -> BasicAuth {
        BasicAuth::new(true, "user".to_string(), "pass".to_string())
    }

    #[test]
    fn test_auth_disabled() {
        let auth = BasicAuth::disabled();
        assert!(!auth.is_enabled());
        assert!(auth.validate(&headers_with_auth(None)).is_ok());
    }

    #[test]
    fn test_auth_missing_header() {
        assert!(matches!(
            enabled().validate(&headers_with_auth(None)),
            Err(IkaError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_auth_valid_credentials() {
        let headers = headers_with_auth(Some(&basic("user:pass")));
        assert!(enabled().validate(&headers).is_ok());
    }

    #[test]
    fn test_auth_invalid_credentials() {
        for credentials in ["wrong:pass", "user:wrong", "user:", "userpass"] {
            let headers = headers_with_auth(Some(&basic(credentials)));
            assert!(
                matches!(enabled().validate(&headers), Err(IkaError::AuthenticationFailed)),
                "accepted {}",
                credentials
            );
        }
    }

    #[test]
    fn test_auth_invalid_scheme() {
        let headers = headers_with_auth(Some("Bearer token123"));
        assert!(matches!(
            enabled().validate(&headers),
            Err(IkaError::AuthenticationFailed)
        ));

        let headers = headers_with_auth(Some("Basic not-base64!"));
        assert!(enabled().validate(&headers).is_err());
    }

    #[test]
    fn test_challenge_response() {
        let response = enabled().challenge_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"proxyAuth\""
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }
}
