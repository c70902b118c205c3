use serde::{Deserialize, Serialize};

/// Proxy endpoint as stored in a proxy list
///
/// Identity is the address; it is unique within one proxy list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl Proxy {
    pub fn new(addr: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            port: port.into(),
            ..Default::default()
        }
    }

    /// Attach credentials to the proxy
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = user.into();
        self.pass = pass.into();
        self
    }

    /// Check whether the proxy carries credentials
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty()
    }

    /// Get the `host:port` form of the proxy address
    pub fn endpoint(&self) -> String {
        if self.port.is_empty() {
            self.addr.clone()
        } else {
            format!("{}:{}", self.addr, self.port)
        }
    }
}

/// Routing context of a request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueId {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub domain: String,
}

impl QueueId {
    pub fn new(channel: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            domain: domain.into(),
        }
    }
}

/// Outcome reported by a caller after using a proxy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyOutcome {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub error: String,
}

impl ProxyOutcome {
    pub fn success(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            error: String::new(),
        }
    }

    pub fn failure(addr: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            error: error.into(),
        }
    }

    /// A success carries no error text and does not affect ordering
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}
