//! Validated connection parameters for the managed backend.

use crate::error::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Keys shorter than this are almost certainly truncated or copied wrong.
pub const MIN_PUBLIC_KEY_LEN: usize = 50;

/// Domain served by the managed platform.
pub const MANAGED_DOMAIN: &str = "supabase.co";

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]", "::1", "0.0.0.0"];

/// Connection parameters for the backend client.
///
/// The public key is kept in a `SecretString` so it never shows up in
/// `Debug` output or log lines.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    endpoint: String,
    url: Url,
    public_key: SecretString,
    debug_enabled: bool,
    request_timeout: Duration,
}

/// Suspicious but usable configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    UnexpectedHost { host: String },
    ShortPublicKey { len: usize },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::UnexpectedHost { host } => write!(
                f,
                "ENDPOINT_URL host '{}' does not appear to be a {} URL",
                host, MANAGED_DOMAIN
            ),
            ConfigWarning::ShortPublicKey { len } => write!(
                f,
                "PUBLIC_API_KEY appears to be too short ({} < {} characters)",
                len, MIN_PUBLIC_KEY_LEN
            ),
        }
    }
}

impl ConnectionConfig {
    /// Validate raw values into a connection configuration.
    ///
    /// Empty strings count as missing.
    pub fn new(
        endpoint: Option<String>,
        public_key: Option<String>,
        debug_enabled: bool,
    ) -> Result<Self, ConfigError> {
        let endpoint = endpoint
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;
        let public_key = public_key
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingPublicKey)?;

        let url = Url::parse(&endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            value: endpoint.clone(),
            source,
        })?;

        Ok(Self {
            endpoint,
            url,
            public_key: SecretString::new(public_key),
            debug_enabled,
            request_timeout: crate::loader::DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Endpoint exactly as supplied.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn public_key(&self) -> &SecretString {
        &self.public_key
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Endpoint with every host label but the last masked, e.g.
    /// `https://abcd.supabase.co` becomes `https://*****.co`.
    pub fn redacted_endpoint(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        let masked = match host.rfind('.') {
            Some(idx) => format!("*****{}", &host[idx..]),
            None => host.to_string(),
        };

        match self.url.port() {
            Some(port) => format!("{}://{}:{}", self.url.scheme(), masked, port),
            None => format!("{}://{}", self.url.scheme(), masked),
        }
    }

    /// Non-fatal problems with the configured values.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let host = self.url.host_str().unwrap_or_default();
        if !is_managed_host(host) && !is_local_host(host) {
            warnings.push(ConfigWarning::UnexpectedHost {
                host: host.to_string(),
            });
        }

        let len = self.public_key.expose_secret().chars().count();
        if len < MIN_PUBLIC_KEY_LEN {
            warnings.push(ConfigWarning::ShortPublicKey { len });
        }

        warnings
    }
}

/// Whether `host` belongs to the managed platform's domain.
pub fn is_managed_host(host: &str) -> bool {
    host == MANAGED_DOMAIN || host.ends_with(&format!(".{}", MANAGED_DOMAIN))
}

/// Whether `host` points at a local development stack.
pub fn is_local_host(host: &str) -> bool {
    LOCAL_HOSTS.contains(&host)
}
