//! Loading connection configuration from environment variables.

use crate::connection::ConnectionConfig;
use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub const ENDPOINT_VAR: &str = "ENDPOINT_URL";
pub const PUBLIC_KEY_VAR: &str = "PUBLIC_API_KEY";
pub const DEBUG_VAR: &str = "DEBUG_FLAG";
pub const REQUEST_TIMEOUT_VAR: &str = "REQUEST_TIMEOUT";

pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment values before validation. Keys arrive lowercased.
#[derive(Debug, Deserialize)]
struct RawEnv {
    #[serde(default)]
    endpoint_url: Option<String>,

    #[serde(default)]
    public_api_key: Option<String>,

    #[serde(default)]
    debug_flag: Option<String>,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    request_timeout: Duration,
}

/// `DEBUG_FLAG` enables debug output only when it is exactly `"true"`.
pub fn debug_flag_enabled(value: Option<&str>) -> bool {
    value == Some("true")
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

/// Load configuration from the process environment.
///
/// A `.env` file in the working directory is applied first if present.
/// Every call re-reads the environment; nothing is cached here.
pub fn load_config() -> Result<ConnectionConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_with(config::Environment::default())
}

/// Load configuration from an explicit set of variables instead of the
/// process environment.
pub fn load_config_from<I, K, V>(vars: I) -> Result<ConnectionConfig, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let source: config::Map<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    load_with(config::Environment::default().source(Some(source)))
}

fn load_with(environment: config::Environment) -> Result<ConnectionConfig, ConfigError> {
    let raw: RawEnv = config::Config::builder()
        // Keys and secrets must stay strings.
        .add_source(environment.try_parsing(false))
        .build()?
        .try_deserialize()?;

    let debug_enabled = debug_flag_enabled(raw.debug_flag.as_deref());

    let config = ConnectionConfig::new(raw.endpoint_url, raw.public_api_key, debug_enabled)?
        .with_request_timeout(raw.request_timeout);

    for warning in config.warnings() {
        warn!("Warning: {}", warning);
    }

    if config.debug_enabled() {
        info!(
            endpoint = %config.redacted_endpoint(),
            public_key_len = secrecy::ExposeSecret::expose_secret(config.public_key()).len(),
            request_timeout = ?config.request_timeout(),
            debug = true,
            "Backend configuration loaded successfully"
        );
    }

    Ok(config)
}
