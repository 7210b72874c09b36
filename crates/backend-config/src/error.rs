//! Configuration errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config error: ENDPOINT_URL is required. Please check your .env file.")]
    MissingEndpoint,

    #[error("Config error: PUBLIC_API_KEY is required. Please check your .env file.")]
    MissingPublicKey,

    #[error("Config error: ENDPOINT_URL must be a valid URL. Received: {value}")]
    InvalidEndpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Config error: {0}")]
    Source(#[from] config::ConfigError),
}
