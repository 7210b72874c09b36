//! Application error types.

use thiserror::Error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] backend_config::ConfigError),

    #[error("Backend client error: {0}")]
    Client(#[from] backend_client::ClientError),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;
