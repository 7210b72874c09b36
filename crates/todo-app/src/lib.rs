//! Todo app core.
//!
//! - One shared backend client per `ClientManager`, built lazily from the
//!   environment
//! - Session refresh resumed whenever the app returns to the foreground
//! - Login form state and action buttons

pub mod commands;
pub mod error;
pub mod form;
pub mod lifecycle;
pub mod manager;

pub use commands::{Command, CommandError};
pub use error::{AppError, AppResult};
pub use form::{ButtonColors, ButtonSpec, Field, FormAction, LoginForm};
pub use lifecycle::{
    register_listener, AppState, AppStateEvents, ListenerHandle, RefreshOutcome, SessionRefresh,
};
pub use manager::{build_client, client_options, ClientManager, ConfigSource, EnvConfigSource};
