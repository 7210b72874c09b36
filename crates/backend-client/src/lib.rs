//! Client for the managed backend: auth sessions with background refresh,
//! pluggable session storage and typed table access.

mod auth;
mod client;
mod error;
mod options;
pub mod pkce;
pub mod schema;
mod storage;

pub use auth::{AuthClient, Session, User, AUTO_REFRESH_TICK, AUTO_REFRESH_TICK_THRESHOLD};
pub use client::{BackendClient, TableQuery};
pub use error::{AuthError, ClientError};
pub use options::{AuthOptions, ClientOptions, DbOptions, FlowType, GlobalOptions, RealtimeOptions};
pub use pkce::PkceChallenge;
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
