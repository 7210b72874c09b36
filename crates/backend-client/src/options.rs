//! Client construction options.

use crate::storage::{MemoryStorage, SessionStorage};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the auth server hands sessions back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowType {
    #[default]
    Implicit,
    Pkce,
}

#[derive(Clone)]
pub struct AuthOptions {
    /// Where sessions are persisted.
    pub storage: Arc<dyn SessionStorage>,

    /// Storage key override. Defaults to `sb-<project ref>-auth-token`.
    pub storage_key: Option<String>,

    /// Refresh access tokens in the background before they expire.
    pub auto_refresh_token: bool,

    /// Write sessions through to `storage`.
    pub persist_session: bool,

    /// Pick up sessions from redirect URL fragments.
    pub detect_session_in_url: bool,

    pub flow_type: FlowType,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            storage_key: None,
            auto_refresh_token: true,
            persist_session: true,
            detect_session_in_url: true,
            flow_type: FlowType::default(),
        }
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("storage_key", &self.storage_key)
            .field("auto_refresh_token", &self.auto_refresh_token)
            .field("persist_session", &self.persist_session)
            .field("detect_session_in_url", &self.detect_session_in_url)
            .field("flow_type", &self.flow_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbOptions {
    pub schema: String,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            schema: "public".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    /// Cap on realtime events delivered per second.
    pub events_per_second: u32,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            events_per_second: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub auth: AuthOptions,
    pub global: GlobalOptions,
    pub db: DbOptions,
    pub realtime: RealtimeOptions,
}
