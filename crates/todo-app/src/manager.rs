//! Shared backend client, built once on first use.

use crate::error::{AppError, AppResult};
use crate::lifecycle::{register_listener, AppStateEvents, ListenerHandle, RefreshOutcome};
use backend_client::{
    AuthOptions, BackendClient, ClientError, ClientOptions, DbOptions, FlowType, GlobalOptions,
    MemoryStorage, RealtimeOptions, SessionStorage,
};
use backend_config::{ConfigError, ConnectionConfig};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::OnceCell;
use tokio_stream::Stream;
use tracing::{error, info, instrument, warn};

/// Sent as `X-Client-Info` on every request.
pub const CLIENT_INFO: &str = concat!("supabase-todo@", env!("CARGO_PKG_VERSION"));

pub const DB_SCHEMA: &str = "public";

pub const REALTIME_EVENTS_PER_SECOND: u32 = 2;

const OUTCOME_BUFFER: usize = 16;

/// Where the manager gets its connection configuration.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<ConnectionConfig, ConfigError>;
}

/// Process environment (plus `.env`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self) -> Result<ConnectionConfig, ConfigError> {
        backend_config::load_config()
    }
}

impl<F> ConfigSource for F
where
    F: Fn() -> Result<ConnectionConfig, ConfigError> + Send + Sync,
{
    fn load(&self) -> Result<ConnectionConfig, ConfigError> {
        self()
    }
}

/// Options every app client is built with.
pub fn client_options(config: &ConnectionConfig, storage: Arc<dyn SessionStorage>) -> ClientOptions {
    ClientOptions {
        auth: AuthOptions {
            storage,
            storage_key: None,
            auto_refresh_token: true,
            persist_session: true,
            detect_session_in_url: false,
            flow_type: FlowType::Pkce,
        },
        global: GlobalOptions {
            headers: vec![("X-Client-Info".into(), CLIENT_INFO.into())],
            timeout: config.request_timeout(),
        },
        db: DbOptions {
            schema: DB_SCHEMA.into(),
        },
        realtime: RealtimeOptions {
            events_per_second: REALTIME_EVENTS_PER_SECOND,
        },
    }
}

/// Build a backend client from validated configuration.
pub fn build_client(
    config: &ConnectionConfig,
    storage: Arc<dyn SessionStorage>,
) -> Result<BackendClient, ClientError> {
    let client = BackendClient::new(
        config.endpoint(),
        config.public_key().expose_secret().clone(),
        client_options(config, storage),
    )?;

    if config.debug_enabled() {
        info!("Backend client created successfully");
    }

    Ok(client)
}

/// Owns the app's single backend client and its lifecycle listener.
///
/// The client is built on the first `get_client` call. Concurrent first
/// calls wait on the same construction; a failed construction leaves the
/// manager empty so the next call starts over.
pub struct ClientManager {
    config_source: Box<dyn ConfigSource>,
    storage: Arc<dyn SessionStorage>,
    app_state: AppStateEvents,
    client: OnceCell<Arc<BackendClient>>,
    listener: Mutex<Option<ListenerHandle>>,
    outcomes: broadcast::Sender<RefreshOutcome>,
}

impl ClientManager {
    pub fn new(
        config_source: impl ConfigSource + 'static,
        storage: Arc<dyn SessionStorage>,
        app_state: AppStateEvents,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_BUFFER);
        Self {
            config_source: Box::new(config_source),
            storage,
            app_state,
            client: OnceCell::new(),
            listener: Mutex::new(None),
            outcomes,
        }
    }

    /// Manager reading the process environment, with in-memory sessions.
    pub fn from_env(app_state: AppStateEvents) -> Self {
        Self::new(EnvConfigSource, Arc::new(MemoryStorage::new()), app_state)
    }

    /// The shared client, building it on first use.
    #[instrument(skip(self))]
    pub async fn get_client(&self) -> AppResult<Arc<BackendClient>> {
        self.client
            .get_or_try_init(|| self.create_client())
            .await
            .cloned()
    }

    async fn create_client(&self) -> AppResult<Arc<BackendClient>> {
        let result = self
            .config_source
            .load()
            .map_err(AppError::from)
            .and_then(|config| build_client(&config, self.storage.clone()).map_err(AppError::from));

        match result {
            Ok(client) => {
                let client = Arc::new(client);
                let handle = register_listener(&self.app_state, client.clone(), self.outcomes.clone());
                *self.lock_listener() = Some(handle);
                Ok(client)
            }
            Err(e) => {
                error!("Failed to create backend client: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    pub fn listener_registered(&self) -> bool {
        self.lock_listener()
            .as_ref()
            .map(ListenerHandle::is_active)
            .unwrap_or(false)
    }

    pub fn app_state(&self) -> &AppStateEvents {
        &self.app_state
    }

    /// Receiver for foreground refresh outcomes.
    pub fn refresh_events(&self) -> broadcast::Receiver<RefreshOutcome> {
        self.outcomes.subscribe()
    }

    /// Foreground refresh outcomes as a stream.
    pub fn refresh_outcomes(&self) -> impl Stream<Item = RefreshOutcome> {
        let mut rx = self.outcomes.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(outcome) => yield outcome,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Refresh outcome stream lagged, skipped {}", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Unregister the lifecycle listener and stop background refresh.
    pub fn shutdown(&self) {
        if let Some(handle) = self.lock_listener().take() {
            handle.dispose();
        }
        if let Some(client) = self.client.get() {
            client.auth().stop_auto_refresh();
        }
        info!("Client manager shut down");
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<ListenerHandle>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
