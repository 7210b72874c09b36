//! App foreground/background transitions and the hook that resumes
//! session refresh when the app comes back to the foreground.

use async_trait::async_trait;
use backend_client::{BackendClient, ClientError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 16;

/// Host application state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown app state: {0}")]
pub struct UnknownAppState(pub String);

impl FromStr for AppState {
    type Err = UnknownAppState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AppState::Active),
            "inactive" => Ok(AppState::Inactive),
            "background" => Ok(AppState::Background),
            other => Err(UnknownAppState(other.to_string())),
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppState::Active => "active",
            AppState::Inactive => "inactive",
            AppState::Background => "background",
        };
        f.write_str(s)
    }
}

/// Stream of app state changes fed by the host.
#[derive(Clone)]
pub struct AppStateEvents {
    tx: broadcast::Sender<AppState>,
}

impl AppStateEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Publish a transition. Returns how many listeners received it.
    pub fn publish(&self, state: AppState) -> usize {
        self.tx.send(state).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppState> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AppStateEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Something whose background session refresh can be resumed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRefresh: Send + Sync {
    async fn resume_session_refresh(&self) -> Result<(), ClientError>;
}

#[async_trait]
impl SessionRefresh for BackendClient {
    async fn resume_session_refresh(&self) -> Result<(), ClientError> {
        self.auth().start_auto_refresh().await?;
        Ok(())
    }
}

/// Result of one foreground-triggered refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Resumed,
    Failed(String),
}

/// Disposer for a registered lifecycle listener. Dropping it also
/// unregisters the listener.
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop listening for app state changes.
    pub fn dispose(mut self) {
        self.abort();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Lifecycle listener disposed");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Listen for app state changes and resume session refresh on every
/// transition to the foreground.
///
/// Refresh failures are logged and published on `outcomes`; they never end
/// the listener.
pub fn register_listener(
    events: &AppStateEvents,
    target: Arc<dyn SessionRefresh>,
    outcomes: broadcast::Sender<RefreshOutcome>,
) -> ListenerHandle {
    // Subscribe before spawning so no transition published after this call
    // is missed.
    let mut rx = events.subscribe();

    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AppState::Active) => on_foreground(target.as_ref(), &outcomes).await,
                Ok(state) => debug!("App state changed to {}, nothing to do", state),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Lifecycle listener lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    debug!("App state stream closed");
                    break;
                }
            }
        }
    });

    info!("Lifecycle listener registered");
    ListenerHandle { task: Some(task) }
}

async fn on_foreground(target: &dyn SessionRefresh, outcomes: &broadcast::Sender<RefreshOutcome>) {
    let outcome = match target.resume_session_refresh().await {
        Ok(()) => {
            info!("Session refresh resumed");
            RefreshOutcome::Resumed
        }
        Err(e) => {
            error!("Error resuming session refresh: {}", e);
            RefreshOutcome::Failed(e.to_string())
        }
    };

    // Nobody listening for outcomes is fine.
    let _ = outcomes.send(outcome);
}
