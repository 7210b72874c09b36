//! Session handling and background token refresh.

use crate::error::AuthError;
use crate::options::{AuthOptions, FlowType};
use crate::pkce::PkceChallenge;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Interval between background refresh checks.
pub const AUTO_REFRESH_TICK: Duration = Duration::from_secs(30);

/// A session is refreshed once it expires within this many ticks.
pub const AUTO_REFRESH_TICK_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Access/refresh token pair issued by the auth server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: i64,
    /// Unix seconds. Filled in from `expires_in` when the server omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Session {
    /// Whether the access token expires within `margin` of `now`.
    /// Sessions without a known expiry are treated as expiring.
    pub fn expires_within(&self, now: i64, margin: Duration) -> bool {
        match self.expires_at {
            Some(at) => at - now <= margin.as_secs() as i64,
            None => true,
        }
    }

    fn stamp_expiry(&mut self, now: i64) {
        if self.expires_at.is_none() {
            self.expires_at = Some(now + self.expires_in);
        }
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Auth half of the backend client.
///
/// Cloning is cheap; clones share the session and the refresh ticker.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    http: Client,
    auth_url: Url,
    options: AuthOptions,
    storage_key: String,
    session: RwLock<Option<Session>>,
    /// Held for the whole refresh exchange; the server rotates the refresh
    /// token, so two exchanges must never overlap.
    refresh_lock: AsyncMutex<()>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for AuthInner {
    fn drop(&mut self) {
        let ticker = self
            .ticker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = ticker.take() {
            handle.abort();
        }
    }
}

impl AuthClient {
    pub(crate) fn new(http: Client, base_url: &Url, options: AuthOptions) -> Result<Self, AuthError> {
        let auth_url = base_url.join("auth/v1/")?;
        let storage_key = options
            .storage_key
            .clone()
            .unwrap_or_else(|| default_storage_key(base_url));

        Ok(Self {
            inner: Arc::new(AuthInner {
                http,
                auth_url,
                options,
                storage_key,
                session: RwLock::new(None),
                refresh_lock: AsyncMutex::new(()),
                ticker: Mutex::new(None),
            }),
        })
    }

    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    pub fn options(&self) -> &AuthOptions {
        &self.inner.options
    }

    fn code_verifier_key(&self) -> String {
        format!("{}-code-verifier", self.inner.storage_key)
    }

    /// Current session, falling back to persisted storage.
    pub async fn session(&self) -> Result<Option<Session>, AuthError> {
        if let Some(session) = self.inner.session.read().await.clone() {
            return Ok(Some(session));
        }
        self.load_session().await
    }

    /// Access token of the in-memory session, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Read the persisted session into memory.
    #[instrument(skip(self))]
    pub async fn load_session(&self) -> Result<Option<Session>, AuthError> {
        if !self.inner.options.persist_session {
            return Ok(None);
        }

        let Some(raw) = self
            .inner
            .options
            .storage
            .get_item(&self.inner.storage_key)
            .await?
        else {
            return Ok(None);
        };

        let session: Session = serde_json::from_str(&raw)?;
        debug!("Loaded persisted session");
        *self.inner.session.write().await = Some(session.clone());
        Ok(Some(session))
    }

    /// Replace the current session, persisting it when enabled.
    #[instrument(skip(self, session))]
    pub async fn set_session(&self, mut session: Session) -> Result<(), AuthError> {
        session.stamp_expiry(chrono::Utc::now().timestamp());

        if self.inner.options.persist_session {
            let raw = serde_json::to_string(&session)?;
            self.inner
                .options
                .storage
                .set_item(&self.inner.storage_key, &raw)
                .await?;
        }

        *self.inner.session.write().await = Some(session);
        Ok(())
    }

    /// Forget the session locally without contacting the server.
    #[instrument(skip(self))]
    pub async fn sign_out_local(&self) -> Result<(), AuthError> {
        self.inner.session.write().await.take();
        let storage = &self.inner.options.storage;
        storage.remove_item(&self.inner.storage_key).await?;
        storage.remove_item(&self.code_verifier_key()).await?;
        Ok(())
    }

    /// Exchange the refresh token for a new session.
    ///
    /// Refreshes are serialized, so a caller waiting on one in flight sends
    /// the rotated token rather than the stale one.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.exchange_refresh_token().await
    }

    async fn exchange_refresh_token(&self) -> Result<Session, AuthError> {
        let current = self.session().await?.ok_or(AuthError::NoSession)?;

        let mut url = self.inner.auth_url.join("token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .inner
            .http
            .post(url)
            .json(&RefreshRequest {
                refresh_token: &current.refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());

            // The refresh token itself was rejected; the session is dead.
            if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
                warn!("Refresh token rejected, clearing session");
                self.sign_out_local().await?;
            }

            return Err(AuthError::RefreshFailed {
                status: status.as_u16(),
                message,
            });
        }

        let session: Session = response.json().await?;
        self.set_session(session.clone()).await?;
        debug!("Session refreshed");

        self.session().await?.ok_or(AuthError::NoSession)
    }

    /// Start (or restart) the background refresh ticker.
    ///
    /// Runs one refresh check immediately and returns its result; the ticker
    /// keeps running either way.
    #[instrument(skip(self))]
    pub async fn start_auto_refresh(&self) -> Result<(), AuthError> {
        if !self.inner.options.auto_refresh_token {
            debug!("Auto refresh disabled, not starting ticker");
            return Ok(());
        }

        self.stop_auto_refresh();

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(auto_refresh_loop(weak));
        *self.lock_ticker() = Some(handle);

        info!("Auto refresh started");
        self.refresh_tick().await
    }

    /// Stop the background refresh ticker if running.
    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.lock_ticker().take() {
            handle.abort();
            debug!("Auto refresh stopped");
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.lock_ticker()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn lock_ticker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .ticker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refresh the session if it is close to expiring.
    async fn refresh_tick(&self) -> Result<(), AuthError> {
        // Checked under the lock so a tick queued behind another refresh
        // sees the new expiry.
        let _guard = self.inner.refresh_lock.lock().await;

        let Some(session) = self.session().await? else {
            debug!("No session to refresh");
            return Ok(());
        };

        let margin = AUTO_REFRESH_TICK * AUTO_REFRESH_TICK_THRESHOLD;
        if session.expires_within(chrono::Utc::now().timestamp(), margin) {
            self.exchange_refresh_token().await?;
        }
        Ok(())
    }

    /// Generate a PKCE challenge and persist its verifier for the later
    /// code exchange.
    #[instrument(skip(self))]
    pub async fn prepare_pkce(&self) -> Result<PkceChallenge, AuthError> {
        if self.inner.options.flow_type != FlowType::Pkce {
            return Err(AuthError::PkceDisabled);
        }

        let challenge = PkceChallenge::generate();
        self.inner
            .options
            .storage
            .set_item(
                &self.code_verifier_key(),
                challenge.code_verifier.expose_secret(),
            )
            .await?;
        Ok(challenge)
    }

    /// Stored PKCE verifier, if a flow is in progress.
    pub async fn code_verifier(&self) -> Result<Option<String>, AuthError> {
        self.inner
            .options
            .storage
            .get_item(&self.code_verifier_key())
            .await
    }

    /// Pick up a session from a redirect URL fragment
    /// (`#access_token=...&refresh_token=...&expires_in=...`).
    ///
    /// Returns `None` when detection is disabled or the URL carries no
    /// session.
    #[instrument(skip(self, url))]
    pub async fn session_from_url(&self, url: &Url) -> Result<Option<Session>, AuthError> {
        if !self.inner.options.detect_session_in_url {
            return Ok(None);
        }

        let Some(fragment) = url.fragment() else {
            return Ok(None);
        };

        let params: std::collections::HashMap<String, String> =
            url::form_urlencoded::parse(fragment.as_bytes())
                .into_owned()
                .collect();

        let (Some(access_token), Some(refresh_token), Some(expires_in)) = (
            params.get("access_token"),
            params.get("refresh_token"),
            params.get("expires_in").and_then(|v| v.parse::<i64>().ok()),
        ) else {
            return Ok(None);
        };

        let session = Session {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            token_type: params
                .get("token_type")
                .cloned()
                .unwrap_or_else(default_token_type),
            expires_in,
            expires_at: params.get("expires_at").and_then(|v| v.parse().ok()),
            user: None,
        };

        self.set_session(session).await?;
        self.session().await
    }
}

async fn auto_refresh_loop(inner: Weak<AuthInner>) {
    let mut ticker = interval_at(Instant::now() + AUTO_REFRESH_TICK, AUTO_REFRESH_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let auth = AuthClient { inner };
        if let Err(e) = auth.refresh_tick().await {
            warn!("Auto refresh tick failed: {}", e);
        }
    }
}

/// `sb-<first host label>-auth-token`
fn default_storage_key(base_url: &Url) -> String {
    let project_ref = base_url
        .host_str()
        .and_then(|h| h.split('.').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("default");
    format!("sb-{}-auth-token", project_ref)
}
