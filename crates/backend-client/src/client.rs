//! Backend HTTP client.

use crate::auth::AuthClient;
use crate::error::ClientError;
use crate::options::ClientOptions;
use crate::schema::Table;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

const LOG_PREVIEW_CHARS: usize = 200;

/// Client for the managed backend.
///
/// Cloning is cheap and every clone shares one connection pool and one
/// auth session. The public key is stored using `SecretString` to prevent
/// accidental exposure in logs or debug output.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    base_url: Url,
    rest_url: Url,
    api_key: SecretString,
    options: ClientOptions,
    auth: AuthClient,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("url", &self.inner.base_url.as_str())
            .field("schema", &self.inner.options.db.schema)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    /// Create a new backend client.
    pub fn new(
        url: impl AsRef<str>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(url.as_ref())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let api_key = SecretString::new(api_key.into());
        let headers = default_headers(&api_key, &options)?;

        let http = Client::builder()
            .default_headers(headers)
            .timeout(options.global.timeout)
            .build()?;

        let rest_url = base_url.join("rest/v1/")?;
        let auth = AuthClient::new(http.clone(), &base_url, options.auth.clone())?;

        debug!(
            "Backend client for {} (schema={}, flow={:?})",
            base_url, options.db.schema, options.auth.flow_type
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                rest_url,
                api_key,
                options,
                auth,
            }),
        })
    }

    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn rest_url(&self) -> &Url {
        &self.inner.rest_url
    }

    pub fn schema(&self) -> &str {
        &self.inner.options.db.schema
    }

    /// Websocket endpoint for realtime subscriptions, carrying the
    /// configured event rate cap.
    pub fn realtime_endpoint(&self) -> Result<Url, ClientError> {
        let mut url = self.inner.base_url.join("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always a permitted scheme change
        let _ = url.set_scheme(scheme);

        url.query_pairs_mut()
            .append_pair("apikey", self.inner.api_key.expose_secret())
            .append_pair(
                "eventsPerSecond",
                &self.inner.options.realtime.events_per_second.to_string(),
            )
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    /// Query builder for table `T`.
    pub fn from<T: Table>(&self) -> TableQuery<T> {
        TableQuery {
            client: self.clone(),
            _table: PhantomData,
        }
    }

    /// Request with the caller's access token if signed in, else the public key.
    async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = match self.inner.auth.access_token().await {
            Some(token) => token,
            None => self.inner.api_key.expose_secret().clone(),
        };

        let profile_header = if method == Method::GET || method == Method::HEAD {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };

        self.inner
            .http
            .request(method, url)
            .bearer_auth(bearer)
            .header(profile_header, &self.inner.options.db.schema)
    }

    /// Handle HTTP response, converting errors appropriately.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            debug!("Response body: {}", log_preview(&body, LOG_PREVIEW_CHARS));
            serde_json::from_str(&body).map_err(ClientError::from)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract error information from failed response.
    async fn extract_error(&self, response: reqwest::Response) -> ClientError {
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("Authentication failed");
                ClientError::Unauthorized
            }
            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".into());
                ClientError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}

/// First `max_chars` characters of `body`, cut on a char boundary.
pub(crate) fn log_preview(body: &str, max_chars: usize) -> &str {
    body.char_indices()
        .nth(max_chars)
        .map_or(body, |(i, _)| &body[..i])
}

fn default_headers(api_key: &SecretString, options: &ClientOptions) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();

    let mut key = header_value("apikey", api_key.expose_secret())?;
    key.set_sensitive(true);
    headers.insert("apikey", key);

    let mut bearer = header_value(
        "Authorization",
        &format!("Bearer {}", api_key.expose_secret()),
    )?;
    bearer.set_sensitive(true);
    headers.insert(reqwest::header::AUTHORIZATION, bearer);

    for (name, value) in &options.global.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader {
                name: name.clone(),
                message: e.to_string(),
            })?;
        headers.insert(header_name, header_value(name, value)?);
    }

    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Row operations against one table.
pub struct TableQuery<T> {
    client: BackendClient,
    _table: PhantomData<fn() -> T>,
}

impl<T: Table> TableQuery<T> {
    fn endpoint(&self) -> Result<Url, ClientError> {
        Ok(self.client.inner.rest_url.join(T::NAME)?)
    }

    /// Fetch every visible row.
    #[instrument(skip(self), fields(table = T::NAME))]
    pub async fn select_all(&self) -> Result<Vec<T::Row>, ClientError> {
        let response = self
            .client
            .request(Method::GET, self.endpoint()?)
            .await
            .query(&[("select", "*")])
            .send()
            .await?;

        self.client.handle_response(response).await
    }

    /// Fetch rows where `column` equals `value`.
    #[instrument(skip(self), fields(table = T::NAME))]
    pub async fn select_eq(&self, column: &str, value: &str) -> Result<Vec<T::Row>, ClientError> {
        let filter = format!("eq.{}", value);
        let response = self
            .client
            .request(Method::GET, self.endpoint()?)
            .await
            .query(&[("select", "*"), (column, filter.as_str())])
            .send()
            .await?;

        self.client.handle_response(response).await
    }

    /// Insert a row and return it as stored.
    #[instrument(skip(self, row), fields(table = T::NAME))]
    pub async fn insert(&self, row: &T::Insert) -> Result<Vec<T::Row>, ClientError> {
        let response = self
            .client
            .request(Method::POST, self.endpoint()?)
            .await
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        self.client.handle_response(response).await
    }

    /// Apply `patch` to rows where `column` equals `value`.
    #[instrument(skip(self, patch), fields(table = T::NAME))]
    pub async fn update_eq(
        &self,
        column: &str,
        value: &str,
        patch: &T::Update,
    ) -> Result<Vec<T::Row>, ClientError> {
        let filter = format!("eq.{}", value);
        let response = self
            .client
            .request(Method::PATCH, self.endpoint()?)
            .await
            .query(&[(column, filter.as_str())])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;

        self.client.handle_response(response).await
    }

    /// Delete rows where `column` equals `value`.
    #[instrument(skip(self), fields(table = T::NAME))]
    pub async fn delete_eq(&self, column: &str, value: &str) -> Result<(), ClientError> {
        let filter = format!("eq.{}", value);
        let response = self
            .client
            .request(Method::DELETE, self.endpoint()?)
            .await
            .query(&[(column, filter.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.client.extract_error(response).await);
        }
        Ok(())
    }
}
