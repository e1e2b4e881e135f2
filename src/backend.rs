//! The HTTP boundary: login, logout, refresh and current-user lookups.
//!
//! [`AuthService`](crate::AuthService) only talks to an [`AuthBackend`].
//! With the `http` feature, [`HttpBackend`] implements it over `reqwest`;
//! anything else (a `gloo-net` client in a WASM app, a test double) can
//! implement the trait directly.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

use crate::types::{AuthUser, TokenSet};

/// Credential payload posted to the login endpoint as-is.
pub type Credentials = JsonValue;

/// Errors from the HTTP boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("{operation} failed with status {status}: {detail}")]
    Status {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Tokens as the login and refresh endpoints return them: a bare `token`
/// or a full `tokens` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssuedTokens {
    Set { tokens: TokenSet },
    Single { token: String },
}

/// Body of a successful login or refresh response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub issued: IssuedTokens,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
}

impl AuthResponse {
    #[must_use]
    pub fn new(tokens: TokenSet, user: Option<AuthUser>) -> Self {
        Self {
            issued: IssuedTokens::Set { tokens },
            user,
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (TokenSet, Option<AuthUser>) {
        let tokens = match self.issued {
            IssuedTokens::Set { tokens } => tokens,
            IssuedTokens::Single { token } => TokenSet::new(token),
        };
        (tokens, self.user)
    }
}

/// Consumer-replaceable transport for the auth endpoints.
///
/// Every call receives the endpoint URL from [`AuthConfig`](crate::AuthConfig);
/// the service only calls endpoints that are configured.
///
/// # Example
///
/// ```rust,ignore
/// impl AuthBackend for MyClient {
///     async fn login(&self, endpoint: &Url, credentials: &Credentials)
///         -> Result<AuthResponse, BackendError>
///     {
///         self.post_json(endpoint, credentials).await
///     }
///     // ...
/// }
/// ```
pub trait AuthBackend: Send + Sync + 'static {
    /// Exchange credentials for tokens (and usually a user).
    fn login(
        &self,
        endpoint: &Url,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<AuthResponse, BackendError>> + Send;

    /// Tell the server the bearer credential is done with.
    fn logout(
        &self,
        endpoint: &Url,
        bearer: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Exchange the bearer credential for fresh tokens.
    fn refresh(
        &self,
        endpoint: &Url,
        bearer: &str,
    ) -> impl Future<Output = Result<AuthResponse, BackendError>> + Send;

    /// Fetch the user the bearer credential belongs to.
    fn current_user(
        &self,
        endpoint: &Url,
        bearer: &str,
    ) -> impl Future<Output = Result<AuthUser, BackendError>> + Send;
}

/// [`AuthBackend`] over `reqwest`.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpBackend {
    http: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, BackendError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            operation,
            status,
            detail,
        })
    }
}

#[cfg(feature = "http")]
impl AuthBackend for HttpBackend {
    async fn login(
        &self,
        endpoint: &Url,
        credentials: &Credentials,
    ) -> Result<AuthResponse, BackendError> {
        let response = self
            .http
            .post(endpoint.clone())
            .json(credentials)
            .send()
            .await?;

        let response = Self::ensure_success(response, "login").await?;
        response.json::<AuthResponse>().await.map_err(Into::into)
    }

    async fn logout(&self, endpoint: &Url, bearer: &str) -> Result<(), BackendError> {
        let response = self
            .http
            .post(endpoint.clone())
            .bearer_auth(bearer)
            .send()
            .await?;

        Self::ensure_success(response, "logout").await?;
        Ok(())
    }

    async fn refresh(&self, endpoint: &Url, bearer: &str) -> Result<AuthResponse, BackendError> {
        let response = self
            .http
            .post(endpoint.clone())
            .bearer_auth(bearer)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token refresh").await?;
        response.json::<AuthResponse>().await.map_err(Into::into)
    }

    async fn current_user(&self, endpoint: &Url, bearer: &str) -> Result<AuthUser, BackendError> {
        let response = self
            .http
            .get(endpoint.clone())
            .bearer_auth(bearer)
            .send()
            .await?;

        let response = Self::ensure_success(response, "current user request").await?;
        response.json::<AuthUser>().await.map_err(Into::into)
    }
}
