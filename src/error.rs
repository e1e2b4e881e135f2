/// Errors raised by the session and auth layers.
///
/// Malformed input (`InvalidTokenFormat`, `InvalidExpiryUnit`) surfaces
/// directly to the caller. Boundary failures during refresh or user lookup
/// are raised only after the local session has been cleared.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),

    #[error("invalid expiry unit: {0}")]
    InvalidExpiryUnit(String),

    #[error("invalid opaque value: {0}")]
    InvalidOpaqueValue(String),

    /// Writing the session to the cookie store failed.
    #[error("failed to persist session: {0}")]
    SessionPersist(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("failed to get user data, please sign in again: {0}")]
    UserFetchFailed(String),

    #[error("token refresh failed, please sign in again: {0}")]
    RefreshFailed(String),

    #[error("no valid token to refresh or refresh endpoint not configured")]
    RefreshNotAvailable,

    /// An [`AuthContext`](crate::AuthContext) was used outside any provider.
    #[error("auth context used outside of an AuthProvider")]
    ContextUnavailable,

    #[error("configuration error: {0}")]
    Config(String),
}
