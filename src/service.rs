use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::{AuthBackend, Credentials};
use crate::config::AuthConfig;
use crate::cookies::CookieStore;
use crate::error::Error;
use crate::session::SessionStore;
use crate::types::{AuthState, AuthStatus, AuthUser, SessionInfo, TokenSet};

/// How to sign in.
#[derive(Debug, Clone)]
pub enum SignIn {
    /// Post these credentials to the login endpoint.
    Credentials(Credentials),
    /// Adopt tokens obtained elsewhere; no network call.
    Tokens {
        tokens: TokenSet,
        user: Option<AuthUser>,
    },
}

impl SignIn {
    #[must_use]
    pub fn tokens(tokens: TokenSet) -> Self {
        Self::Tokens { tokens, user: None }
    }
}

/// Session manager for one page / provider mount.
///
/// Cookies are the source of truth for [`is_authenticated`](Self::is_authenticated);
/// the in-memory [`AuthState`] mirrors them and is published to subscribers.
/// Every mutating operation updates both.
///
/// Overlapping calls are not deduplicated. Two concurrent
/// [`refresh_token`](Self::refresh_token) calls both hit the network and the
/// last one to persist wins.
pub struct AuthService<C, B> {
    config: Arc<AuthConfig>,
    sessions: SessionStore<C>,
    backend: B,
    state: watch::Sender<AuthState>,
}

impl<C: CookieStore, B: AuthBackend> AuthService<C, B> {
    /// Create a service in the [`Loading`](AuthStatus::Loading) state.
    ///
    /// Call [`restore`](Self::restore) (or use [`connect`](Self::connect)) to
    /// pick up a persisted session.
    #[must_use]
    pub fn new(config: AuthConfig, cookies: C, backend: B) -> Self {
        let config = Arc::new(config);
        let (state, _) = watch::channel(AuthState::default());
        Self {
            sessions: SessionStore::new(cookies, Arc::clone(&config)),
            config,
            backend,
            state,
        }
    }

    /// Create a service and run the restoration pass.
    pub async fn connect(config: AuthConfig, cookies: C, backend: B) -> Self {
        let service = Self::new(config, cookies, backend);
        service.restore().await;
        service
    }

    /// Restore the persisted session, if any, and leave `Loading`.
    ///
    /// An expired or unreadable session is cleared. With a current-user
    /// endpoint configured the user is fetched fresh; if that fails the
    /// session is signed out.
    pub async fn restore(&self) {
        let Some(session) = self.sessions.load().filter(|_| self.is_authenticated()) else {
            if self.sessions.access_token().is_some() {
                tracing::debug!("Discarding stale session cookies");
                self.sessions.clear();
            }
            self.set_state(AuthState::unauthenticated());
            return;
        };

        let mut user = session.user;
        if let Some(endpoint) = &self.config.current_user_endpoint {
            match self
                .backend
                .current_user(endpoint, &session.tokens.access_token)
                .await
            {
                Ok(fresh) => user = Some(fresh),
                Err(e) => {
                    tracing::warn!(error = %e, "User lookup failed during session restore");
                    self.sign_out().await;
                    return;
                }
            }
        }

        tracing::debug!("Session restored");
        self.set_state(AuthState::authenticated(session.tokens, user));
    }

    /// Sign in with credentials or a pre-obtained token set.
    ///
    /// Returns the user the login endpoint (or caller) supplied.
    ///
    /// # Errors
    ///
    /// [`Error::LoginFailed`] if the login endpoint is missing or rejects the
    /// credentials; persistence errors from
    /// [`SessionStore::persist`] otherwise.
    pub async fn sign_in(&self, request: SignIn) -> Result<Option<AuthUser>, Error> {
        let (tokens, user) = match request {
            SignIn::Tokens { tokens, user } => (tokens, user),
            SignIn::Credentials(credentials) => {
                let Some(endpoint) = &self.config.login_endpoint else {
                    self.settle_after_failure();
                    return Err(Error::LoginFailed("login endpoint not configured".into()));
                };
                match self.backend.login(endpoint, &credentials).await {
                    Ok(response) => response.into_parts(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Login request failed");
                        self.settle_after_failure();
                        return Err(Error::LoginFailed(e.to_string()));
                    }
                }
            }
        };

        let session = SessionInfo { tokens, user };
        if let Err(e) = self.sessions.persist(&session) {
            tracing::warn!(error = %e, "Failed to persist session on sign-in");
            self.settle_after_failure();
            return Err(e);
        }

        tracing::info!(
            user_id = ?session.user.as_ref().map(|u| &u.id),
            "Signed in"
        );
        let user = session.user.clone();
        self.set_state(AuthState::authenticated(session.tokens, session.user));
        Ok(user)
    }

    /// Sign out locally, telling the logout endpoint on a best-effort basis.
    ///
    /// Never fails: an unreachable logout endpoint is logged and the local
    /// session is cleared regardless.
    pub async fn sign_out(&self) {
        if let Some(endpoint) = &self.config.logout_endpoint {
            let bearer = self.sessions.access_token().or_else(|| {
                self.state
                    .borrow()
                    .tokens
                    .as_ref()
                    .map(|t| t.access_token.clone())
            });
            match bearer {
                Some(bearer) => {
                    if let Err(e) = self.backend.logout(endpoint, &bearer).await {
                        tracing::warn!(error = %e, "Logout endpoint error");
                    }
                }
                None => tracing::debug!("No credential to send to the logout endpoint"),
            }
        }

        self.sessions.clear();
        self.set_state(AuthState::unauthenticated());
        tracing::info!("Signed out");
    }

    /// Whether the access-token cookie holds an unexpired token.
    ///
    /// Reads one cookie; no network I/O and no state change.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.sessions.has_valid_token()
    }

    /// The persisted session, if it is currently valid.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionInfo> {
        if self.is_authenticated() {
            self.sessions.load()
        } else {
            None
        }
    }

    /// The current user, fetched fresh when a current-user endpoint is configured.
    ///
    /// Returns `None` when not authenticated. Without an endpoint, returns the
    /// in-memory user (falling back to the one persisted with the session).
    ///
    /// # Errors
    ///
    /// [`Error::UserFetchFailed`] if the lookup fails; the session has been
    /// signed out by then.
    pub async fn get_current_user(&self) -> Result<Option<AuthUser>, Error> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        let Some(access_token) = self.sessions.access_token() else {
            return Ok(None);
        };
        let Some(endpoint) = &self.config.current_user_endpoint else {
            return Ok(self
                .user()
                .or_else(|| self.sessions.load().and_then(|s| s.user)));
        };

        match self.backend.current_user(endpoint, &access_token).await {
            Ok(user) => {
                let tokens = self
                    .sessions
                    .load()
                    .map_or_else(|| TokenSet::new(access_token), |s| s.tokens);
                self.set_state(AuthState::authenticated(tokens, Some(user.clone())));
                Ok(Some(user))
            }
            Err(e) => {
                tracing::warn!(error = %e, "User lookup failed, signing out");
                self.sign_out().await;
                Err(Error::UserFetchFailed(e.to_string()))
            }
        }
    }

    /// Exchange the current credential for fresh tokens.
    ///
    /// The stored refresh token is sent as the bearer credential when there
    /// is one, the access token otherwise. A refresh token the response does
    /// not rotate is kept, and so is the user if the response omits it.
    ///
    /// # Errors
    ///
    /// [`Error::RefreshNotAvailable`] without a valid token or refresh
    /// endpoint (no network call is made). [`Error::RefreshFailed`] if the
    /// refresh or persisting its result fails; the session has been signed
    /// out by then.
    pub async fn refresh_token(&self) -> Result<(), Error> {
        let Some(endpoint) = &self.config.refresh_endpoint else {
            return Err(Error::RefreshNotAvailable);
        };
        if !self.is_authenticated() {
            return Err(Error::RefreshNotAvailable);
        }
        let Some(access_token) = self.sessions.access_token() else {
            return Err(Error::RefreshNotAvailable);
        };
        let previous_refresh = self.sessions.refresh_token();
        let bearer = previous_refresh.clone().unwrap_or(access_token);

        let refreshed = match self.backend.refresh(endpoint, &bearer).await {
            Ok(response) => {
                let (mut tokens, user) = response.into_parts();
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = previous_refresh;
                }
                let session = SessionInfo {
                    tokens,
                    user: user.or_else(|| self.user()),
                };
                self.sessions
                    .persist(&session)
                    .map(|()| session)
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match refreshed {
            Ok(session) => {
                tracing::info!("Access token refreshed");
                self.set_state(AuthState::authenticated(session.tokens, session.user));
                Ok(())
            }
            Err(reason) => {
                tracing::warn!(error = %reason, "Token refresh failed, signing out");
                self.sign_out().await;
                Err(Error::RefreshFailed(reason))
            }
        }
    }

    /// Bring memory in line with the cookie: an authenticated state whose
    /// token has expired (or vanished) is cleared.
    pub fn check_expiry(&self) -> AuthStatus {
        if self.status() == AuthStatus::Authenticated && !self.is_authenticated() {
            tracing::info!("Session expired");
            self.sessions.clear();
            self.set_state(AuthState::unauthenticated());
        }
        self.status()
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.state.borrow().status
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn tokens(&self) -> Option<TokenSet> {
        self.state.borrow().tokens.clone()
    }

    /// Receive every state change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore<C> {
        &self.sessions
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn set_state(&self, next: AuthState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!(from = %current.status, to = %next.status, "Auth state change");
            *current = next;
            true
        });
    }

    /// After a failed sign-in: keep a still-valid session, otherwise settle
    /// on unauthenticated.
    fn settle_after_failure(&self) {
        if self.status() == AuthStatus::Authenticated {
            self.check_expiry();
        } else {
            self.set_state(AuthState::unauthenticated());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use time::{Duration, OffsetDateTime};
    use url::Url;

    use super::*;
    use crate::backend::AuthResponse;
    use crate::backend::tests::ScriptedBackend;
    use crate::config::TokenKeys;
    use crate::cookies::{CookieOptions, MemoryCookieStore};
    use crate::token::tests::mint_expiring_in;

    type TestService = AuthService<MemoryCookieStore, ScriptedBackend>;

    fn endpoint(path: &str) -> Url {
        format!("https://api.example.com/auth/{path}").parse().unwrap()
    }

    fn keys() -> TokenKeys {
        TokenKeys {
            access_token: "accessToken".into(),
            refresh_token: Some("refreshToken".into()),
            token_type: Some("tokenType".into()),
        }
    }

    fn base_config() -> AuthConfig {
        AuthConfig::new(keys())
            .with_login_endpoint(endpoint("login"))
            .with_logout_endpoint(endpoint("logout"))
    }

    fn full_config() -> AuthConfig {
        base_config()
            .with_refresh_endpoint(endpoint("refresh"))
            .with_current_user_endpoint(endpoint("me"))
    }

    fn valid_token() -> String {
        mint_expiring_in(Duration::hours(1))
    }

    /// A service still `Loading`, with `session` already in its cookie jar.
    fn seeded(config: AuthConfig, session: &SessionInfo, backend: ScriptedBackend) -> TestService {
        let service = TestService::new(config, MemoryCookieStore::new(), backend);
        service.sessions().persist(session).unwrap();
        service
    }

    async fn signed_in(config: AuthConfig) -> (TestService, String) {
        let service = TestService::connect(config, MemoryCookieStore::new(), ScriptedBackend::default()).await;
        let access = valid_token();
        let tokens = TokenSet::new(&access).with_refresh_token("refresh-1");
        service
            .sign_in(SignIn::Tokens {
                tokens,
                user: Some(AuthUser::new("u-1")),
            })
            .await
            .unwrap();
        (service, access)
    }

    fn cookie_names(service: &TestService) -> Vec<String> {
        service.sessions().cookies().names()
    }

    #[tokio::test]
    async fn test_new_service_is_loading() {
        let service = TestService::new(base_config(), MemoryCookieStore::new(), ScriptedBackend::default());
        assert_eq!(service.status(), AuthStatus::Loading);
    }

    #[tokio::test]
    async fn test_restore_without_cookies_is_unauthenticated() {
        let service =
            TestService::connect(full_config(), MemoryCookieStore::new(), ScriptedBackend::default()).await;

        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(service.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_adopts_persisted_session() {
        let config = base_config();
        let access = valid_token();
        let session = SessionInfo::new(TokenSet::new(&access)).with_user(AuthUser::new("u-1"));
        let service = seeded(config, &session, ScriptedBackend::default());

        service.restore().await;

        assert_eq!(service.status(), AuthStatus::Authenticated);
        assert_eq!(service.user(), Some(AuthUser::new("u-1")));
        assert_eq!(service.tokens().unwrap().access_token, access);
    }

    #[tokio::test]
    async fn test_restore_discards_expired_session() {
        let config = base_config().with_expiry(1, "hours");
        let expired = mint_expiring_in(Duration::minutes(-1));
        let service = seeded(config, &SessionInfo::new(TokenSet::new(expired)), ScriptedBackend::default());

        service.restore().await;

        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
    }

    #[tokio::test]
    async fn test_restore_fetches_fresh_user() {
        let config = full_config();
        let session = SessionInfo::new(TokenSet::new(valid_token())).with_user(AuthUser::new("stale"));
        let backend = ScriptedBackend::default();
        *backend.user.lock().unwrap() = Some(AuthUser::new("u-1").with_attribute("name", "Ann"));
        let service = seeded(config, &session, backend);

        service.restore().await;

        assert_eq!(service.status(), AuthStatus::Authenticated);
        assert_eq!(service.user().unwrap().attribute("name"), Some(&json!("Ann")));
    }

    #[tokio::test]
    async fn test_restore_signs_out_when_user_lookup_fails() {
        let config = full_config();
        let service = seeded(
            config,
            &SessionInfo::new(TokenSet::new(valid_token())),
            ScriptedBackend::default(),
        );

        service.restore().await;

        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
        assert_eq!(service.backend().count("logout"), 1);
    }

    #[tokio::test]
    async fn test_sign_in_with_credentials() {
        let service =
            TestService::connect(base_config(), MemoryCookieStore::new(), ScriptedBackend::default()).await;
        let access = valid_token();
        *service.backend().login.lock().unwrap() =
            Some(AuthResponse::new(TokenSet::new(&access), Some(AuthUser::new("u-1"))));

        let user = service
            .sign_in(SignIn::Credentials(json!({ "email": "ann@example.com", "password": "pw" })))
            .await
            .unwrap();

        assert_eq!(user, Some(AuthUser::new("u-1")));
        assert_eq!(service.status(), AuthStatus::Authenticated);
        assert!(service.is_authenticated());
        assert_eq!(
            service.backend().calls(),
            vec![("login", endpoint("login").to_string())]
        );
        assert_eq!(service.current_session().unwrap().access_token(), access);
    }

    #[tokio::test]
    async fn test_sign_in_rejected_credentials() {
        let service =
            TestService::connect(base_config(), MemoryCookieStore::new(), ScriptedBackend::default()).await;

        let err = service
            .sign_in(SignIn::Credentials(json!({ "password": "wrong" })))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LoginFailed(_)));
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_without_login_endpoint() {
        let config = AuthConfig::new(keys());
        let service = TestService::new(config, MemoryCookieStore::new(), ScriptedBackend::default());

        let err = service
            .sign_in(SignIn::Credentials(json!({})))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LoginFailed(_)));
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(service.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_with_tokens_skips_network() {
        let (service, access) = signed_in(base_config()).await;

        assert!(service.backend().calls().is_empty());
        assert_eq!(service.status(), AuthStatus::Authenticated);
        assert_eq!(
            cookie_names(&service),
            vec!["accessToken", "refreshToken", "tokenType", "user"]
        );
        assert_eq!(service.sessions().access_token(), Some(access));
    }

    #[tokio::test]
    async fn test_second_sign_in_replaces_previous_session() {
        let (service, _) = signed_in(full_config()).await;
        let access = valid_token();
        service
            .sign_in(SignIn::tokens(TokenSet::new(&access)))
            .await
            .unwrap();
        *service.backend().refresh.lock().unwrap() =
            Some(AuthResponse::new(TokenSet::new(valid_token()), None));

        assert!(service.user().is_none());
        assert!(service.current_session().unwrap().user.is_none());

        service.refresh_token().await.unwrap();
        assert_eq!(service.backend().calls(), vec![("refresh", access)]);
    }

    #[tokio::test]
    async fn test_oversized_buffer_is_not_authenticated() {
        let config = base_config().with_expiration_buffer(Duration::seconds(i64::MAX / 4));
        let cookies = MemoryCookieStore::new();
        let options = CookieOptions::new(OffsetDateTime::now_utc() + Duration::hours(1), false);
        cookies.set("accessToken", &valid_token(), &options).unwrap();
        let service = TestService::new(config, cookies, ScriptedBackend::default());

        assert!(!service.is_authenticated());
        assert!(service.current_session().is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_fails_sign_in() {
        let config = base_config().with_expiry(3_000_000, "days");
        let service = TestService::connect(config, MemoryCookieStore::new(), ScriptedBackend::default()).await;

        let err = service
            .sign_in(SignIn::tokens(TokenSet::new(valid_token())))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SessionPersist(_)));
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_with_bad_expiry_unit() {
        let config = base_config().with_expiry(30, "weeks");
        let service = TestService::connect(config, MemoryCookieStore::new(), ScriptedBackend::default()).await;

        let err = service
            .sign_in(SignIn::tokens(TokenSet::new(valid_token())))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidExpiryUnit(_)));
        assert_eq!(service.sessions().cookies().write_count(), 0);
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_existing_session() {
        let (service, _) = signed_in(base_config()).await;

        let err = service
            .sign_in(SignIn::Credentials(json!({ "password": "wrong" })))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LoginFailed(_)));
        assert_eq!(service.status(), AuthStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_sign_out_clears_everything_when_logout_fails() {
        let (service, access) = signed_in(base_config()).await;
        service.backend().logout_fails.store(true, Ordering::SeqCst);

        service.sign_out().await;

        assert!(cookie_names(&service).is_empty());
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(service.user().is_none());
        assert!(service.tokens().is_none());
        assert_eq!(service.backend().calls(), vec![("logout", access)]);
    }

    #[tokio::test]
    async fn test_sign_out_without_logout_endpoint() {
        let (service, _) = signed_in(AuthConfig::new(keys())).await;

        service.sign_out().await;

        assert!(cookie_names(&service).is_empty());
        assert!(service.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_cookie_is_not_authenticated() {
        let cookies = MemoryCookieStore::new();
        let far_future = CookieOptions::new(OffsetDateTime::now_utc() + Duration::days(1), false);
        cookies
            .set("accessToken", &mint_expiring_in(Duration::minutes(-5)), &far_future)
            .unwrap();
        let service = TestService::new(base_config(), cookies, ScriptedBackend::default());

        assert!(service.sessions().access_token().is_some());
        assert!(!service.is_authenticated());
        assert!(service.current_session().is_none());
    }

    #[tokio::test]
    async fn test_expiration_buffer_applies() {
        let config = base_config().with_expiration_buffer(Duration::minutes(5));
        let service = TestService::connect(config, MemoryCookieStore::new(), ScriptedBackend::default()).await;
        service
            .sign_in(SignIn::tokens(TokenSet::new(mint_expiring_in(Duration::minutes(2)))))
            .await
            .unwrap();

        assert!(!service.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_when_unauthenticated_makes_no_call() {
        let service =
            TestService::connect(full_config(), MemoryCookieStore::new(), ScriptedBackend::default()).await;

        let err = service.refresh_token().await.unwrap_err();

        assert!(matches!(err, Error::RefreshNotAvailable));
        assert!(service.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_endpoint() {
        let (service, _) = signed_in(base_config()).await;

        let err = service.refresh_token().await.unwrap_err();

        assert!(matches!(err, Error::RefreshNotAvailable));
        assert_eq!(service.status(), AuthStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_refresh_persists_new_tokens() {
        let (service, _) = signed_in(full_config()).await;
        let fresh = mint_expiring_in(Duration::hours(2));
        *service.backend().refresh.lock().unwrap() =
            Some(AuthResponse::new(TokenSet::new(&fresh), None));

        service.refresh_token().await.unwrap();

        assert_eq!(service.backend().calls(), vec![("refresh", "refresh-1".to_string())]);
        assert_eq!(service.sessions().access_token(), Some(fresh.clone()));
        assert_eq!(service.sessions().refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(service.tokens().unwrap().access_token, fresh);
        assert_eq!(service.user(), Some(AuthUser::new("u-1")));
        assert_eq!(service.status(), AuthStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_refresh_failure_signs_out() {
        let (service, _) = signed_in(full_config()).await;

        let err = service.refresh_token().await.unwrap_err();

        assert!(matches!(err, Error::RefreshFailed(_)));
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
        assert_eq!(service.backend().count("logout"), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_unusable_token_signs_out() {
        let (service, _) = signed_in(full_config()).await;
        *service.backend().refresh.lock().unwrap() =
            Some(AuthResponse::new(TokenSet::new("not-a-jwt"), None));

        let err = service.refresh_token().await.unwrap_err();

        assert!(matches!(err, Error::RefreshFailed(_)));
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
    }

    #[tokio::test]
    async fn test_current_user_when_unauthenticated() {
        let service =
            TestService::connect(full_config(), MemoryCookieStore::new(), ScriptedBackend::default()).await;

        assert_eq!(service.get_current_user().await.unwrap(), None);
        assert!(service.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_current_user_failure_signs_out() {
        let (service, _) = signed_in(full_config()).await;

        let err = service.get_current_user().await.unwrap_err();

        assert!(matches!(err, Error::UserFetchFailed(_)));
        assert!(cookie_names(&service).is_empty());
        assert!(service.user().is_none());
        assert_eq!(service.status(), AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_current_user_updates_memory() {
        let (service, access) = signed_in(full_config()).await;
        let fresh = AuthUser::new("u-1").with_attribute("plan", "pro");
        *service.backend().user.lock().unwrap() = Some(fresh.clone());

        let user = service.get_current_user().await.unwrap();

        assert_eq!(user, Some(fresh.clone()));
        assert_eq!(service.user(), Some(fresh));
        assert_eq!(service.backend().calls(), vec![("current_user", access)]);
    }

    #[tokio::test]
    async fn test_current_user_without_endpoint_uses_memory() {
        let (service, _) = signed_in(base_config()).await;

        let user = service.get_current_user().await.unwrap();

        assert_eq!(user, Some(AuthUser::new("u-1")));
        assert!(service.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_check_expiry_clears_stale_state() {
        let (service, _) = signed_in(base_config()).await;
        let far_future = CookieOptions::new(OffsetDateTime::now_utc() + Duration::days(1), false);
        service
            .sessions()
            .cookies()
            .set("accessToken", &mint_expiring_in(Duration::minutes(-1)), &far_future)
            .unwrap();

        assert_eq!(service.check_expiry(), AuthStatus::Unauthenticated);
        assert!(cookie_names(&service).is_empty());
        assert!(service.user().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let service = TestService::new(base_config(), MemoryCookieStore::new(), ScriptedBackend::default());
        let mut rx = service.subscribe();
        assert!(rx.borrow_and_update().is_loading());

        service.restore().await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, AuthStatus::Unauthenticated);

        service
            .sign_in(SignIn::tokens(TokenSet::new(valid_token())))
            .await
            .unwrap();
        assert_eq!(rx.borrow_and_update().status, AuthStatus::Authenticated);
    }
}
