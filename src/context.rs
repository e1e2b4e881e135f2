//! Handing the auth service to the rest of an application.
//!
//! An [`AuthProvider`] owns one [`AuthService`] and a [`Navigator`]. Consumers
//! receive an [`AuthContext`] handle; a default-constructed handle stands for
//! "rendered outside any provider" and refuses every access.
//!
//! ```rust,ignore
//! let provider = AuthProvider::new(AuthService::new(config, cookies, backend), navigator);
//! provider.mount().await;            // restore, then redirect if signed out
//!
//! let auth = provider.context();
//! if auth.auth()?.is_authenticated() { /* ... */ }
//! ```

use std::sync::Arc;

use crate::backend::AuthBackend;
use crate::cookies::CookieStore;
use crate::error::Error;
use crate::service::AuthService;
use crate::types::{AuthStatus, AuthUser};

/// Client-side routing.
pub trait Navigator: Send + Sync {
    /// Send the visitor to `location`.
    fn redirect(&self, location: &str);

    /// Path currently displayed, used to avoid redirecting to the same page.
    fn current_path(&self) -> Option<String> {
        None
    }
}

/// Handle to the provider's [`AuthService`].
pub struct AuthContext<C, B> {
    service: Option<Arc<AuthService<C, B>>>,
}

impl<C, B> AuthContext<C, B> {
    /// The auth service.
    ///
    /// # Errors
    ///
    /// [`Error::ContextUnavailable`] if this handle did not come from a provider.
    pub fn auth(&self) -> Result<&AuthService<C, B>, Error> {
        self.service.as_deref().ok_or(Error::ContextUnavailable)
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.service.is_some()
    }
}

impl<C, B> Default for AuthContext<C, B> {
    fn default() -> Self {
        Self { service: None }
    }
}

// Manual Clone: avoid derive adding `C: Clone, B: Clone` bounds.
impl<C, B> Clone for AuthContext<C, B> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

/// Owns the auth service for one mount and guards it with redirects.
pub struct AuthProvider<C, B, N> {
    service: Arc<AuthService<C, B>>,
    navigator: N,
}

impl<C: CookieStore, B: AuthBackend, N: Navigator> AuthProvider<C, B, N> {
    #[must_use]
    pub fn new(service: AuthService<C, B>, navigator: N) -> Self {
        Self {
            service: Arc::new(service),
            navigator,
        }
    }

    /// Run session restoration, then [`render`](Self::render).
    pub async fn mount(&self) -> AuthStatus {
        self.service.restore().await;
        self.render()
    }

    /// Re-evaluate the session; redirect to the login page if signed out.
    ///
    /// Does nothing while restoration is still running.
    pub fn render(&self) -> AuthStatus {
        let status = self.service.check_expiry();
        if status == AuthStatus::Unauthenticated {
            self.redirect(self.service.config().login_redirect());
        }
        status
    }

    /// A handle for consumers below this provider.
    #[must_use]
    pub fn context(&self) -> AuthContext<C, B> {
        AuthContext {
            service: Some(Arc::clone(&self.service)),
        }
    }

    #[must_use]
    pub fn service(&self) -> &AuthService<C, B> {
        &self.service
    }

    #[must_use]
    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Sign out, then go to the logout page if one is configured.
    pub async fn sign_out(&self) {
        self.service.sign_out().await;
        if let Some(target) = self.service.config().logout_redirect() {
            self.redirect(target);
        }
    }

    /// [`AuthService::refresh_token`], sending the visitor to the
    /// unauthorized page if the refresh signed them out.
    ///
    /// # Errors
    ///
    /// Whatever the service returns.
    pub async fn refresh_token(&self) -> Result<(), Error> {
        let result = self.service.refresh_token().await;
        if matches!(result, Err(Error::RefreshFailed(_))) {
            self.redirect_unauthorized("refresh_failed");
        }
        result
    }

    /// [`AuthService::get_current_user`], sending the visitor to the
    /// unauthorized page if the lookup signed them out.
    ///
    /// # Errors
    ///
    /// Whatever the service returns.
    pub async fn get_current_user(&self) -> Result<Option<AuthUser>, Error> {
        let result = self.service.get_current_user().await;
        if matches!(result, Err(Error::UserFetchFailed(_))) {
            self.redirect_unauthorized("user_fetch_failed");
        }
        result
    }

    fn redirect_unauthorized(&self, code: &str) {
        let encoded = urlencoding::encode(code);
        let target = format!("{}?error={encoded}", self.service.config().unauthorized_redirect());
        self.redirect(&target);
    }

    fn redirect(&self, location: &str) {
        let target_path = location.split(['?', '#']).next().unwrap_or(location);
        if self
            .navigator
            .current_path()
            .is_some_and(|current| current == target_path)
        {
            return;
        }
        tracing::debug!(location = %location, "Redirecting");
        self.navigator.redirect(location);
    }
}
