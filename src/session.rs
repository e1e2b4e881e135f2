use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::config::AuthConfig;
use crate::cookies::{CookieOptions, CookieStore};
use crate::error::Error;
use crate::token;
use crate::types::{AuthUser, SessionInfo, TokenSet};

/// Persists sessions as cookies: one per token slot plus the opaque user blob.
///
/// Writes fail loud, reads fail open: a corrupt cookie reads as "no session".
pub struct SessionStore<C> {
    cookies: C,
    config: Arc<AuthConfig>,
}

impl<C: CookieStore> SessionStore<C> {
    #[must_use]
    pub fn new(cookies: C, config: Arc<AuthConfig>) -> Self {
        Self { cookies, config }
    }

    #[must_use]
    pub fn cookies(&self) -> &C {
        &self.cookies
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// When cookies for `tokens` should expire: the configured duration from
    /// now, or the access token's own `exp`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidExpiryUnit`] for a bad duration unit,
    /// [`Error::InvalidTokenFormat`] if the expiry must come from a token
    /// that does not decode, [`Error::SessionPersist`] if the expiry lands
    /// outside the representable date range.
    pub fn session_expiry(&self, tokens: &TokenSet) -> Result<OffsetDateTime, Error> {
        match self.config.expiry_duration()? {
            Some(duration) => OffsetDateTime::now_utc().checked_add(duration).ok_or_else(|| {
                Error::SessionPersist(format!("session expiry {duration} from now is out of range"))
            }),
            None => token::decode(&tokens.access_token)?.expires_at(),
        }
    }

    /// Write every configured slot of `session`, all sharing one expiry.
    ///
    /// Nothing is written unless the expiry and user blob could be computed.
    /// Configured slots the session leaves empty (refresh token, user) are
    /// removed so no earlier session's values survive. If the jar rejects a
    /// write part-way, the slots already written are cleared again.
    ///
    /// # Errors
    ///
    /// See [`session_expiry`](Self::session_expiry); jar failures are
    /// [`Error::SessionPersist`].
    pub fn persist(&self, session: &SessionInfo) -> Result<(), Error> {
        let expires = self.session_expiry(&session.tokens)?;
        let user_blob = session
            .user
            .as_ref()
            .map(token::encode_opaque)
            .transpose()
            .map_err(|e| Error::SessionPersist(e.to_string()))?;

        // `None` deletes the slot.
        let keys = &self.config.token_keys;
        let mut writes: Vec<(&str, Option<String>)> =
            vec![(keys.access_token.as_str(), Some(session.tokens.access_token.clone()))];
        if let Some(name) = &keys.refresh_token {
            writes.push((name.as_str(), session.tokens.refresh_token.clone()));
        }
        if let Some(name) = &keys.token_type {
            let label = session
                .tokens
                .token_type
                .clone()
                .unwrap_or_else(|| self.config.token_scheme.clone());
            writes.push((name.as_str(), Some(label)));
        }
        writes.push((self.config.user_cookie.as_str(), user_blob));

        let options = self.options(expires);
        for (name, value) in writes {
            let result = match &value {
                Some(value) => self.cookies.set(name, value, &options),
                None => self.cookies.remove(name, &options),
            };
            if let Err(e) = result {
                self.clear();
                return Err(Error::SessionPersist(format!("writing cookie '{name}': {e}")));
            }
        }
        Ok(())
    }

    /// The persisted session, or `None` if absent or unreadable.
    #[must_use]
    pub fn load(&self) -> Option<SessionInfo> {
        match self.try_load() {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unreadable session cookies");
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<SessionInfo>, Error> {
        let keys = &self.config.token_keys;
        let Some(access_token) = self.access_token() else {
            return Ok(None);
        };

        let tokens = TokenSet {
            access_token,
            refresh_token: keys.refresh_token.as_deref().and_then(|n| self.read(n)),
            token_type: keys.token_type.as_deref().and_then(|n| self.read(n)),
        };
        let user = self
            .read(&self.config.user_cookie)
            .map(|blob| token::decode_opaque::<AuthUser>(&blob))
            .transpose()?;

        Ok(Some(SessionInfo { tokens, user }))
    }

    /// The raw access-token cookie.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read(&self.config.token_keys.access_token)
    }

    /// The raw refresh-token cookie, if that slot is configured.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read(self.config.token_keys.refresh_token.as_deref()?)
    }

    /// Whether the access-token cookie holds a token that is still valid.
    #[must_use]
    pub fn has_valid_token(&self) -> bool {
        self.access_token()
            .is_some_and(|t| token::is_token_valid(&t, self.config.expiration_buffer))
    }

    /// Remove every token slot and the user cookie.
    ///
    /// Never fails: a slot the jar refuses to delete is logged and skipped.
    pub fn clear(&self) {
        let options = self.options(OffsetDateTime::UNIX_EPOCH);
        let names = self
            .config
            .token_keys
            .all()
            .chain(std::iter::once(self.config.user_cookie.as_str()));
        for name in names {
            if let Err(e) = self.cookies.remove(name, &options) {
                tracing::warn!(cookie = %name, error = %e, "Failed to remove session cookie");
            }
        }
    }

    /// How long until the persisted access token expires, if it decodes.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let decoded = token::decode(&self.access_token()?).ok()?;
        Some(decoded.expires_at().ok()? - OffsetDateTime::now_utc())
    }

    fn read(&self, name: &str) -> Option<String> {
        self.cookies.get(name).filter(|v| !v.is_empty())
    }

    fn options(&self, expires: OffsetDateTime) -> CookieOptions {
        CookieOptions::new(expires, self.cookies.is_secure_context())
    }
}
