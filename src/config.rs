use std::str::FromStr;

use time::Duration;
use url::Url;

use crate::error::Error;

/// Cookie names for each token slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKeys {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
}

impl TokenKeys {
    /// Only the access-token slot; refresh and token-type slots are not persisted.
    #[must_use]
    pub fn access_only(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
        }
    }

    /// Every slot name that may hold a cookie.
    pub(crate) fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.access_token.as_str())
            .chain(self.refresh_token.as_deref())
            .chain(self.token_type.as_deref())
    }
}

/// Unit of a configured session duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl ExpiryUnit {
    /// `value` units as a [`Duration`], or `None` on overflow.
    #[must_use]
    pub fn duration(self, value: i64) -> Option<Duration> {
        let unit_secs = match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        };
        value.checked_mul(unit_secs).map(Duration::seconds)
    }
}

impl FromStr for ExpiryUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Seconds),
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            _ => Err(Error::InvalidExpiryUnit(s.to_owned())),
        }
    }
}

/// Static auth configuration.
///
/// The access-token cookie name is the only required field. Everything else
/// has a default and can be overridden with the `with_*` methods.
///
/// ```rust,ignore
/// use tokenjar::{AuthConfig, TokenKeys};
///
/// let config = AuthConfig::new(TokenKeys::access_only("accessToken"))
///     .with_login_endpoint("https://api.example.com/auth/login".parse()?)
///     .with_expiry(30, "minutes");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub(crate) token_keys: TokenKeys,
    pub(crate) user_cookie: String,
    pub(crate) token_scheme: String,
    pub(crate) expiry_value: Option<i64>,
    pub(crate) expiry_unit: Option<String>,
    pub(crate) expiration_buffer: Duration,
    pub(crate) login_endpoint: Option<Url>,
    pub(crate) logout_endpoint: Option<Url>,
    pub(crate) refresh_endpoint: Option<Url>,
    pub(crate) current_user_endpoint: Option<Url>,
    pub(crate) login_redirect: String,
    pub(crate) logout_redirect: Option<String>,
    pub(crate) unauthorized_redirect: Option<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(token_keys: TokenKeys) -> Self {
        Self {
            token_keys,
            user_cookie: "user".into(),
            token_scheme: "Bearer".into(),
            expiry_value: None,
            expiry_unit: None,
            expiration_buffer: Duration::ZERO,
            login_endpoint: None,
            logout_endpoint: None,
            refresh_endpoint: None,
            current_user_endpoint: None,
            login_redirect: "/login".into(),
            logout_redirect: None,
            unauthorized_redirect: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `AUTH_ACCESS_TOKEN_COOKIE`: cookie name of the access token
    ///
    /// # Optional env vars
    /// - `AUTH_REFRESH_TOKEN_COOKIE`, `AUTH_TOKEN_TYPE_COOKIE`, `AUTH_USER_COOKIE`
    /// - `AUTH_TOKEN_SCHEME`: token type label (default `Bearer`)
    /// - `AUTH_EXPIRY_VALUE` + `AUTH_EXPIRY_UNIT`: fixed session duration
    /// - `AUTH_EXPIRATION_BUFFER_SECS`: treat tokens as expired this early
    /// - `AUTH_LOGIN_URL`, `AUTH_LOGOUT_URL`, `AUTH_REFRESH_URL`, `AUTH_CURRENT_USER_URL`
    /// - `AUTH_LOGIN_REDIRECT`, `AUTH_LOGOUT_REDIRECT`, `AUTH_UNAUTHORIZED_REDIRECT`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let access = lookup("AUTH_ACCESS_TOKEN_COOKIE")
            .ok_or_else(|| Error::Config("AUTH_ACCESS_TOKEN_COOKIE is required".into()))?;

        let keys = TokenKeys {
            access_token: access,
            refresh_token: lookup("AUTH_REFRESH_TOKEN_COOKIE"),
            token_type: lookup("AUTH_TOKEN_TYPE_COOKIE"),
        };
        let mut config = Self::new(keys);

        if let Some(name) = lookup("AUTH_USER_COOKIE") {
            config = config.with_user_cookie(name);
        }
        if let Some(scheme) = lookup("AUTH_TOKEN_SCHEME") {
            config = config.with_token_scheme(scheme);
        }
        if let Some(value) = lookup("AUTH_EXPIRY_VALUE") {
            let value: i64 = value
                .parse()
                .map_err(|e| Error::Config(format!("AUTH_EXPIRY_VALUE: {e}")))?;
            config.expiry_value = Some(value);
        }
        config.expiry_unit = lookup("AUTH_EXPIRY_UNIT");
        if let Some(secs) = lookup("AUTH_EXPIRATION_BUFFER_SECS") {
            let secs: i64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("AUTH_EXPIRATION_BUFFER_SECS: {e}")))?;
            config = config.with_expiration_buffer(Duration::seconds(secs));
        }

        let url = |key: &str| -> Result<Option<Url>, Error> {
            lookup(key)
                .map(|s| s.parse::<Url>().map_err(|e| Error::Config(format!("{key}: {e}"))))
                .transpose()
        };
        config.login_endpoint = url("AUTH_LOGIN_URL")?;
        config.logout_endpoint = url("AUTH_LOGOUT_URL")?;
        config.refresh_endpoint = url("AUTH_REFRESH_URL")?;
        config.current_user_endpoint = url("AUTH_CURRENT_USER_URL")?;

        if let Some(path) = lookup("AUTH_LOGIN_REDIRECT") {
            config = config.with_login_redirect(path);
        }
        config.logout_redirect = lookup("AUTH_LOGOUT_REDIRECT");
        config.unauthorized_redirect = lookup("AUTH_UNAUTHORIZED_REDIRECT");

        Ok(config)
    }

    /// Cookie that holds the opaque-encoded user blob (default `user`).
    #[must_use]
    pub fn with_user_cookie(mut self, name: impl Into<String>) -> Self {
        self.user_cookie = name.into();
        self
    }

    /// Token type label written to the token-type slot (default `Bearer`).
    #[must_use]
    pub fn with_token_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.token_scheme = scheme.into();
        self
    }

    /// Persist cookies for a fixed duration instead of the token's own `exp`.
    ///
    /// The unit is checked when a session is persisted: `seconds`, `minutes`,
    /// `hours` or `days`.
    #[must_use]
    pub fn with_expiry(mut self, value: i64, unit: impl Into<String>) -> Self {
        self.expiry_value = Some(value);
        self.expiry_unit = Some(unit.into());
        self
    }

    /// Treat tokens as expired this long before their `exp` claim.
    #[must_use]
    pub fn with_expiration_buffer(mut self, buffer: Duration) -> Self {
        self.expiration_buffer = buffer;
        self
    }

    #[must_use]
    pub fn with_login_endpoint(mut self, url: Url) -> Self {
        self.login_endpoint = Some(url);
        self
    }

    #[must_use]
    pub fn with_logout_endpoint(mut self, url: Url) -> Self {
        self.logout_endpoint = Some(url);
        self
    }

    #[must_use]
    pub fn with_refresh_endpoint(mut self, url: Url) -> Self {
        self.refresh_endpoint = Some(url);
        self
    }

    #[must_use]
    pub fn with_current_user_endpoint(mut self, url: Url) -> Self {
        self.current_user_endpoint = Some(url);
        self
    }

    /// Where unauthenticated visitors are sent (default `/login`).
    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.login_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.logout_redirect = Some(path.into());
        self
    }

    /// Where visitors go after a failed refresh or user lookup signed them out.
    #[must_use]
    pub fn with_unauthorized_redirect(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_redirect = Some(path.into());
        self
    }

    #[must_use]
    pub fn token_keys(&self) -> &TokenKeys {
        &self.token_keys
    }

    #[must_use]
    pub fn user_cookie(&self) -> &str {
        &self.user_cookie
    }

    #[must_use]
    pub fn token_scheme(&self) -> &str {
        &self.token_scheme
    }

    #[must_use]
    pub fn expiration_buffer(&self) -> Duration {
        self.expiration_buffer
    }

    #[must_use]
    pub fn login_endpoint(&self) -> Option<&Url> {
        self.login_endpoint.as_ref()
    }

    #[must_use]
    pub fn logout_endpoint(&self) -> Option<&Url> {
        self.logout_endpoint.as_ref()
    }

    #[must_use]
    pub fn refresh_endpoint(&self) -> Option<&Url> {
        self.refresh_endpoint.as_ref()
    }

    #[must_use]
    pub fn current_user_endpoint(&self) -> Option<&Url> {
        self.current_user_endpoint.as_ref()
    }

    #[must_use]
    pub fn login_redirect(&self) -> &str {
        &self.login_redirect
    }

    #[must_use]
    pub fn logout_redirect(&self) -> Option<&str> {
        self.logout_redirect.as_deref()
    }

    /// Falls back to the login redirect when no dedicated target is set.
    #[must_use]
    pub fn unauthorized_redirect(&self) -> &str {
        self.unauthorized_redirect
            .as_deref()
            .unwrap_or(&self.login_redirect)
    }

    /// Fixed session duration, or `None` to derive expiry from the token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExpiryUnit`] if a value is configured without a
    /// unit or with an unrecognized one, [`Error::Config`] if the duration
    /// does not fit.
    pub fn expiry_duration(&self) -> Result<Option<Duration>, Error> {
        let Some(value) = self.expiry_value else {
            return Ok(None);
        };
        let unit: ExpiryUnit = self
            .expiry_unit
            .as_deref()
            .ok_or_else(|| Error::InvalidExpiryUnit("unit is required with an expiry value".into()))?
            .parse()?;
        unit.duration(value)
            .map(Some)
            .ok_or_else(|| Error::Config(format!("expiry of {value} {unit:?} is out of range")))
    }
}
