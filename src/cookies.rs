//! Cookie jar access.
//!
//! [`CookieStore`] is the seam between the session layer and whatever cookie
//! jar the page has. In a browser that is `document.cookie`
//! (see [`DocumentCookieStore`](crate::browser::DocumentCookieStore)); tests
//! and native clients use [`MemoryCookieStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use cookie::{Cookie, SameSite};
use time::OffsetDateTime;

/// Error returned by a cookie jar write.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Attributes applied to a cookie write.
///
/// `http_only` can be requested, but page script cannot set `HttpOnly`
/// cookies; a browser jar ignores such writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieOptions {
    pub expires: OffsetDateTime,
    pub secure: bool,
    pub same_site: SameSite,
    pub http_only: bool,
}

impl CookieOptions {
    /// `SameSite=Strict`, no `HttpOnly`.
    #[must_use]
    pub fn new(expires: OffsetDateTime, secure: bool) -> Self {
        Self {
            expires,
            secure,
            same_site: SameSite::Strict,
            http_only: false,
        }
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }
}

/// Build a root-path cookie carrying `options`.
pub(crate) fn build_cookie(name: &str, value: &str, options: &CookieOptions) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .path("/")
        .same_site(options.same_site)
        .secure(options.secure)
        .http_only(options.http_only)
        .expires(options.expires)
        .build()
}

/// Build an empty cookie that expired at the epoch, forcing deletion.
pub(crate) fn removal_cookie(name: &str, options: &CookieOptions) -> Cookie<'static> {
    Cookie::build((name.to_string(), String::new()))
        .path("/")
        .same_site(options.same_site)
        .secure(options.secure)
        .http_only(options.http_only)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// A page's cookie jar.
///
/// Reads and writes are synchronous. A missing cookie is not an error.
pub trait CookieStore: Send + Sync {
    /// Decoded value of the cookie `name`, if the jar holds a live one.
    fn read(&self, name: &str) -> Option<String>;

    /// Write a single cookie. An expired cookie deletes any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the jar rejects the write.
    fn write(&self, cookie: Cookie<'static>) -> Result<(), StoreError>;

    /// Whether the page is served over an encrypted transport.
    fn is_secure_context(&self) -> bool;

    /// Alias for [`read`](Self::read).
    fn get(&self, name: &str) -> Option<String> {
        self.read(name)
    }

    /// Write `name=value` with path `/` and the given attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the jar rejects the write.
    fn set(&self, name: &str, value: &str, options: &CookieOptions) -> Result<(), StoreError> {
        self.write(build_cookie(name, value, options))
    }

    /// Delete `name` by writing an already-expired cookie with matching attributes.
    ///
    /// # Errors
    ///
    /// Returns an error if the jar rejects the write.
    fn remove(&self, name: &str, options: &CookieOptions) -> Result<(), StoreError> {
        self.write(removal_cookie(name, options))
    }
}

impl<T: CookieStore + ?Sized> CookieStore for Arc<T> {
    fn read(&self, name: &str) -> Option<String> {
        (**self).read(name)
    }

    fn write(&self, cookie: Cookie<'static>) -> Result<(), StoreError> {
        (**self).write(cookie)
    }

    fn is_secure_context(&self) -> bool {
        (**self).is_secure_context()
    }
}

#[derive(Debug, Default)]
struct MemoryJar {
    cookies: HashMap<String, Cookie<'static>>,
    headers: HashMap<String, String>,
    secure: bool,
    fail_writes: bool,
    writes: usize,
}

/// In-memory cookie jar that behaves like a browser's: expired cookies are
/// dropped, values go through the percent-encoded wire form.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    jar: Mutex<MemoryJar>,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an encrypted transport, so session cookies get `Secure`.
    #[must_use]
    pub fn with_secure(self, secure: bool) -> Self {
        self.lock().secure = secure;
        self
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Last header written for `name`, in `Set-Cookie` form.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock().headers.get(name).cloned()
    }

    /// Expiry of the live cookie `name`.
    #[must_use]
    pub fn expires(&self, name: &str) -> Option<OffsetDateTime> {
        self.lock()
            .cookies
            .get(name)
            .and_then(Cookie::expires_datetime)
    }

    /// Names of all live cookies, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let jar = self.lock();
        let now = OffsetDateTime::now_utc();
        let mut names: Vec<String> = jar
            .cookies
            .values()
            .filter(|c| !is_expired(c, now))
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }

    /// Number of successful writes, including deletions.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryJar> {
        self.jar.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_expired(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    cookie.expires_datetime().is_some_and(|at| at <= now)
}

impl CookieStore for MemoryCookieStore {
    fn read(&self, name: &str) -> Option<String> {
        let jar = self.lock();
        jar.cookies
            .get(name)
            .filter(|c| !is_expired(c, OffsetDateTime::now_utc()))
            .map(|c| c.value().to_string())
    }

    fn write(&self, cookie: Cookie<'static>) -> Result<(), StoreError> {
        let mut jar = self.lock();
        if jar.fail_writes {
            return Err("cookie jar rejected the write".into());
        }

        let header = cookie.encoded().to_string();
        let stored = Cookie::parse_encoded(header.clone())?;
        let name = stored.name().to_string();

        if is_expired(&stored, OffsetDateTime::now_utc()) {
            jar.cookies.remove(&name);
        } else {
            jar.cookies.insert(name.clone(), stored);
        }
        jar.headers.insert(name, header);
        jar.writes += 1;
        Ok(())
    }

    fn is_secure_context(&self) -> bool {
        self.lock().secure
    }
}
