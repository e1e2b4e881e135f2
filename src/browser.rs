//! `document.cookie` and `window.location` bindings for WASM builds.
//!
//! Both types are zero-sized and look the window up on every call, so they
//! satisfy the `Send + Sync` bounds of [`CookieStore`] and [`Navigator`].
//!
//! [`HttpBackend`](crate::HttpBackend) futures are not `Send` on
//! `wasm32`; pair these with an [`AuthBackend`](crate::AuthBackend) built on
//! the page's own fetch client.

use cookie::Cookie;
use wasm_bindgen::JsCast;
use web_sys::HtmlDocument;

use crate::context::Navigator;
use crate::cookies::{CookieStore, StoreError};

fn html_document() -> Option<HtmlDocument> {
    web_sys::window()?.document()?.dyn_into::<HtmlDocument>().ok()
}

/// The current page's cookie jar.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCookieStore;

impl CookieStore for DocumentCookieStore {
    fn read(&self, name: &str) -> Option<String> {
        let jar = html_document()?.cookie().ok()?;
        jar.split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| Cookie::parse_encoded(pair.to_string()).ok())
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    fn write(&self, cookie: Cookie<'static>) -> Result<(), StoreError> {
        if cookie.http_only() == Some(true) {
            tracing::warn!(
                name = %cookie.name(),
                "HttpOnly cookies cannot be written from script; the browser will drop this write"
            );
        }
        let document = html_document().ok_or("no HTML document available")?;
        document
            .set_cookie(&cookie.encoded().to_string())
            .map_err(|e| format!("document.cookie write rejected: {e:?}").into())
    }

    fn is_secure_context(&self) -> bool {
        web_sys::window()
            .and_then(|w| w.location().protocol().ok())
            .is_some_and(|protocol| protocol == "https:")
    }
}

/// Full-page navigation through `window.location`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationNavigator;

impl Navigator for LocationNavigator {
    fn redirect(&self, location: &str) {
        let Some(window) = web_sys::window() else {
            return;
        };
        if let Err(e) = window.location().set_href(location) {
            tracing::warn!(error = ?e, location = %location, "Navigation failed");
        }
    }

    fn current_path(&self) -> Option<String> {
        web_sys::window()?.location().pathname().ok()
    }
}
