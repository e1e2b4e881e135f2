#![doc = include_str!("../README.md")]

pub mod backend;
#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod context;
pub mod cookies;
pub mod error;
pub mod service;
pub mod session;
pub mod token;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use backend::{AuthBackend, AuthResponse, BackendError, Credentials, IssuedTokens};
#[cfg(feature = "browser")]
pub use browser::{DocumentCookieStore, LocationNavigator};
pub use config::{AuthConfig, ExpiryUnit, TokenKeys};
pub use context::{AuthContext, AuthProvider, Navigator};
pub use cookie::SameSite;
pub use cookies::{CookieOptions, CookieStore, MemoryCookieStore, StoreError};
pub use error::Error;
pub use service::{AuthService, SignIn};
pub use session::SessionStore;
pub use token::{DecodedToken, decode, decode_opaque, encode_opaque, is_token_valid};
pub use types::{AuthState, AuthStatus, AuthUser, SessionInfo, TokenSet, UserId};
