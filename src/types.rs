use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Identifier of the signed-in user (opaque string).
///
/// The backend chooses the format; this crate only carries it around.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub String);

/// The signed-in user: an `id` plus whatever attributes the backend returns.
///
/// Serialized flat, so `{"id": "u1", "name": "Ann"}` round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(flatten)]
    pub attributes: Map<String, JsonValue>,
}

impl AuthUser {
    /// Create a user with no attributes besides the id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            attributes: Map::new(),
        }
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Gets an attribute by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&JsonValue> {
        self.attributes.get(key)
    }
}

/// Credential tokens issued by the backend.
///
/// Only ever persisted as cookie values.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl TokenSet {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// A persisted session: the token set plus an optional user snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub tokens: TokenSet,
    pub user: Option<AuthUser>,
}

impl SessionInfo {
    #[must_use]
    pub fn new(tokens: TokenSet) -> Self {
        Self { tokens, user: None }
    }

    #[must_use]
    pub fn with_user(mut self, user: AuthUser) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }
}

/// Where the auth state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum AuthStatus {
    /// Initial session restoration has not finished yet.
    #[default]
    Loading,
    Authenticated,
    Unauthenticated,
}

/// In-memory auth state published to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub user: Option<AuthUser>,
    pub tokens: Option<TokenSet>,
}

impl AuthState {
    pub(crate) fn authenticated(tokens: TokenSet, user: Option<AuthUser>) -> Self {
        Self {
            status: AuthStatus::Authenticated,
            user,
            tokens: Some(tokens),
        }
    }

    pub(crate) fn unauthenticated() -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            user: None,
            tokens: None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == AuthStatus::Loading
    }
}
