//! Session records for logged-in browsers.
//!
//! A session is created after a successful OIDC callback and holds the token
//! material issued by the identity provider. The raw ID token is kept so the
//! identity can be re-verified on every request.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of generated session identifiers.
const SESSION_ID_LEN: usize = 48;

/// Unique identifier for a session.
///
/// Session IDs are opaque strings used as the session cookie value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session ID from a string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(random_token(SESSION_ID_LEN))
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Generates a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Tokens returned by the identity provider's token endpoint.
///
/// The ID token is required: a response without one is a failed exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// The OAuth2 access token.
    pub access_token: String,
    /// The refresh token, if the provider issued one.
    pub refresh_token: Option<String>,
    /// When the access token expires, if the provider said so.
    pub expiry: Option<DateTime<Utc>>,
    /// The compact-serialized ID token.
    pub id_token: String,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expiry", &self.expiry)
            .field("id_token", &"[redacted]")
            .finish()
    }
}

/// An active browser login.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    refresh_token: Option<String>,
    expiry: Option<DateTime<Utc>>,
    id_token: String,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session from a successful code exchange.
    #[must_use]
    pub fn from_tokens(tokens: TokenSet) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.filter(|t| !t.is_empty()),
            expiry: tokens.expiry,
            id_token: tokens.id_token,
            created_at: Utc::now(),
        }
    }

    /// Returns the OAuth2 access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns when the access token expires. `None` means it does not expire.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// Returns the raw ID token.
    #[must_use]
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true if the access token has expired or expires within `leeway`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        self.expiry.is_some_and(|expiry| expiry - leeway <= now)
    }

    /// Returns true if the session can never yield a valid access token again.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token.is_none() && self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Replaces the token material after a refresh.
    ///
    /// Providers that do not rotate refresh tokens omit them from the
    /// response; the previous refresh token stays valid in that case.
    pub fn apply_refresh(&mut self, tokens: TokenSet) {
        self.access_token = tokens.access_token;
        self.expiry = tokens.expiry;
        self.id_token = tokens.id_token;
        if let Some(refresh_token) = tokens.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(refresh_token);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("expiry", &self.expiry)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
