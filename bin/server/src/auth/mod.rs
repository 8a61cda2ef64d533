//! Authentication module for the goboard server.
//!
//! This module provides:
//! - OIDC Authorization Code + PKCE login against an external identity provider
//! - In-memory session management with transparent access-token refresh
//! - ID-token verification on every authenticated request
//! - Authentication middleware and the `CurrentUser` extractor for Axum routes
//!
//! # Session model
//!
//! The session cookie carries an opaque identifier. The session record holds
//! the provider's tokens; the user's identity is decoded from the stored ID
//! token on each request and never cached. Any failure on an established
//! session invalidates it.

pub mod middleware;
pub mod oidc;
pub mod refresh;
pub mod routes;
pub mod store;
pub mod verifier;

use axum_extra::extract::cookie::{Cookie, SameSite};
use goboard_access::{AuthConfig, SessionId};
use std::sync::Arc;

pub use middleware::{CurrentUser, Resolution, authenticate, resolve};
pub use oidc::{AuthorizationRequest, IdentityProvider, OidcProvider, ProviderError};
pub use refresh::{RefreshError, RefreshOutcome, TokenRefresher};
pub use routes::{AuthFailure, callback, login, logout};
pub use store::{PendingRequestStore, SessionStore};
pub use verifier::{ClaimsError, ClaimsVerifier};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "X-Session-ID";

/// Shared authentication state.
pub struct AuthState {
    /// Authentication configuration.
    pub config: AuthConfig,
    /// The identity provider's endpoints.
    pub provider: Arc<dyn IdentityProvider>,
    /// ID-token verifier.
    pub verifier: Arc<ClaimsVerifier>,
    /// Active sessions.
    pub sessions: SessionStore,
    /// Logins awaiting their callback.
    pub pending: PendingRequestStore,
    /// Access-token refresher writing into `sessions`.
    pub refresher: TokenRefresher,
}

impl AuthState {
    /// Creates the authentication state with empty stores.
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        verifier: Arc<ClaimsVerifier>,
    ) -> Self {
        let sessions = SessionStore::new();
        let pending = PendingRequestStore::new(config.pending_ttl());
        let refresher =
            TokenRefresher::new(provider.clone(), sessions.clone(), config.refresh_timeout());
        Self {
            config,
            provider,
            verifier,
            sessions,
            pending,
            refresher,
        }
    }

    /// Builds the session cookie for `id`.
    #[must_use]
    pub fn session_cookie(&self, id: &SessionId) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, id.as_str().to_string()))
            .path("/")
            .http_only(true)
            .secure(self.config.secure_cookies())
            .same_site(SameSite::Lax)
            .build()
    }

    /// Builds a cookie that deletes the session cookie in the browser.
    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.config.secure_cookies())
            .same_site(SameSite::Lax)
            .max_age(time::Duration::ZERO)
            .build()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FakeProvider, test_auth_state};
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let auth = test_auth_state(Arc::new(FakeProvider::default()));
        let cookie = auth.session_cookie(&SessionId::from("abc"));

        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.max_age(), None);
    }

    #[test]
    fn removal_cookie_expires_immediately_with_same_attributes() {
        let auth = test_auth_state(Arc::new(FakeProvider::default()));
        let cookie = auth.removal_cookie();

        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
