//! Bookkeeping for logins that have been started but not yet completed.

use chrono::{DateTime, Duration, Utc};

use crate::session::random_token;

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
// RFC 7636 allows 43..=128 characters.
const PKCE_VERIFIER_LEN: usize = 64;

/// Fresh random values for one login attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    /// CSRF token round-tripped through the identity provider.
    pub state: String,
    /// Value the provider must embed in the ID token.
    pub nonce: String,
    /// PKCE code verifier; only its SHA-256 challenge leaves the server.
    pub pkce_verifier: String,
}

impl LoginChallenge {
    /// Generates three independent random values.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            state: random_token(STATE_LEN),
            nonce: random_token(NONCE_LEN),
            pkce_verifier: random_token(PKCE_VERIFIER_LEN),
        }
    }
}

impl std::fmt::Debug for LoginChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginChallenge")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// What the callback needs to finish a login, keyed by `state`.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingAuthRequest {
    nonce: String,
    pkce_verifier: String,
    created_at: DateTime<Utc>,
}

impl PendingAuthRequest {
    /// Records the nonce and verifier of a login started now.
    #[must_use]
    pub fn new(nonce: String, pkce_verifier: String) -> Self {
        Self {
            nonce,
            pkce_verifier,
            created_at: Utc::now(),
        }
    }

    /// Returns the nonce expected in the ID token.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Returns the PKCE code verifier.
    #[must_use]
    pub fn pkce_verifier(&self) -> &str {
        &self.pkce_verifier
    }

    /// Returns when the login was started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true if the login is older than `ttl`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

impl From<&LoginChallenge> for PendingAuthRequest {
    fn from(challenge: &LoginChallenge) -> Self {
        Self::new(challenge.nonce.clone(), challenge.pkce_verifier.clone())
    }
}

impl std::fmt::Debug for PendingAuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthRequest")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_values_are_independent() {
        let challenge = LoginChallenge::generate();

        assert!(challenge.state.len() >= 16);
        assert!(challenge.pkce_verifier.len() >= 43);
        assert_ne!(challenge.state, challenge.nonce);
        assert_ne!(challenge.nonce, challenge.pkce_verifier);
        assert!(challenge.state.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn pending_request_copies_nonce_and_verifier() {
        let challenge = LoginChallenge::generate();
        let pending = PendingAuthRequest::from(&challenge);

        assert_eq!(pending.nonce(), challenge.nonce);
        assert_eq!(pending.pkce_verifier(), challenge.pkce_verifier);
    }

    #[test]
    fn expiry_is_measured_from_creation() {
        let pending = PendingAuthRequest::new("n".to_string(), "v".to_string());
        let ttl = Duration::minutes(10);

        assert!(!pending.is_expired(pending.created_at() + Duration::minutes(9), ttl));
        assert!(pending.is_expired(pending.created_at() + Duration::minutes(11), ttl));
    }
}
