//! ID-token verification.
//!
//! The verifier is consulted at callback time (with the recorded nonce) and
//! on every authenticated request (without one), so a stored ID token that
//! has expired and was not refreshed fails closed.

use goboard_access::{AuthConfig, AuthenticationError, Identity};
use openidconnect::core::{
    CoreGenderClaim, CoreJsonWebKeySet, CoreJweContentEncryptionAlgorithm,
    CoreJwsSigningAlgorithm,
};
use openidconnect::{
    AdditionalClaims, Audience, ClaimsVerificationError, ClientId, ClientSecret, IdToken,
    IdTokenVerifier, IssuerUrl, Nonce, SignatureVerificationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::oidc::{IdentityProvider, OidcProvider};

/// Minimum time between two key-set fetches triggered by unknown key IDs.
pub const KEY_REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

/// Non-standard claims read from the ID token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupsClaims {
    #[serde(default)]
    pub groups: Vec<String>,
}

impl AdditionalClaims for GroupsClaims {}

/// ID token carrying the `groups` claim.
pub type GroupsIdToken = IdToken<
    GroupsClaims,
    CoreGenderClaim,
    CoreJweContentEncryptionAlgorithm,
    CoreJwsSigningAlgorithm,
>;

/// Why an ID token was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// The token is not a well-formed JWT.
    Malformed { details: String },
    /// The signature does not match the provider's keys.
    Signature { details: String },
    /// No known key matches the token's key ID and algorithm.
    UnknownKey { details: String },
    /// `iss` is not the configured issuer.
    Issuer { details: String },
    /// `aud` lacks the client ID or the required audience.
    Audience { details: String },
    /// `exp` is in the past.
    Expired { details: String },
    /// `nonce` differs from the one recorded at login.
    Nonce { details: String },
    /// Any other claim check failed.
    Invalid { details: String },
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { details } => write!(f, "malformed ID token: {details}"),
            Self::Signature { details } => write!(f, "ID token signature invalid: {details}"),
            Self::UnknownKey { details } => write!(f, "ID token signing key unknown: {details}"),
            Self::Issuer { details } => write!(f, "ID token issuer invalid: {details}"),
            Self::Audience { details } => write!(f, "ID token audience invalid: {details}"),
            Self::Expired { details } => write!(f, "ID token expired: {details}"),
            Self::Nonce { details } => write!(f, "ID token nonce invalid: {details}"),
            Self::Invalid { details } => write!(f, "ID token rejected: {details}"),
        }
    }
}

impl std::error::Error for ClaimsError {}

impl From<ClaimsVerificationError> for ClaimsError {
    fn from(error: ClaimsVerificationError) -> Self {
        let details = error.to_string();
        match error {
            ClaimsVerificationError::SignatureVerification(
                SignatureVerificationError::NoMatchingKey,
            ) => Self::UnknownKey { details },
            ClaimsVerificationError::SignatureVerification(_) => Self::Signature { details },
            ClaimsVerificationError::InvalidIssuer(_) => Self::Issuer { details },
            ClaimsVerificationError::InvalidAudience(_) => Self::Audience { details },
            ClaimsVerificationError::Expired(_) => Self::Expired { details },
            ClaimsVerificationError::InvalidNonce(_) => Self::Nonce { details },
            _ => Self::Invalid { details },
        }
    }
}

impl From<ClaimsError> for AuthenticationError {
    fn from(error: ClaimsError) -> Self {
        match error {
            ClaimsError::Nonce { .. } => Self::NonceMismatch,
            ClaimsError::Audience { details } => Self::AudienceMismatch { reason: details },
            other => Self::VerificationFailure {
                reason: other.to_string(),
            },
        }
    }
}

/// Verifies ID tokens against the provider's current signing keys.
pub struct ClaimsVerifier {
    client_id: ClientId,
    client_secret: ClientSecret,
    issuer: IssuerUrl,
    allowed_algs: Vec<CoreJwsSigningAlgorithm>,
    required_audience: Option<String>,
    keys: RwLock<CoreJsonWebKeySet>,
    last_refetch: Mutex<Option<Instant>>,
}

impl ClaimsVerifier {
    /// Creates a verifier accepting RS256-signed tokens for `client_id`.
    #[must_use]
    pub fn new(
        client_id: ClientId,
        client_secret: ClientSecret,
        issuer: IssuerUrl,
        keys: CoreJsonWebKeySet,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            issuer,
            allowed_algs: vec![CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256],
            required_audience: None,
            keys: RwLock::new(keys),
            last_refetch: Mutex::new(None),
        }
    }

    /// Creates a verifier from discovered provider metadata.
    #[must_use]
    pub fn from_provider(config: &AuthConfig, provider: &OidcProvider) -> Self {
        Self::new(
            ClientId::new(config.client_id().to_string()),
            ClientSecret::new(config.client_secret().to_string()),
            provider.issuer().clone(),
            provider.signing_keys().clone(),
        )
        .with_algorithms(provider.signing_algorithms())
        .with_required_audience(config.required_audience().map(str::to_string))
    }

    /// Replaces the accepted signing algorithms. `none` is always dropped.
    #[must_use]
    pub fn with_algorithms(mut self, algs: Vec<CoreJwsSigningAlgorithm>) -> Self {
        let algs: Vec<_> = algs
            .into_iter()
            .filter(|alg| *alg != CoreJwsSigningAlgorithm::None)
            .collect();
        if !algs.is_empty() {
            self.allowed_algs = algs;
        }
        self
    }

    /// Requires `audience` in every token, alongside the client ID.
    #[must_use]
    pub fn with_required_audience(mut self, audience: Option<String>) -> Self {
        self.required_audience = audience;
        self
    }

    /// Swaps in a freshly fetched key set.
    pub fn replace_keys(&self, keys: CoreJsonWebKeySet) {
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = keys;
    }

    /// Verifies `raw` and decodes the identity it asserts.
    ///
    /// `expected_nonce` is checked only when given; tokens re-verified on
    /// later requests carry the login nonce, which is no longer known.
    ///
    /// Issuer and audience are checked before the signature, so a forged
    /// token naming a foreign audience reports [`ClaimsError::Audience`].
    /// Audiences other than the client ID are accepted.
    pub fn verify(&self, raw: &str, expected_nonce: Option<&str>) -> Result<Identity, ClaimsError> {
        let token = raw
            .parse::<GroupsIdToken>()
            .map_err(|e| ClaimsError::Malformed {
                details: e.to_string(),
            })?;

        let keys = self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let verifier = IdTokenVerifier::new_confidential_client(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.issuer.clone(),
            keys,
        )
        .set_allowed_algs(self.allowed_algs.clone())
        .set_other_audience_verifier_fn(|_: &Audience| true);

        let claims = match expected_nonce {
            Some(nonce) => token.claims(&verifier, &Nonce::new(nonce.to_string()))?,
            None => token.claims(&verifier, |_: Option<&Nonce>| -> Result<(), String> {
                Ok(())
            })?,
        };

        if let Some(required) = self.required_audience.as_deref() {
            if !claims.audiences().iter().any(|aud| aud.as_str() == required) {
                return Err(ClaimsError::Audience {
                    details: format!("`{required}` is missing from the audience"),
                });
            }
        }

        Ok(Identity::new(
            claims
                .preferred_username()
                .map(|username| username.as_str().to_string())
                .unwrap_or_default(),
        )
        .with_email(
            claims
                .email()
                .map(|email| email.as_str().to_string())
                .unwrap_or_default(),
        )
        .with_groups(claims.additional_claims().groups.iter().cloned()))
    }

    /// Like [`verify`](Self::verify), but refetches the provider's key set
    /// once when the token names an unknown key.
    ///
    /// Refetches are rate-limited by [`KEY_REFETCH_COOLDOWN`]. A failed fetch
    /// leaves the current keys in place and reports the original error.
    pub async fn verify_with_refetch(
        &self,
        raw: &str,
        expected_nonce: Option<&str>,
        provider: &dyn IdentityProvider,
    ) -> Result<Identity, ClaimsError> {
        match self.verify(raw, expected_nonce) {
            Err(ClaimsError::UnknownKey { details }) if self.claim_refetch() => {
                match provider.fetch_signing_keys().await {
                    Ok(keys) => {
                        info!(keys = keys.keys().len(), "refetched signing keys for unknown key ID");
                        self.replace_keys(keys);
                        self.verify(raw, expected_nonce)
                    }
                    Err(report) => {
                        warn!(error = %report, "signing key refetch failed");
                        Err(ClaimsError::UnknownKey { details })
                    }
                }
            }
            result => result,
        }
    }

    fn claim_refetch(&self) -> bool {
        let mut last = self
            .last_refetch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|at| at.elapsed() < KEY_REFETCH_COOLDOWN) {
            return false;
        }
        *last = Some(Instant::now());
        true
    }
}

impl fmt::Debug for ClaimsVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsVerifier")
            .field("client_id", &self.client_id.as_str())
            .field("issuer", &self.issuer.as_str())
            .field("allowed_algs", &self.allowed_algs)
            .field("required_audience", &self.required_audience)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{
        CLIENT_ID, CLIENT_SECRET, FakeProvider, ISSUER, RSA_KEY_1, RSA_KEY_2, TokenSpec, key_set,
        rsa_key, test_verifier,
    };
    use chrono::Duration;

    /// RS256 verifier that knows only `key-1`.
    fn rsa_verifier() -> ClaimsVerifier {
        ClaimsVerifier::new(
            ClientId::new(CLIENT_ID.to_string()),
            ClientSecret::new(CLIENT_SECRET.to_string()),
            IssuerUrl::new(ISSUER.to_string()).expect("issuer url"),
            key_set(&[&rsa_key(RSA_KEY_1, "key-1")]),
        )
    }

    #[test]
    fn decodes_identity_from_valid_token() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").groups(&["ops", "admins"]).mint();

        let identity = verifier.verify(&raw, None).expect("verify");

        assert_eq!(identity.username, "alice");
        assert_eq!(identity.email, "alice@example.com");
        assert!(identity.in_group("ops"));
        assert!(identity.in_group("admins"));
    }

    #[test]
    fn missing_groups_default_to_empty() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("bob").mint();

        let identity = verifier.verify(&raw, None).expect("verify");

        assert!(identity.groups.is_empty());
    }

    #[test]
    fn matching_nonce_is_accepted() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").nonce("n-123").mint();

        assert!(verifier.verify(&raw, Some("n-123")).is_ok());
    }

    #[test]
    fn nonce_mismatch_is_reported() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").nonce("n-123").mint();

        let err = verifier.verify(&raw, Some("other")).unwrap_err();

        assert!(matches!(err, ClaimsError::Nonce { .. }));
        assert_eq!(AuthenticationError::from(err), AuthenticationError::NonceMismatch);
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").expires_in(Duration::minutes(-5)).mint();

        let err = verifier.verify(&raw, None).unwrap_err();

        assert!(matches!(err, ClaimsError::Expired { .. }));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").issuer("https://evil.example.com").mint();

        assert!(matches!(
            verifier.verify(&raw, None),
            Err(ClaimsError::Issuer { .. })
        ));
    }

    #[test]
    fn token_for_other_client_is_an_audience_mismatch() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").audiences(&["someone-else"]).mint();

        let err = verifier.verify(&raw, None).unwrap_err();

        assert!(matches!(err, ClaimsError::Audience { .. }));
        assert!(matches!(
            AuthenticationError::from(err),
            AuthenticationError::AudienceMismatch { .. }
        ));
    }

    #[test]
    fn required_audience_must_be_present() {
        let verifier = test_verifier(Some("homelab"));

        let without = TokenSpec::new("alice").audiences(&[CLIENT_ID]).mint();
        assert!(matches!(
            verifier.verify(&without, None),
            Err(ClaimsError::Audience { .. })
        ));

        let with = TokenSpec::new("alice").audiences(&[CLIENT_ID, "homelab"]).mint();
        assert!(verifier.verify(&with, None).is_ok());
    }

    #[test]
    fn extra_audiences_are_accepted() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").audiences(&[CLIENT_ID, "project-123"]).mint();

        assert!(verifier.verify(&raw, None).is_ok());
    }

    #[test]
    fn foreign_audience_wins_over_bad_signature() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice")
            .audiences(&["someone-else"])
            .signing_secret("not-the-client-secret")
            .mint();

        assert!(matches!(
            verifier.verify(&raw, None),
            Err(ClaimsError::Audience { .. })
        ));
    }

    #[test]
    fn rsa_token_with_known_key_is_accepted() {
        let verifier = rsa_verifier();
        let raw = TokenSpec::new("alice")
            .signed_with(rsa_key(RSA_KEY_1, "key-1"))
            .mint();

        assert_eq!(verifier.verify(&raw, None).expect("verify").username, "alice");
    }

    #[test]
    fn unknown_key_id_is_reported() {
        let verifier = rsa_verifier();
        let raw = TokenSpec::new("alice")
            .signed_with(rsa_key(RSA_KEY_2, "key-2"))
            .mint();

        let err = verifier.verify(&raw, None).unwrap_err();

        assert!(matches!(err, ClaimsError::UnknownKey { .. }));
        assert!(matches!(
            AuthenticationError::from(err),
            AuthenticationError::VerificationFailure { .. }
        ));
    }

    #[tokio::test]
    async fn rotated_key_is_fetched_once() {
        let verifier = rsa_verifier();
        let provider = FakeProvider::default();
        provider.publish_keys(key_set(&[
            &rsa_key(RSA_KEY_1, "key-1"),
            &rsa_key(RSA_KEY_2, "key-2"),
        ]));
        let raw = TokenSpec::new("alice")
            .signed_with(rsa_key(RSA_KEY_2, "key-2"))
            .mint();

        let identity = verifier
            .verify_with_refetch(&raw, None, &provider)
            .await
            .expect("verify after refetch");
        assert_eq!(identity.username, "alice");
        assert_eq!(provider.key_fetches(), 1);

        // The new key is now cached.
        assert!(verifier.verify_with_refetch(&raw, None, &provider).await.is_ok());
        assert_eq!(provider.key_fetches(), 1);
    }

    #[tokio::test]
    async fn refetches_are_rate_limited() {
        let verifier = rsa_verifier();
        let provider = FakeProvider::default();
        provider.publish_keys(key_set(&[&rsa_key(RSA_KEY_1, "key-1")]));
        let raw = TokenSpec::new("alice")
            .signed_with(rsa_key(RSA_KEY_2, "key-2"))
            .mint();

        for _ in 0..3 {
            assert!(matches!(
                verifier.verify_with_refetch(&raw, None, &provider).await,
                Err(ClaimsError::UnknownKey { .. })
            ));
        }
        assert_eq!(provider.key_fetches(), 1);
    }

    #[tokio::test]
    async fn failed_refetch_keeps_the_original_error() {
        let verifier = rsa_verifier();
        let provider = FakeProvider::default();
        let raw = TokenSpec::new("alice")
            .signed_with(rsa_key(RSA_KEY_2, "key-2"))
            .mint();

        assert!(matches!(
            verifier.verify_with_refetch(&raw, None, &provider).await,
            Err(ClaimsError::UnknownKey { .. })
        ));
        assert_eq!(provider.key_fetches(), 1);

        let known = TokenSpec::new("alice")
            .signed_with(rsa_key(RSA_KEY_1, "key-1"))
            .mint();
        assert!(verifier.verify(&known, None).is_ok());
    }

    #[test]
    fn wrong_signing_key_is_rejected() {
        let verifier = test_verifier(None);
        let raw = TokenSpec::new("alice").signing_secret("not-the-client-secret").mint();

        let err = verifier.verify(&raw, None).unwrap_err();

        assert!(matches!(err, ClaimsError::Signature { .. }));
        assert!(matches!(
            AuthenticationError::from(err),
            AuthenticationError::VerificationFailure { .. }
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let verifier = test_verifier(None);
        assert!(matches!(
            verifier.verify("not-a-jwt", None),
            Err(ClaimsError::Malformed { .. })
        ));
    }

    #[test]
    fn none_algorithm_is_never_allowed() {
        let verifier = test_verifier(None).with_algorithms(vec![CoreJwsSigningAlgorithm::None]);
        assert_eq!(
            verifier.allowed_algs,
            vec![CoreJwsSigningAlgorithm::HmacSha256]
        );
    }
}
