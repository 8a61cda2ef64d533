//! Error taxonomy for the login flow and session handling.
//!
//! Callback-time failures are surfaced to the browser; failures on an
//! established session are resolved by the middleware (invalidate the
//! session and continue anonymously), except verification failures after a
//! successful refresh, which are escalated.

use std::fmt;

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Missing or malformed `state`/`code` callback parameter.
    InvalidRequest { reason: String },
    /// The `state` was never issued or was already consumed.
    CsrfViolation,
    /// The ID token's `nonce` claim does not match the recorded nonce.
    NonceMismatch,
    /// The ID token's audience does not contain the configured audience.
    AudienceMismatch { reason: String },
    /// The identity provider's token endpoint rejected the exchange.
    ExchangeFailure { reason: String },
    /// Signature, issuer, expiry, or claims-decode failure.
    VerificationFailure { reason: String },
    /// The refresh token was rejected or the provider was unreachable.
    RefreshFailure { reason: String },
}

impl AuthenticationError {
    /// Returns true if the failure is attributable to the request itself.
    ///
    /// Client errors map to `400 Bad Request`; everything else is a server error.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. }
                | Self::CsrfViolation
                | Self::NonceMismatch
                | Self::AudienceMismatch { .. }
        )
    }

    /// A short message that is safe to show to the browser.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "Invalid login request",
            Self::CsrfViolation => "Unknown or expired login state",
            Self::NonceMismatch => "Invalid login nonce",
            Self::AudienceMismatch { .. } => "Token was not issued for this application",
            Self::ExchangeFailure { .. } => "Authentication failed",
            Self::VerificationFailure { .. } => "Could not verify identity",
            Self::RefreshFailure { .. } => "Session could not be refreshed",
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
            Self::CsrfViolation => write!(f, "unknown or replayed state"),
            Self::NonceMismatch => write!(f, "nonce mismatch"),
            Self::AudienceMismatch { reason } => write!(f, "audience mismatch: {reason}"),
            Self::ExchangeFailure { reason } => write!(f, "token exchange failed: {reason}"),
            Self::VerificationFailure { reason } => {
                write!(f, "ID token verification failed: {reason}")
            }
            Self::RefreshFailure { reason } => write!(f, "token refresh failed: {reason}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}
