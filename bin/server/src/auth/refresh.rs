//! Transparent access-token refresh.

use chrono::{Duration, Utc};
use goboard_access::{AuthenticationError, Session, SessionId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::oidc::IdentityProvider;
use super::store::SessionStore;

/// Tokens expiring within this window are refreshed ahead of time.
const REFRESH_LEEWAY_SECONDS: i64 = 10;

/// Result of [`TokenRefresher::ensure_fresh`].
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The access token was still valid (or another request refreshed it).
    Current(Session),
    /// The tokens were exchanged and the stored session updated.
    Refreshed(Session),
}

impl RefreshOutcome {
    /// Returns the session to continue the request with.
    #[must_use]
    pub fn into_session(self) -> Session {
        match self {
            Self::Current(session) | Self::Refreshed(session) => session,
        }
    }
}

/// Why a session could not be brought up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The access token expired and there is no refresh token.
    MissingRefreshToken,
    /// The provider rejected the refresh token or could not be reached.
    Rejected { details: String },
    /// The provider did not answer before the deadline.
    TimedOut,
    /// The session was deleted while the refresh was in flight.
    SessionRemoved,
}

impl RefreshError {
    /// Returns true if the session itself may still be valid.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRefreshToken => write!(f, "access token expired and no refresh token is available"),
            Self::Rejected { details } => write!(f, "refresh rejected: {details}"),
            Self::TimedOut => write!(f, "refresh timed out"),
            Self::SessionRemoved => write!(f, "session was removed during refresh"),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<RefreshError> for AuthenticationError {
    fn from(error: RefreshError) -> Self {
        Self::RefreshFailure {
            reason: error.to_string(),
        }
    }
}

/// Keeps a session's access token valid by exchanging its refresh token.
pub struct TokenRefresher {
    provider: Arc<dyn IdentityProvider>,
    sessions: SessionStore,
    timeout: std::time::Duration,
    leeway: Duration,
}

impl TokenRefresher {
    /// Creates a refresher that gives the provider `timeout` to answer.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: SessionStore,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            provider,
            sessions,
            timeout,
            leeway: Duration::seconds(REFRESH_LEEWAY_SECONDS),
        }
    }

    /// Returns `session` with a currently valid access token.
    ///
    /// Refreshes at most once. On success the stored session is updated in a
    /// single atomic step; the store is not touched on failure.
    pub async fn ensure_fresh(
        &self,
        id: &SessionId,
        session: Session,
    ) -> Result<RefreshOutcome, RefreshError> {
        if !session.needs_refresh(Utc::now(), self.leeway) {
            return Ok(RefreshOutcome::Current(session));
        }

        let Some(refresh_token) = session.refresh_token().map(str::to_string) else {
            return Err(RefreshError::MissingRefreshToken);
        };

        let response =
            tokio::time::timeout(self.timeout, self.provider.refresh_token(&refresh_token)).await;

        match response {
            Ok(Ok(tokens)) => {
                debug!("access token refreshed");
                self.sessions
                    .update(id, |stored| stored.apply_refresh(tokens))
                    .map(RefreshOutcome::Refreshed)
                    .ok_or(RefreshError::SessionRemoved)
            }
            Ok(Err(report)) => {
                // Another request may have rotated the refresh token first.
                if let Some(current) = self.sessions.get(id) {
                    if current.refresh_token() != Some(refresh_token.as_str())
                        && !current.needs_refresh(Utc::now(), self.leeway)
                    {
                        debug!("refresh token already rotated by a concurrent request");
                        return Ok(RefreshOutcome::Current(current));
                    }
                }
                Err(RefreshError::Rejected {
                    details: report.to_string(),
                })
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "identity provider did not answer refresh in time");
                Err(RefreshError::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{FakeProvider, TokenSpec, token_set};

    fn setup(provider: Arc<FakeProvider>) -> (TokenRefresher, SessionStore) {
        let sessions = SessionStore::new();
        let refresher = TokenRefresher::new(
            provider,
            sessions.clone(),
            std::time::Duration::from_millis(200),
        );
        (refresher, sessions)
    }

    fn stored(sessions: &SessionStore, refresh: Option<&str>, lifetime: Duration) -> (SessionId, Session) {
        let id = SessionId::generate();
        let session = Session::from_tokens(token_set(
            TokenSpec::new("alice").mint(),
            refresh,
            lifetime,
        ));
        sessions.create(id.clone(), session.clone());
        (id, session)
    }

    #[tokio::test]
    async fn valid_token_is_not_refreshed() {
        let provider = Arc::new(FakeProvider::default());
        let (refresher, sessions) = setup(provider.clone());
        let (id, session) = stored(&sessions, Some("r1"), Duration::hours(1));

        let outcome = refresher.ensure_fresh(&id, session).await.expect("fresh");

        assert!(matches!(outcome, RefreshOutcome::Current(_)));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn token_inside_leeway_is_refreshed_and_persisted() {
        let provider = Arc::new(FakeProvider::default());
        provider.allow_refresh(
            "r1",
            token_set(TokenSpec::new("alice").mint(), Some("r2"), Duration::hours(1)),
        );
        let (refresher, sessions) = setup(provider.clone());
        let (id, session) = stored(&sessions, Some("r1"), Duration::seconds(5));

        let outcome = refresher.ensure_fresh(&id, session).await.expect("refreshed");

        let RefreshOutcome::Refreshed(updated) = outcome else {
            panic!("expected a refresh");
        };
        assert_eq!(updated.refresh_token(), Some("r2"));
        assert_eq!(sessions.get(&id).expect("stored"), updated);
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_is_reported() {
        let provider = Arc::new(FakeProvider::default());
        let (refresher, sessions) = setup(provider);
        let (id, session) = stored(&sessions, Some("revoked"), Duration::minutes(-1));

        let err = refresher.ensure_fresh(&id, session).await.unwrap_err();

        assert!(matches!(err, RefreshError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn expired_without_refresh_token_fails() {
        let provider = Arc::new(FakeProvider::default());
        let (refresher, sessions) = setup(provider.clone());
        let (id, session) = stored(&sessions, None, Duration::minutes(-1));

        let err = refresher.ensure_fresh(&id, session).await.unwrap_err();

        assert_eq!(err, RefreshError::MissingRefreshToken);
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn slow_provider_times_out_without_touching_the_session() {
        let provider = Arc::new(FakeProvider::default());
        provider.allow_refresh(
            "r1",
            token_set(TokenSpec::new("alice").mint(), None, Duration::hours(1)),
        );
        provider.delay_refresh(std::time::Duration::from_secs(5));
        let (refresher, sessions) = setup(provider);
        let (id, session) = stored(&sessions, Some("r1"), Duration::minutes(-1));

        let err = refresher.ensure_fresh(&id, session.clone()).await.unwrap_err();

        assert_eq!(err, RefreshError::TimedOut);
        assert!(err.is_transient());
        assert_eq!(sessions.get(&id), Some(session));
    }

    #[tokio::test]
    async fn concurrent_rotation_wins_over_rejection() {
        let provider = Arc::new(FakeProvider::default());
        let (refresher, sessions) = setup(provider);
        let (id, stale_snapshot) = stored(&sessions, Some("r1"), Duration::minutes(-1));
        sessions.update(&id, |s| {
            s.apply_refresh(token_set(
                TokenSpec::new("alice").mint(),
                Some("r2"),
                Duration::hours(1),
            ))
        });

        let outcome = refresher
            .ensure_fresh(&id, stale_snapshot)
            .await
            .expect("uses rotated session");

        let session = outcome.into_session();
        assert_eq!(session.refresh_token(), Some("r2"));
    }

    #[tokio::test]
    async fn session_deleted_mid_refresh_is_reported() {
        let provider = Arc::new(FakeProvider::default());
        provider.allow_refresh(
            "r1",
            token_set(TokenSpec::new("alice").mint(), None, Duration::hours(1)),
        );
        let (refresher, sessions) = setup(provider);
        let (id, session) = stored(&sessions, Some("r1"), Duration::minutes(-1));
        sessions.delete(&id);

        let err = refresher.ensure_fresh(&id, session).await.unwrap_err();

        assert_eq!(err, RefreshError::SessionRemoved);
    }
}
