//! Authentication middleware and extractors for Axum.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use goboard_access::{AuthenticationError, Identity, SessionId};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{AuthState, SESSION_COOKIE, routes::AuthFailure};

/// How a request's session cookie was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No usable session. `clear_cookie` is set when the browser holds a
    /// cookie that no longer maps to a session.
    Anonymous { clear_cookie: bool },
    /// The session's ID token verified.
    Verified(Identity),
    /// The session refreshed but its ID token failed verification. The
    /// session has been deleted.
    Rejected(AuthenticationError),
}

/// Resolves a session cookie to a verified identity.
///
/// Missing or unrefreshable sessions resolve to anonymous; a timed-out
/// refresh keeps the session for the next request.
pub async fn resolve(auth: &AuthState, session_id: Option<&SessionId>) -> Resolution {
    let Some(id) = session_id else {
        return Resolution::Anonymous {
            clear_cookie: false,
        };
    };

    let Some(session) = auth.sessions.get(id) else {
        debug!("session cookie does not match any session");
        return Resolution::Anonymous { clear_cookie: true };
    };

    let session = match auth.refresher.ensure_fresh(id, session).await {
        Ok(outcome) => outcome.into_session(),
        Err(e) if e.is_transient() => {
            warn!(error = %e, "token refresh interrupted; continuing anonymously");
            return Resolution::Anonymous {
                clear_cookie: false,
            };
        }
        Err(e) => {
            info!(error = %AuthenticationError::from(e), "session invalidated");
            auth.sessions.delete(id);
            return Resolution::Anonymous { clear_cookie: true };
        }
    };

    match auth
        .verifier
        .verify_with_refetch(session.id_token(), None, auth.provider.as_ref())
        .await
    {
        Ok(identity) => Resolution::Verified(identity),
        Err(e) => {
            let e = AuthenticationError::VerificationFailure {
                reason: e.to_string(),
            };
            error!(error = %e, "stored ID token failed verification; session invalidated");
            auth.sessions.delete(id);
            Resolution::Rejected(e)
        }
    }
}

/// Middleware attaching [`CurrentUser`] to every request it wraps.
pub async fn authenticate(
    State(auth): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = jar
        .get(SESSION_COOKIE)
        .map(|cookie| SessionId::new(cookie.value().to_string()));

    match resolve(&auth, session_id.as_ref()).await {
        Resolution::Verified(identity) => {
            request.extensions_mut().insert(CurrentUser(Some(identity)));
            next.run(request).await
        }
        Resolution::Anonymous { clear_cookie } => {
            request.extensions_mut().insert(CurrentUser(None));
            let response = next.run(request).await;
            if clear_cookie {
                (jar.add(auth.removal_cookie()), response).into_response()
            } else {
                response
            }
        }
        Resolution::Rejected(e) => (jar.add(auth.removal_cookie()), AuthFailure(e)).into_response(),
    }
}

/// Extractor for the identity resolved by [`authenticate`].
///
/// Holds `None` for anonymous requests and on routes without the middleware.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<Identity>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}
