//! Authentication routes for login, callback, and logout.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use goboard_access::{AuthenticationError, Session, SessionId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{
    AuthState, SESSION_COOKIE,
    oidc::{self, AuthorizationRequest},
};

/// Query parameters for the OIDC callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
    /// Set by the provider when the user denied consent or the request was invalid.
    error: Option<String>,
    error_description: Option<String>,
}

/// A `302 Found` redirect to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Initiates the OIDC login flow by redirecting to the identity provider.
pub async fn login(State(auth): State<Arc<AuthState>>) -> Response {
    let challenge = auth.pending.begin();

    let auth_url = auth.provider.authorization_url(&AuthorizationRequest {
        pkce_challenge: oidc::pkce_challenge(&challenge.pkce_verifier),
        state: challenge.state,
        nonce: challenge.nonce,
    });

    found(&auth_url)
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
///
/// The `state` is consumed before anything else is checked, so it is burnt
/// on every outcome. No session or cookie is created unless every step
/// succeeds.
pub async fn callback(
    State(auth): State<Arc<AuthState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthFailure> {
    let state = query
        .state
        .filter(|state| !state.is_empty())
        .ok_or_else(|| AuthenticationError::InvalidRequest {
            reason: "missing state parameter".to_string(),
        })?;

    let pending = auth
        .pending
        .consume(&state)
        .ok_or(AuthenticationError::CsrfViolation)?;

    if let Some(error) = query.error {
        return Err(AuthenticationError::InvalidRequest {
            reason: format!(
                "identity provider returned {error}: {}",
                query.error_description.unwrap_or_default()
            ),
        }
        .into());
    }

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthenticationError::InvalidRequest {
            reason: "missing code parameter".to_string(),
        })?;

    let tokens = auth
        .provider
        .exchange_code(&code, pending.pkce_verifier())
        .await
        .map_err(|report| AuthenticationError::ExchangeFailure {
            reason: report.to_string(),
        })?;

    let identity = auth
        .verifier
        .verify_with_refetch(
            &tokens.id_token,
            Some(pending.nonce()),
            auth.provider.as_ref(),
        )
        .await
        .map_err(AuthenticationError::from)?;

    let session = Session::from_tokens(tokens);
    let session_id = loop {
        let id = SessionId::generate();
        if auth.sessions.create(id.clone(), session.clone()) {
            break id;
        }
    };

    info!(user = %identity.username, "user logged in");
    debug!(session_id = %session_id, "session created");

    Ok((jar.add(auth.session_cookie(&session_id)), found("/")))
}

/// Logs out the user by deleting their session.
///
/// Without a session cookie this is a plain redirect.
pub async fn logout(State(auth): State<Arc<AuthState>>, jar: CookieJar) -> Response {
    let Some(session_cookie) = jar.get(SESSION_COOKIE) else {
        return found("/");
    };

    let session_id = SessionId::new(session_cookie.value().to_string());
    if auth.sessions.delete(&session_id).is_some() {
        info!("user logged out");
    }

    (jar.add(auth.removal_cookie()), found("/")).into_response()
}

/// Authentication failure rendered as an error page.
#[derive(Debug)]
pub struct AuthFailure(pub AuthenticationError);

impl From<AuthenticationError> for AuthFailure {
    fn from(error: AuthenticationError) -> Self {
        Self(error)
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            warn!(error = %self.0, "rejected authentication request");
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, "authentication failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, self.0.public_message()).into_response()
    }
}
