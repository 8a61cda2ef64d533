//! Dashboard view listing the services the viewer may open.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use goboard_access::{Identity, ServiceConfig, Viewer, visible_services};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::{CurrentUser, routes::found};

/// Signed-in user as shown on the dashboard.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            name: identity.username.clone(),
            email: identity.email.clone(),
            avatar_url: identity.avatar_url(),
        }
    }
}

/// Dashboard response body.
#[derive(Debug, Serialize)]
pub struct DashboardView<'a> {
    pub title: &'a str,
    pub icon: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
    pub services: Vec<&'a ServiceConfig>,
}

/// `GET /`.
pub async fn index(State(state): State<Arc<AppState>>, CurrentUser(user): CurrentUser) -> Response {
    let viewer = match &state.auth {
        None => Viewer::Unrestricted,
        Some(auth) => {
            if user.is_none() && auth.config.require_login() {
                return found("/login");
            }
            Viewer::from_identity(user.as_ref())
        }
    };

    Json(DashboardView {
        title: &state.title,
        icon: &state.icon,
        user: user.as_ref().map(UserView::from),
        services: visible_services(&state.services, viewer),
    })
    .into_response()
}
