//! HTTP router and shared application state.

use axum::{
    Router,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
    response::Redirect,
    routing::get,
};
use goboard_access::ServiceConfig;
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::auth::{self, AuthState};
use crate::dashboard;

/// State shared by the dashboard routes.
pub struct AppState {
    pub title: String,
    pub icon: String,
    pub services: Vec<ServiceConfig>,
    /// `None` when no identity provider is configured.
    pub auth: Option<Arc<AuthState>>,
}

/// Builds the application router.
///
/// The auth middleware wraps only the dashboard; the login routes exist
/// only when authentication is configured.
pub fn router(state: Arc<AppState>) -> Router {
    let mut home = Router::new().route("/", get(dashboard::index));
    if let Some(auth_state) = &state.auth {
        home = home.route_layer(from_fn_with_state(auth_state.clone(), auth::authenticate));
    }

    let mut app: Router = home
        .with_state(state.clone())
        .route("/version", get(version))
        .route("/ping", get(ping));

    if let Some(auth_state) = &state.auth {
        app = app.merge(
            Router::new()
                .route("/login", get(auth::login))
                .route("/callback", get(auth::callback))
                .route("/logout", get(auth::logout))
                .with_state(auth_state.clone()),
        );
    }

    app.fallback(|| async { Redirect::to("/") })
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(TraceLayer::new_for_http())
}

async fn version() -> String {
    format!(
        "goboard {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

async fn ping() -> &'static str {
    "."
}
