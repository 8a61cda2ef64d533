use chrono::Utc;
use clap::Parser;
use goboard_access::AuthConfig;
use goboard_server::{
    app::{self, AppState},
    auth::{AuthState, ClaimsVerifier, IdentityProvider, OidcProvider},
    config::{ServerConfig, SessionConfig},
    logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Dashboard of self-hosted services with OpenID Connect login.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "GOBOARD_CONFIG", default_value = "goboard.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = ServerConfig::load(&args.config).expect("failed to load configuration");
    logging::init(&config.log);
    tracing::info!(path = %args.config.display(), "loaded configuration");

    let auth = match config.auth {
        Some(auth_config) => Some(start_auth(auth_config, &config.session).await),
        None => {
            tracing::warn!("no auth configured; all services are public");
            None
        }
    };

    let state = Arc::new(AppState {
        title: config.server.title,
        icon: config.server.icon,
        services: config.services,
        auth,
    });

    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .expect("failed to bind to address");
    tracing::info!("listening on http://{}", config.server.listen_addr);

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server stopped");
}

/// Discovers the provider and spawns the housekeeping tasks.
async fn start_auth(config: AuthConfig, session: &SessionConfig) -> Arc<AuthState> {
    tracing::info!(issuer = %config.issuer(), "discovering OIDC provider");
    let provider = OidcProvider::discover(&config)
        .await
        .expect("failed to discover OIDC provider");
    let verifier = Arc::new(ClaimsVerifier::from_provider(&config, &provider));
    let provider = Arc::new(provider);

    let auth = Arc::new(AuthState::new(config, provider.clone(), verifier.clone()));

    // Periodic sweep of abandoned logins and dead sessions
    let sweep = auth.clone();
    let cleanup_interval = Duration::from_secs(session.cleanup_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let pending = sweep.pending.remove_expired();
            let sessions = sweep.sessions.remove_stale(Utc::now());
            if pending > 0 || sessions > 0 {
                tracing::debug!(
                    expired_logins = pending,
                    stale_sessions = sessions,
                    "periodic cleanup"
                );
            }
        }
    });

    // Periodic refetch of the provider's signing keys
    let key_interval = Duration::from_secs(session.key_refresh_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(key_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            match provider.fetch_signing_keys().await {
                Ok(keys) => {
                    verifier.replace_keys(keys);
                    tracing::debug!("refreshed signing keys");
                }
                Err(e) => tracing::warn!(error = %e, "failed to refresh signing keys"),
            }
        }
    });

    auth
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down");
}
