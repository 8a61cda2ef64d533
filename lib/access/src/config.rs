//! OpenID Connect client configuration.
//!
//! This module provides the configuration consumed by the login flow and the
//! session middleware. Loading it (file, environment) is the server's job.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for the OIDC identity provider and the session cookie.
///
/// Fields with defaults can be omitted from the configuration file.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The OIDC issuer URL (e.g., "https://auth.example.com/realms/main").
    /// Used for discovery and checked against the `iss` claim.
    issuer: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URL for the OAuth2 callback (e.g., "https://home.example.com/callback").
    redirect_url: String,
    /// An audience the ID token must carry in addition to the client ID.
    #[serde(default)]
    audience: Option<String>,
    /// OAuth2 scopes to request as a comma-separated string.
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Whether to set the Secure flag on the session cookie (requires HTTPS).
    #[serde(default = "default_secure")]
    secure: bool,
    /// Redirect anonymous visitors of the dashboard to the login page.
    #[serde(default)]
    require_login: bool,
    /// How long a started login may take before its state is forgotten.
    #[serde(default = "default_pending_ttl_seconds")]
    pending_ttl_seconds: u64,
    /// Upper bound for a refresh-token exchange made while serving a request.
    #[serde(default = "default_refresh_timeout_seconds")]
    refresh_timeout_seconds: u64,
}

fn default_scopes() -> String {
    "openid,email,profile,groups,offline_access".to_string()
}

fn default_secure() -> bool {
    true
}

fn default_pending_ttl_seconds() -> u64 {
    600
}

fn default_refresh_timeout_seconds() -> u64 {
    10
}

impl AuthConfig {
    /// Creates a new configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        issuer: String,
        client_id: String,
        client_secret: String,
        redirect_url: String,
    ) -> Self {
        AuthConfigBuilder::new(issuer, client_id, client_secret, redirect_url).build()
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        issuer: String,
        client_id: String,
        client_secret: String,
        redirect_url: String,
    ) -> AuthConfigBuilder {
        AuthConfigBuilder::new(issuer, client_id, client_secret, redirect_url)
    }

    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URL.
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Returns the extra audience required in ID tokens, if it differs from the client ID.
    #[must_use]
    pub fn required_audience(&self) -> Option<&str> {
        self.audience
            .as_deref()
            .filter(|audience| !audience.is_empty() && *audience != self.client_id)
    }

    /// Returns the OAuth2 scopes to request, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .collect()
    }

    /// Returns true if cookies must carry the Secure attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure
    }

    /// Returns true if anonymous visitors must log in before seeing the dashboard.
    #[must_use]
    pub fn require_login(&self) -> bool {
        self.require_login
    }

    /// Returns how long a pending login request stays valid.
    #[must_use]
    pub fn pending_ttl(&self) -> chrono::Duration {
        i64::try_from(self.pending_ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Returns the deadline for refreshing an access token during a request.
    #[must_use]
    pub fn refresh_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_timeout_seconds)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"*".repeat(self.client_secret.len()))
            .field("redirect_url", &self.redirect_url)
            .field("audience", &self.audience)
            .field("scopes", &self.scopes)
            .field("secure", &self.secure)
            .field("require_login", &self.require_login)
            .field("pending_ttl_seconds", &self.pending_ttl_seconds)
            .field("refresh_timeout_seconds", &self.refresh_timeout_seconds)
            .finish()
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug)]
pub struct AuthConfigBuilder {
    issuer: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    audience: Option<String>,
    scopes: Vec<String>,
    secure: bool,
    require_login: bool,
    pending_ttl_seconds: u64,
    refresh_timeout_seconds: u64,
}

impl AuthConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(
        issuer: String,
        client_id: String,
        client_secret: String,
        redirect_url: String,
    ) -> Self {
        Self {
            issuer,
            client_id,
            client_secret,
            redirect_url,
            audience: None,
            scopes: default_scopes().split(',').map(str::to_string).collect(),
            secure: default_secure(),
            require_login: false,
            pending_ttl_seconds: default_pending_ttl_seconds(),
            refresh_timeout_seconds: default_refresh_timeout_seconds(),
        }
    }

    /// Requires the given audience in every ID token.
    #[must_use]
    pub fn audience(mut self, audience: String) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the Secure flag for cookies.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Redirects anonymous dashboard visitors to the login page.
    #[must_use]
    pub fn require_login(mut self, require_login: bool) -> Self {
        self.require_login = require_login;
        self
    }

    /// Sets how long a pending login request stays valid.
    #[must_use]
    pub fn pending_ttl_seconds(mut self, seconds: u64) -> Self {
        self.pending_ttl_seconds = seconds;
        self
    }

    /// Sets the deadline for refresh-token exchanges.
    #[must_use]
    pub fn refresh_timeout_seconds(mut self, seconds: u64) -> Self {
        self.refresh_timeout_seconds = seconds;
        self
    }

    /// Builds the `AuthConfig`.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        AuthConfig {
            issuer: self.issuer,
            client_id: self.client_id,
            client_secret: self.client_secret,
            redirect_url: self.redirect_url,
            audience: self.audience,
            scopes: self.scopes.join(","),
            secure: self.secure,
            require_login: self.require_login,
            pending_ttl_seconds: self.pending_ttl_seconds,
            refresh_timeout_seconds: self.refresh_timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuthConfig {
        AuthConfig::new(
            "https://auth.example.com".to_string(),
            "goboard".to_string(),
            "s3cret".to_string(),
            "https://home.example.com/callback".to_string(),
        )
    }

    #[test]
    fn new_config_has_defaults() {
        let config = sample();

        assert_eq!(config.issuer(), "https://auth.example.com");
        assert_eq!(config.client_id(), "goboard");
        assert_eq!(config.redirect_url(), "https://home.example.com/callback");
        assert_eq!(
            config.scopes(),
            vec!["openid", "email", "profile", "groups", "offline_access"]
        );
        assert!(config.secure_cookies());
        assert!(!config.require_login());
        assert_eq!(config.required_audience(), None);
        assert_eq!(config.pending_ttl(), chrono::Duration::minutes(10));
        assert_eq!(config.refresh_timeout(), std::time::Duration::from_secs(10));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "client_id": "goboard",
            "client_secret": "s3cret",
            "redirect_url": "https://home.example.com/callback"
        }"#;

        let config: AuthConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.client_id(), "goboard");
        assert!(config.secure_cookies());
        assert!(config.scopes().contains(&"offline_access"));
    }

    #[test]
    fn audience_equal_to_client_id_is_not_an_extra_requirement() {
        let config = AuthConfig::builder(
            "https://auth.example.com".to_string(),
            "goboard".to_string(),
            "s3cret".to_string(),
            "https://home.example.com/callback".to_string(),
        )
        .audience("goboard".to_string())
        .build();
        assert_eq!(config.required_audience(), None);

        let config = AuthConfig::builder(
            "https://auth.example.com".to_string(),
            "goboard".to_string(),
            "s3cret".to_string(),
            "https://home.example.com/callback".to_string(),
        )
        .audience("homelab".to_string())
        .build();
        assert_eq!(config.required_audience(), Some("homelab"));
    }

    #[test]
    fn add_scope_does_not_duplicate() {
        let config = AuthConfig::builder(
            "https://auth.example.com".to_string(),
            "goboard".to_string(),
            "s3cret".to_string(),
            "https://home.example.com/callback".to_string(),
        )
        .add_scope("openid".to_string())
        .add_scope("roles".to_string())
        .build();

        let openid_count = config.scopes().iter().filter(|s| **s == "openid").count();
        assert_eq!(openid_count, 1);
        assert!(config.scopes().contains(&"roles"));
    }

    #[test]
    fn oversized_pending_ttl_saturates() {
        let config = AuthConfig::builder(
            "https://idp.example.com".to_string(),
            "goboard".to_string(),
            "secret".to_string(),
            "https://home.example.com/callback".to_string(),
        )
        .pending_ttl_seconds(u64::MAX)
        .build();

        assert_eq!(config.pending_ttl(), chrono::Duration::MAX);
    }

    #[test]
    fn debug_redacts_client_secret() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("******"));
    }
}
