//! OIDC client implementation using the openidconnect crate.

use async_trait::async_trait;
use chrono::Utc;
use goboard_access::{AuthConfig, TokenSet};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreJsonWebKeySet, CoreJwsSigningAlgorithm,
    CoreProviderMetadata, CoreTokenResponse,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointNotSet,
    EndpointSet, IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, RefreshToken, Scope, TokenResponse,
};
use rootcause::prelude::Report;
use tracing::{debug, instrument};

/// Values bound into one authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub state: String,
    pub nonce: String,
    pub pkce_challenge: PkceCodeChallenge,
}

/// Derives the S256 PKCE challenge for `verifier`.
///
/// `verifier` must be 43 to 128 characters long.
#[must_use]
pub fn pkce_challenge(verifier: &str) -> PkceCodeChallenge {
    PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.to_string()))
}

/// The identity provider's endpoints, as seen by the login flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL the browser is sent to for authentication.
    fn authorization_url(&self, request: &AuthorizationRequest) -> String;

    /// Exchanges an authorization code and its PKCE verifier for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenSet, Report<ProviderError>>;

    /// Exchanges a refresh token for a new token set.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, Report<ProviderError>>;

    /// Fetches the provider's current JSON Web Key Set.
    async fn fetch_signing_keys(&self) -> Result<CoreJsonWebKeySet, Report<ProviderError>>;
}

/// OIDC client for authenticating users.
pub struct OidcProvider {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    scopes: Vec<Scope>,
    http_client: reqwest::Client,
}

impl OidcProvider {
    /// Creates a new OIDC client by discovering the provider metadata.
    pub async fn discover(config: &AuthConfig) -> Result<Self, Report<ProviderError>> {
        let issuer_url =
            IssuerUrl::new(config.issuer().to_string()).map_err(|e| ProviderError::Configuration {
                details: format!("invalid issuer URL: {e}"),
            })?;

        let redirect_url = RedirectUrl::new(config.redirect_url().to_string()).map_err(|e| {
            ProviderError::Configuration {
                details: format!("invalid redirect URL: {e}"),
            }
        })?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProviderError::Configuration {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| ProviderError::Discovery {
                details: e.to_string(),
            })?;

        debug!(
            issuer = %provider_metadata.issuer().as_str(),
            "discovered OIDC provider"
        );

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            scopes: config
                .scopes()
                .into_iter()
                .map(|scope| Scope::new(scope.to_string()))
                .collect(),
            http_client,
        })
    }

    /// Returns the issuer as announced by the provider.
    pub fn issuer(&self) -> &IssuerUrl {
        self.provider_metadata.issuer()
    }

    /// Returns the key set fetched during discovery.
    pub fn signing_keys(&self) -> &CoreJsonWebKeySet {
        self.provider_metadata.jwks()
    }

    /// Returns the ID-token signing algorithms the provider advertises.
    pub fn signing_algorithms(&self) -> Vec<CoreJwsSigningAlgorithm> {
        self.provider_metadata
            .id_token_signing_alg_values_supported()
            .clone()
    }

    fn client(
        &self,
    ) -> CoreClient<
        EndpointSet,
        EndpointNotSet,
        EndpointNotSet,
        EndpointNotSet,
        EndpointMaybeSet,
        EndpointMaybeSet,
    > {
        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone())
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_url(&self, request: &AuthorizationRequest) -> String {
        let state = request.state.clone();
        let nonce = request.nonce.clone();

        let client = self.client();
        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                move || CsrfToken::new(state),
                move || Nonce::new(nonce),
            )
            .set_pkce_challenge(request.pkce_challenge.clone());

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(scope.clone());
        }

        let (auth_url, _, _) = auth_request.url();
        auth_url.to_string()
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenSet, Report<ProviderError>> {
        let client = self.client();
        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| ProviderError::Configuration {
                details: format!("token endpoint error: {e}"),
            })?;

        let token_response = token_request
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::TokenEndpoint {
                details: format!("token exchange failed: {e}"),
            })?;

        token_set(&token_response)
    }

    #[instrument(skip_all)]
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, Report<ProviderError>> {
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let client = self.client();
        let token_request = client
            .exchange_refresh_token(&refresh_token)
            .map_err(|e| ProviderError::Configuration {
                details: format!("token endpoint error: {e}"),
            })?;

        let token_response = token_request
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::TokenEndpoint {
                details: format!("token refresh failed: {e}"),
            })?;

        token_set(&token_response)
    }

    #[instrument(skip(self))]
    async fn fetch_signing_keys(&self) -> Result<CoreJsonWebKeySet, Report<ProviderError>> {
        let keys = CoreJsonWebKeySet::fetch_async(self.provider_metadata.jwks_uri(), &self.http_client)
            .await
            .map_err(|e| ProviderError::KeySet {
                details: e.to_string(),
            })?;
        Ok(keys)
    }
}

fn token_set(response: &CoreTokenResponse) -> Result<TokenSet, Report<ProviderError>> {
    let id_token = response.id_token().ok_or(ProviderError::MissingIdToken)?;

    Ok(TokenSet {
        access_token: response.access_token().secret().clone(),
        refresh_token: response.refresh_token().map(|t| t.secret().clone()),
        expiry: response
            .expires_in()
            .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
            .map(|lifetime| Utc::now() + lifetime),
        id_token: id_token.to_string(),
    })
}

/// OIDC-related errors.
#[derive(Debug)]
pub enum ProviderError {
    /// Configuration error (invalid URLs, etc.)
    Configuration { details: String },
    /// Failed to discover provider metadata.
    Discovery { details: String },
    /// The token endpoint failed or rejected the grant.
    TokenEndpoint { details: String },
    /// The token response lacked the `id_token` field.
    MissingIdToken,
    /// Failed to fetch the signing key set.
    KeySet { details: String },
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { details } => write!(f, "OIDC configuration error: {details}"),
            Self::Discovery { details } => write!(f, "OIDC discovery error: {details}"),
            Self::TokenEndpoint { details } => write!(f, "OIDC token endpoint error: {details}"),
            Self::MissingIdToken => write!(f, "OIDC token response did not include an ID token"),
            Self::KeySet { details } => write!(f, "OIDC key set error: {details}"),
        }
    }
}

impl std::error::Error for ProviderError {}
