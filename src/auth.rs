//! Access-credential upkeep for Gmail API calls
//!
//! The consent flow that produces the first token pair happens elsewhere; this
//! module only keeps an existing pair usable by exchanging the refresh token
//! when the access token is missing.

use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::Credential;

/// Google's OAuth2 token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// OAuth2 client identity used for the refresh exchange
#[derive(Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl OAuthClient {
    /// Load the OAuth2 client identity from environment variables
    ///
    /// # Environment Variables
    /// - `GOOGLE_CLIENT_ID`: OAuth2 client ID
    /// - `GOOGLE_CLIENT_SECRET`: OAuth2 client secret
    /// - `GOOGLE_TOKEN_URI`: Token endpoint (optional, defaults to Google's)
    pub fn from_env() -> Result<Self> {
        let client_id = env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| PipelineError::ConfigError("GOOGLE_CLIENT_ID not set".to_string()))?;
        let client_secret = env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| PipelineError::ConfigError("GOOGLE_CLIENT_SECRET not set".to_string()))?;
        let token_uri =
            env::var("GOOGLE_TOKEN_URI").unwrap_or_else(|_| DEFAULT_TOKEN_URI.to_string());

        Ok(Self {
            client_id,
            client_secret,
            token_uri,
        })
    }
}

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<String>;
}

/// `None` stands for "no OAuth client configured"; every exchange fails.
#[async_trait]
impl<R: TokenRefresher> TokenRefresher for Option<R> {
    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        match self {
            Some(inner) => inner.refresh(refresh_token).await,
            None => Err(PipelineError::AuthError(
                "no OAuth client configured for token refresh".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Refresh-token grant against an OAuth2 token endpoint
pub struct GoogleTokenRefresher {
    http: reqwest::Client,
    client: OAuthClient,
}

impl GoogleTokenRefresher {
    pub fn new(http: reqwest::Client, client: OAuthClient) -> Self {
        Self { http, client }
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        debug!("Requesting new access token from {}", self.client.token_uri);

        let response = self
            .http
            .post(&self.client.token_uri)
            .form(&[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => status.canonical_reason().unwrap_or("Unknown").to_string(),
            };
            return Err(PipelineError::AuthError(format!(
                "token refresh failed (HTTP {}): {}",
                status.as_u16(),
                detail
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        if let Some(expires_in) = token.expires_in {
            debug!("Refreshed access token expires in {}s", expires_in);
        }

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PipelineError::AuthError("token response carried no access_token".to_string())
            })
    }
}

/// Keeps a [`Credential`] usable for the next mailbox call.
pub struct CredentialManager<R> {
    refresher: R,
}

impl<R: TokenRefresher> CredentialManager<R> {
    pub fn new(refresher: R) -> Self {
        Self { refresher }
    }

    /// Return a credential whose access token is present, if that can be arranged.
    ///
    /// A present access token is trusted without asking the provider. A missing
    /// one triggers a single refresh attempt; failure is logged and the
    /// credential comes back unchanged so the next API call reports the
    /// authentication problem.
    pub async fn ensure_valid(&self, credential: Credential) -> Credential {
        if credential.access_token().is_some() {
            return credential;
        }

        let Some(refresh_token) = credential.refresh_token() else {
            debug!("No access or refresh token available; continuing unauthenticated");
            return credential;
        };

        match self.refresher.refresh(refresh_token).await {
            Ok(access_token) => {
                info!("Refreshed Gmail access token");
                Credential {
                    access_token: Some(access_token),
                    refresh_token: credential.refresh_token,
                }
            }
            Err(e) => {
                warn!("Failed to refresh access token: {}", e);
                credential
            }
        }
    }
}
