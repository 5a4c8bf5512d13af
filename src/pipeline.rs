//! Consumer-facing entry points
//!
//! A [`Pipeline`] owns the configuration, a shared HTTP client and the
//! credential upkeep. Each mailbox call refreshes the caller's credential in
//! place and then talks to Gmail through a client built for that credential.

use tracing::{debug, info};

use crate::auth::{CredentialManager, GoogleTokenRefresher, OAuthClient, TokenRefresher};
use crate::classifier::EmailClassifier;
use crate::client::{GmailClient, MailClient, RetryPolicy};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::llm::{ChatModel, OpenAiChatModel};
use crate::models::{ClassificationResult, Credential, FullMessage, MessageSummary};

pub struct Pipeline<R> {
    config: Config,
    http: reqwest::Client,
    credentials: CredentialManager<R>,
}

impl Pipeline<Option<GoogleTokenRefresher>> {
    /// Build a pipeline that refreshes tokens against Google's endpoint.
    ///
    /// With `oauth` set to `None` missing access tokens cannot be refreshed and
    /// requests go out with whatever the credential holds.
    pub fn from_config(config: Config, oauth: Option<OAuthClient>) -> Result<Self> {
        let http = build_http_client(&config)?;
        let refresher = oauth.map(|client| GoogleTokenRefresher::new(http.clone(), client));
        Ok(Self::with_parts(config, http, refresher))
    }
}

impl<R: TokenRefresher> Pipeline<R> {
    pub fn with_refresher(config: Config, refresher: R) -> Result<Self> {
        let http = build_http_client(&config)?;
        Ok(Self::with_parts(config, http, refresher))
    }

    fn with_parts(config: Config, http: reqwest::Client, refresher: R) -> Self {
        Self {
            config,
            http,
            credentials: CredentialManager::new(refresher),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A Gmail client bound to the credential's current access token
    pub fn mail_client(&self, credential: &Credential) -> GmailClient {
        let gmail = &self.config.gmail;
        GmailClient::new(
            self.http.clone(),
            &gmail.api_base_url,
            credential.access_token().map(str::to_string),
        )
        .with_max_concurrent(gmail.max_concurrent_fetches)
        .with_retry_policy(RetryPolicy {
            max_retries: gmail.max_retries,
            ..RetryPolicy::default()
        })
    }

    /// The caller's credential is only written once the exchange completes,
    /// so a call dropped mid-refresh leaves it as it was.
    async fn refresh_in_place(&self, credential: &mut Credential) {
        let refreshed = self.credentials.ensure_valid(credential.clone()).await;
        *credential = refreshed;
    }

    /// Summaries of the `limit` most recent messages.
    ///
    /// The credential is updated in place when its access token is refreshed.
    pub async fn list_summaries(
        &self,
        credential: &mut Credential,
        limit: u32,
    ) -> Result<Vec<MessageSummary>> {
        if limit == 0 {
            return Err(PipelineError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }

        self.refresh_in_place(credential).await;
        self.mail_client(credential).list_summaries(limit).await
    }

    pub async fn fetch_full(&self, credential: &mut Credential, id: &str) -> Result<FullMessage> {
        if id.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "message id cannot be empty".to_string(),
            ));
        }

        self.refresh_in_place(credential).await;
        self.mail_client(credential).fetch_full(id).await
    }

    /// Classify summaries with the configured chat model
    pub async fn classify(
        &self,
        api_key: &str,
        summaries: &[MessageSummary],
    ) -> Result<Vec<ClassificationResult>> {
        if summaries.is_empty() {
            return Err(PipelineError::ValidationError(
                "No emails to classify".to_string(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "an API key is required for classification".to_string(),
            ));
        }

        let model = OpenAiChatModel::new(api_key.trim(), &self.config.classification);
        EmailClassifier::new(model).classify(summaries).await
    }

    /// List the most recent messages and classify them in one pass
    pub async fn fetch_and_classify(
        &self,
        credential: &mut Credential,
        limit: u32,
        api_key: &str,
    ) -> Result<Vec<ClassificationResult>> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "an API key is required for classification".to_string(),
            ));
        }

        let summaries = self.list_summaries(credential, limit).await?;
        if summaries.is_empty() {
            info!("Mailbox returned no messages; nothing to classify");
            return Ok(Vec::new());
        }
        self.classify(api_key, &summaries).await
    }
}

/// List then classify using any mail client and model.
///
/// An empty mailbox yields an empty result without calling the model.
pub async fn classify_mailbox<C, M>(
    client: &C,
    classifier: &EmailClassifier<M>,
    limit: u32,
) -> Result<Vec<ClassificationResult>>
where
    C: MailClient + ?Sized,
    M: ChatModel,
{
    let summaries = client.list_summaries(limit).await?;
    debug!("Listed {} summaries for classification", summaries.len());

    if summaries.is_empty() {
        return Ok(Vec::new());
    }
    classifier.classify(&summaries).await
}

fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.gmail.request_timeout())
        .user_agent(concat!("gmail-classifier/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}
