//! Gmail REST client with bounded concurrency and retry logic

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::extractor::extract_body;
use crate::models::{FullMessage, MessageSummary, MimePart};

/// Largest page the messages.list endpoint will return
const MAX_PAGE_SIZE: u32 = 500;

/// Headers requested for summaries
const SUMMARY_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

/// Mailbox operations the pipeline needs from the provider
#[async_trait]
pub trait MailClient: Send + Sync {
    /// Up to `limit` summaries in provider list order
    async fn list_summaries(&self, limit: u32) -> Result<Vec<MessageSummary>>;

    /// One message with its body reconstructed
    async fn fetch_full(&self, id: &str) -> Result<FullMessage>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    snippet: Option<String>,
    payload: Option<GmailPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

impl From<GmailPart> for MimePart {
    fn from(part: GmailPart) -> Self {
        MimePart {
            mime_type: part.mime_type,
            body_data: part.body.and_then(|b| b.data).filter(|d| !d.is_empty()),
            children: part.parts.into_iter().map(MimePart::from).collect(),
        }
    }
}

/// Case-insensitive header lookup; missing headers read as empty
fn header_value(headers: &[GmailHeader], name: &str) -> String {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
        .unwrap_or_default()
}

impl GmailMessage {
    fn headers(&self) -> &[GmailHeader] {
        self.payload
            .as_ref()
            .map(|p| p.headers.as_slice())
            .unwrap_or(&[])
    }

    fn into_summary(self) -> MessageSummary {
        let headers = self.headers();
        let from = header_value(headers, "From");
        let subject = header_value(headers, "Subject");
        let date = header_value(headers, "Date");

        MessageSummary {
            id: self.id,
            thread_id: self.thread_id,
            snippet: self.snippet.unwrap_or_default(),
            from,
            subject,
            date,
        }
    }

    fn into_full(self) -> FullMessage {
        let headers = self.headers();
        let from = header_value(headers, "From");
        let to = header_value(headers, "To");
        let subject = header_value(headers, "Subject");
        let date = header_value(headers, "Date");

        let snippet = self.snippet.unwrap_or_default();
        let extracted = self
            .payload
            .map(|payload| extract_body(&MimePart::from(payload)))
            .unwrap_or_default();

        FullMessage {
            id: self.id,
            thread_id: self.thread_id,
            from,
            to,
            subject,
            date,
            body: extracted.preferred_body().to_string(),
            body_text: extracted.resolve_text(&snippet),
            is_html: extracted.is_html,
            snippet,
        }
    }
}

/// Retry settings for transient provider failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Gmail API client bound to one access token.
///
/// Built per operation from the caller's current credential; the underlying
/// `reqwest::Client` (and its connection pool) is shared by cloning.
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    max_concurrent: usize,
    retry: RetryPolicy,
}

impl GmailClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `http` - Shared HTTP client
    /// * `base_url` - Gmail API root, e.g. `https://gmail.googleapis.com/gmail/v1`
    /// * `access_token` - Bearer token; `None` sends unauthenticated requests
    pub fn new(http: reqwest::Client, base_url: &str, access_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.filter(|t| !t.is_empty()),
            max_concurrent: 5,
            retry: RetryPolicy::default(),
        }
    }

    /// Maximum metadata fetches in flight during `list_summaries`
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn messages_url(&self, id: Option<&str>) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            PipelineError::ConfigError(format!("Invalid Gmail API base URL '{}': {}", self.base_url, e))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                PipelineError::ConfigError(format!("Gmail API base URL '{}' cannot be a base", self.base_url))
            })?;
            segments.pop_if_empty().extend(["users", "me", "messages"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// GET a Gmail resource and decode it as JSON
    async fn get_json<T>(&self, url: reqwest::Url, query: &[(&str, &str)], resource: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::from_status(status, &headers, resource, &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            PipelineError::InvalidMessageFormat(format!("Unexpected response for {}: {}", resource, e))
        })
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.retry.initial_delay;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= self.retry.max_retries => {
                    let wait = match &e {
                        PipelineError::RateLimitExceeded { retry_after } => {
                            Duration::from_secs(*retry_after).min(self.retry.max_delay)
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        self.retry.max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, self.retry.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// List up to `limit` message ids, newest first as the provider orders them
    pub async fn list_message_ids(&self, limit: u32) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        while (ids.len() as u32) < limit {
            let page_size = (limit - ids.len() as u32).min(MAX_PAGE_SIZE).to_string();
            let url = self.messages_url(None)?;

            let response: ListMessagesResponse = self
                .with_retry("list_messages", || {
                    let mut query = vec![("maxResults", page_size.as_str())];
                    if let Some(token) = page_token.as_deref() {
                        query.push(("pageToken", token));
                    }
                    let url = url.clone();
                    async move { self.get_json(url, &query, "message list").await }
                })
                .await?;

            ids.extend(response.messages.into_iter().map(|m| m.id));

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        ids.truncate(limit as usize);
        debug!("Listed {} message ids", ids.len());
        Ok(ids)
    }

    /// Fetch From/Subject/Date headers and the snippet for one message
    pub async fn get_summary(&self, id: &str) -> Result<MessageSummary> {
        let url = self.messages_url(Some(id))?;
        let mut query = vec![("format", "metadata")];
        query.extend(SUMMARY_HEADERS.iter().map(|h| ("metadataHeaders", *h)));

        let message: GmailMessage = self
            .with_retry("get_message_metadata", || {
                self.get_json(url.clone(), &query, id)
            })
            .await?;

        Ok(message.into_summary())
    }
}

#[async_trait]
impl MailClient for GmailClient {
    async fn list_summaries(&self, limit: u32) -> Result<Vec<MessageSummary>> {
        if limit == 0 {
            return Err(PipelineError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }

        let ids = self.list_message_ids(limit).await?;

        // buffered() keeps list order while running fetches concurrently
        let summaries: Vec<MessageSummary> = stream::iter(ids)
            .map(|id| async move { self.get_summary(&id).await })
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        debug!("Fetched {} message summaries", summaries.len());
        Ok(summaries)
    }

    async fn fetch_full(&self, id: &str) -> Result<FullMessage> {
        if id.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "message id cannot be empty".to_string(),
            ));
        }

        let url = self.messages_url(Some(id))?;
        let query = [("format", "full")];

        let message: GmailMessage = self
            .with_retry("get_message_full", || self.get_json(url.clone(), &query, id))
            .await?;

        Ok(message.into_full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> GmailClient {
        GmailClient::new(
            reqwest::Client::new(),
            "https://gmail.googleapis.com/gmail/v1/",
            Some("token".to_string()),
        )
    }

    #[test]
    fn test_messages_url() {
        let client = client();
        assert_eq!(
            client.messages_url(None).unwrap().as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages"
        );
        assert_eq!(
            client.messages_url(Some("18c2f")).unwrap().as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages/18c2f"
        );
    }

    #[test]
    fn test_messages_url_escapes_id() {
        let url = client().messages_url(Some("a/b?c")).unwrap();
        assert!(url.as_str().ends_with("/messages/a%2Fb%3Fc"));
    }

    #[test]
    fn test_empty_access_token_treated_as_absent() {
        let client = GmailClient::new(reqwest::Client::new(), "http://localhost", Some(String::new()));
        assert!(client.access_token.is_none());
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let headers = vec![
            GmailHeader { name: "FROM".to_string(), value: "a@example.com".to_string() },
            GmailHeader { name: "Subject".to_string(), value: "Hi".to_string() },
        ];
        assert_eq!(header_value(&headers, "From"), "a@example.com");
        assert_eq!(header_value(&headers, "subject"), "Hi");
        assert_eq!(header_value(&headers, "Date"), "");
    }

    #[test]
    fn test_metadata_message_into_summary() {
        let message: GmailMessage = serde_json::from_value(json!({
            "id": "m1",
            "threadId": "t1",
            "snippet": "Hello there",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "From", "value": "Alice <alice@example.com>"},
                    {"name": "Subject", "value": "Lunch?"},
                    {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 -0800"}
                ]
            }
        }))
        .unwrap();

        let summary = message.into_summary();
        assert_eq!(summary.id, "m1");
        assert_eq!(summary.thread_id.as_deref(), Some("t1"));
        assert_eq!(summary.from, "Alice <alice@example.com>");
        assert_eq!(summary.subject, "Lunch?");
        assert_eq!(summary.date, "Mon, 1 Jan 2024 10:00:00 -0800");
        assert_eq!(summary.snippet, "Hello there");
    }

    #[test]
    fn test_message_without_payload() {
        let message: GmailMessage = serde_json::from_value(json!({"id": "m1"})).unwrap();
        let full = message.into_full();
        assert_eq!(full.from, "");
        assert_eq!(full.body, "");
        assert_eq!(full.body_text, "");
        assert!(!full.is_html);
    }

    #[test]
    fn test_full_message_html_only() {
        // "<p>Hi&nbsp;there</p>" base64url-encoded
        let message: GmailMessage = serde_json::from_value(json!({
            "id": "m2",
            "threadId": "t2",
            "snippet": "Hi there",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "To", "value": "me@example.com"}],
                "body": {"size": 0},
                "parts": [{
                    "mimeType": "text/html",
                    "headers": [],
                    "body": {"size": 20, "data": "PHA-SGkmbmJzcDt0aGVyZTwvcD4"}
                }]
            }
        }))
        .unwrap();

        let full = message.into_full();
        assert_eq!(full.to, "me@example.com");
        assert!(full.is_html);
        assert_eq!(full.body, "<p>Hi&nbsp;there</p>");
        assert_eq!(full.body_text, "Hi there");
    }

    #[test]
    fn test_gmail_part_conversion_drops_empty_data() {
        let part: GmailPart = serde_json::from_value(json!({
            "mimeType": "multipart/mixed",
            "body": {"size": 0, "data": ""},
            "parts": [{"mimeType": "text/plain", "body": {"data": "aGk"}}]
        }))
        .unwrap();

        let mime = MimePart::from(part);
        assert_eq!(mime.body_data, None);
        assert_eq!(mime.children.len(), 1);
        assert_eq!(mime.children[0].body_data.as_deref(), Some("aGk"));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let err = client().list_summaries(0).await.unwrap_err();
        assert!(matches!(err, PipelineError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_error() {
        let client = client().with_retry_policy(RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        });
        let attempts = std::sync::atomic::AtomicU32::new(0);

        let result = client
            .with_retry("test", || async {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 {
                    Err(PipelineError::NetworkError("reset".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_with_retry_fails_fast_on_permanent_error() {
        let client = client();
        let attempts = std::sync::atomic::AtomicU32::new(0);

        let result: Result<()> = client
            .with_retry("test", || async {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(PipelineError::AuthError("expired".to_string()))
            })
            .await;

        assert!(matches!(result, Err(PipelineError::AuthError(_))));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_all_retries() {
        let client = client().with_retry_policy(RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        });
        let attempts = std::sync::atomic::AtomicU32::new(0);

        let result: Result<()> = client
            .with_retry("test", || async {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(PipelineError::ServerError { status: 503, message: "busy".to_string() })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
