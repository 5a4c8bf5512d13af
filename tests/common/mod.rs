//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use gmail_classifier::auth::TokenRefresher;
use gmail_classifier::client::MailClient;
use gmail_classifier::config::Config;
use gmail_classifier::error::Result;
use gmail_classifier::llm::ChatModel;
use gmail_classifier::models::{FullMessage, MessageSummary};
use mockall::mock;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Create a test summary with default values
pub fn create_test_summary(id: &str, from: &str, subject: &str) -> MessageSummary {
    MessageSummary {
        id: id.to_string(),
        thread_id: Some(format!("thread_{}", id)),
        snippet: format!("Snippet for {}", subject),
        from: from.to_string(),
        subject: subject.to_string(),
        date: "Mon, 1 Jan 2024 10:00:00 -0800".to_string(),
    }
}

/// Configuration pointing the Gmail client at a mock server
pub fn test_config(gmail_base: &str) -> Config {
    let mut config = Config::default();
    config.gmail.api_base_url = gmail_base.to_string();
    config.gmail.max_retries = 0;
    config
}

/// base64url without padding, the way Gmail encodes part bodies
pub fn encode_body(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}

/// Create mock Gmail metadata response (JSON)
pub fn mock_gmail_metadata_response(id: &str, from: &str, subject: &str) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": format!("Snippet for {}", subject),
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "From", "value": from},
                {"name": "Subject", "value": subject},
                {"name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 -0800"}
            ]
        },
        "internalDate": "1704124800000",
        "sizeEstimate": 1234
    })
}

/// Create mock Gmail full-format response with the given part tree as payload children
pub fn mock_gmail_full_response(id: &str, parts: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "snippet": "Preview text",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "from", "value": "Sender <sender@example.com>"},
                {"name": "to", "value": "me@example.com"},
                {"name": "subject", "value": "Full message"},
                {"name": "date", "value": "Tue, 2 Jan 2024 09:00:00 +0000"}
            ],
            "body": {"size": 0},
            "parts": parts
        }
    })
}

pub fn mock_part(mime_type: &str, text: &str) -> serde_json::Value {
    json!({
        "partId": "0",
        "mimeType": mime_type,
        "headers": [],
        "body": {"size": text.len(), "data": encode_body(text)}
    })
}

/// Create mock Gmail list messages response (JSON)
pub fn mock_gmail_list_response(
    message_ids: Vec<&str>,
    next_page_token: Option<&str>,
) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = message_ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "threadId": format!("thread_{}", id)
            })
        })
        .collect();

    let mut response = json!({
        "messages": messages,
        "resultSizeEstimate": messages.len()
    });

    if let Some(token) = next_page_token {
        response["nextPageToken"] = json!(token);
    }

    response
}

/// OpenAI chat completion response carrying `content`
pub fn mock_chat_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test-001",
        "object": "chat.completion",
        "created": 1704124800,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
    })
}

/// Chat model returning a canned reply and recording the prompts it saw
#[derive(Clone, Default)]
pub struct StubModel {
    pub reply: String,
    pub prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for StubModel {
    fn model_name(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        Ok(self.reply.clone())
    }
}

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailClient for MailClient {
        async fn list_summaries(&self, limit: u32) -> Result<Vec<MessageSummary>>;
        async fn fetch_full(&self, id: &str) -> Result<FullMessage>;
    }
}

// Mock implementation of TokenRefresher for testing
mock! {
    pub TokenRefresher {}

    #[async_trait::async_trait]
    impl TokenRefresher for TokenRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<String>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_summary() {
        let summary = create_test_summary("msg1", "test@example.com", "Test Subject");
        assert_eq!(summary.id, "msg1");
        assert_eq!(summary.thread_id.as_deref(), Some("thread_msg1"));
        assert_eq!(summary.subject, "Test Subject");
    }

    #[test]
    fn test_mock_list_response_pagination_token() {
        let response = mock_gmail_list_response(vec!["a", "b"], Some("next"));
        assert_eq!(response["messages"].as_array().unwrap().len(), 2);
        assert_eq!(response["nextPageToken"], "next");
    }

    #[test]
    fn test_encode_body_has_no_padding() {
        assert_eq!(encode_body("hi"), "aGk");
    }
}
