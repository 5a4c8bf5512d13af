//! LLM-backed email classification
//!
//! Summaries are reduced to `{id, from, subject, snippet}`, sent to the model
//! with a fixed instruction, and the free-text reply is coerced back into
//! [`ClassificationResult`]s keyed to the original summaries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::llm::ChatModel;
use crate::models::{ClassificationResult, EmailCategory, MessageSummary};

/// First `[ { ... } ]`-shaped span in the reply; lazy so prose after the array is ignored
static JSON_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[\s*\{.*?\}\s*,?\s*\]").unwrap());

pub const SYSTEM_PROMPT: &str = "You are an email classification assistant. Classify each email into one of these categories: Important, Promotions, Social, Marketing, Spam, General. Return ONLY a valid JSON array of objects with id, category, and reason fields.";

/// The projection of a summary that is sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactSummary<'a> {
    pub id: &'a str,
    pub from: &'a str,
    pub subject: &'a str,
    pub snippet: &'a str,
}

impl<'a> From<&'a MessageSummary> for CompactSummary<'a> {
    fn from(summary: &'a MessageSummary) -> Self {
        Self {
            id: &summary.id,
            from: &summary.from,
            subject: &summary.subject,
            snippet: &summary.snippet,
        }
    }
}

/// One entry of the model's reply; `id` may come back as a number
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl RawClassification {
    fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

pub fn build_user_prompt(compact: &[CompactSummary<'_>]) -> Result<String> {
    Ok(format!(
        "Classify these emails:\n{}",
        serde_json::to_string_pretty(compact)?
    ))
}

/// Locate and parse the JSON array in a model reply.
pub fn parse_reply(text: &str) -> Result<Vec<Value>> {
    let candidate = match JSON_ARRAY.find(text) {
        Some(m) => m.as_str(),
        None => text.trim(),
    };

    let parsed: Value = serde_json::from_str(candidate)
        .map_err(|e| PipelineError::ResponseParse(format!("{} in reply: {}", e, truncate(text, 200))))?;

    match parsed {
        Value::Array(items) => Ok(items),
        other => Err(PipelineError::ResponseParse(format!(
            "expected a JSON array, got {}",
            json_kind(&other)
        ))),
    }
}

/// Join parsed reply items with the summaries they refer to.
///
/// Items whose id matches no summary are dropped, as are summaries the reply
/// never mentions. Output follows the reply's order.
pub fn associate(items: Vec<Value>, summaries: &[MessageSummary]) -> Result<Vec<ClassificationResult>> {
    let mut by_id: HashMap<&str, &MessageSummary> = HashMap::with_capacity(summaries.len());
    for summary in summaries {
        by_id.entry(summary.id.as_str()).or_insert(summary);
    }

    let mut results = Vec::with_capacity(items.len());
    let mut unknown = 0usize;

    for item in items {
        let raw: RawClassification = serde_json::from_value(item)
            .map_err(|e| PipelineError::ResponseParse(format!("malformed classification entry: {}", e)))?;
        let id = raw.id_string();

        let Some(original) = by_id.get(id.as_str()) else {
            debug!("Dropping classification for unknown id {:?}", id);
            unknown += 1;
            continue;
        };

        results.push(ClassificationResult {
            id: original.id.clone(),
            from: original.from.clone(),
            subject: original.subject.clone(),
            snippet: original.snippet.clone(),
            category: EmailCategory::from_label(raw.category.as_deref().unwrap_or_default()),
            reason: raw.reason.unwrap_or_default(),
        });
    }

    if unknown > 0 || results.len() < summaries.len() {
        debug!(
            "Classification covered {}/{} emails ({} unknown ids dropped)",
            results.len(),
            summaries.len(),
            unknown
        );
    }

    Ok(results)
}

/// Classifies message summaries through a [`ChatModel`]
pub struct EmailClassifier<M> {
    model: M,
}

impl<M: ChatModel> EmailClassifier<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub async fn classify(&self, summaries: &[MessageSummary]) -> Result<Vec<ClassificationResult>> {
        if summaries.is_empty() {
            return Err(PipelineError::ValidationError("No emails to classify".to_string()));
        }

        let compact: Vec<CompactSummary<'_>> = summaries.iter().map(CompactSummary::from).collect();
        let user_prompt = build_user_prompt(&compact)?;

        info!(
            "Sending {} emails to model {} for classification",
            summaries.len(),
            self.model.model_name()
        );

        let reply = self.model.complete(SYSTEM_PROMPT, &user_prompt).await?;
        if reply.trim().is_empty() {
            return Err(PipelineError::ModelInvocation {
                model: self.model.model_name().to_string(),
                message: "model returned no content".to_string(),
            });
        }

        let items = parse_reply(&reply)?;
        let results = associate(items, summaries)?;

        info!("Classified {} emails", results.len());
        Ok(results)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}
