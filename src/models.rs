use serde::{Deserialize, Serialize};
use std::fmt;

/// Access/refresh token pair authorizing mailbox calls on a user's behalf.
///
/// The session that owns it hands it to the pipeline per operation and reads
/// the (possibly refreshed) access token back afterwards.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// Present and non-empty access token
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Present and non-empty refresh token
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| match token.as_deref() {
            Some("") => "<empty>",
            Some(_) => "<redacted>",
            None => "<none>",
        };
        f.debug_struct("Credential")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    /// Raw `Date` header text, not parsed
    #[serde(default)]
    pub date: String,
}

/// One node of a message's MIME part tree.
///
/// `body_data` holds the provider's encoded payload text untouched; decoding
/// happens during extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    pub mime_type: String,
    pub body_data: Option<String>,
    pub children: Vec<MimePart>,
}

impl MimePart {
    pub fn leaf(mime_type: &str, body_data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            body_data: Some(body_data.to_string()),
            children: Vec::new(),
        }
    }

    pub fn container(mime_type: &str, children: Vec<MimePart>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            body_data: None,
            children,
        }
    }

    /// Media type without parameters, e.g. `text/plain` for `text/plain; charset=UTF-8`
    pub fn media_type(&self) -> &str {
        self.mime_type.split(';').next().unwrap_or("").trim()
    }

    pub fn is_media_type(&self, expected: &str) -> bool {
        self.media_type().eq_ignore_ascii_case(expected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedBody {
    pub html: String,
    pub text: String,
    pub is_html: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub date: String,
    pub snippet: String,
    /// HTML body when present, otherwise the plain-text body
    pub body: String,
    /// Always plain text; never markup
    pub body_text: String,
    pub is_html: bool,
}

/// Closed label vocabulary the model chooses from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EmailCategory {
    Important,
    Promotions,
    Social,
    Marketing,
    Spam,
    General,
}

impl EmailCategory {
    pub const ALL: [EmailCategory; 6] = [
        EmailCategory::Important,
        EmailCategory::Promotions,
        EmailCategory::Social,
        EmailCategory::Marketing,
        EmailCategory::Spam,
        EmailCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailCategory::Important => "Important",
            EmailCategory::Promotions => "Promotions",
            EmailCategory::Social => "Social",
            EmailCategory::Marketing => "Marketing",
            EmailCategory::Spam => "Spam",
            EmailCategory::General => "General",
        }
    }

    /// Coerce a free-text label from the model into the vocabulary.
    ///
    /// Exact names win; otherwise keywords are checked in order, and anything
    /// unrecognised lands in `General`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();

        if let Some(exact) = Self::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(&normalized))
        {
            return *exact;
        }

        if normalized.contains("important") || normalized.contains("urgent") {
            EmailCategory::Important
        } else if normalized.contains("promo") {
            EmailCategory::Promotions
        } else if normalized.contains("marketing") {
            EmailCategory::Marketing
        } else if normalized.contains("spam") || normalized.contains("junk") {
            EmailCategory::Spam
        } else if normalized.contains("social") {
            EmailCategory::Social
        } else {
            EmailCategory::General
        }
    }
}

impl fmt::Display for EmailCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub category: EmailCategory,
    pub reason: String,
}
