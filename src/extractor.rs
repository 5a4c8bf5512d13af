//! Body extraction from a message's MIME part tree

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::debug;

use crate::models::{ExtractedBody, MimePart};
use crate::normalize::strip_markup;

/// Standard alphabet that accepts payloads with or without `=` padding
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64url body payload into text.
///
/// The url-safe characters are mapped onto the standard alphabet first; if
/// that fails the raw text is tried as standard base64. Undecodable input
/// yields an empty string.
pub fn decode_body_data(data: &str) -> String {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return String::new();
    }

    let substituted = compact.replace('-', "+").replace('_', "/");
    let bytes = match STANDARD_LENIENT.decode(substituted.as_bytes()) {
        Ok(bytes) => bytes,
        Err(first) => match STANDARD_LENIENT.decode(compact.as_bytes()) {
            Ok(bytes) => bytes,
            Err(second) => {
                debug!(
                    "Discarding undecodable body payload ({} bytes): {}; {}",
                    compact.len(),
                    first,
                    second
                );
                return String::new();
            }
        },
    };

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Walk the part tree depth-first and keep the first plain-text and the first
/// HTML body found anywhere in it.
pub fn extract_body(root: &MimePart) -> ExtractedBody {
    let mut body = ExtractedBody::default();
    visit(root, &mut body);
    body.is_html = !body.html.is_empty();
    body
}

fn visit(part: &MimePart, acc: &mut ExtractedBody) {
    if let Some(data) = part.body_data.as_deref() {
        if part.is_media_type("text/plain") {
            if acc.text.is_empty() {
                acc.text = decode_body_data(data);
            }
        } else if part.is_media_type("text/html") && acc.html.is_empty() {
            acc.html = decode_body_data(data);
        }
    }

    for child in &part.children {
        visit(child, acc);
    }
}

impl ExtractedBody {
    /// The representation shown to readers: HTML when present, else plain text
    pub fn preferred_body(&self) -> &str {
        if self.html.is_empty() {
            &self.text
        } else {
            &self.html
        }
    }

    /// Plain text for the message: native text part, else stripped HTML,
    /// else the provider snippet, else empty.
    pub fn resolve_text(&self, snippet: &str) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }

        let stripped = strip_markup(&self.html);
        if !stripped.is_empty() {
            return stripped;
        }

        snippet.to_string()
    }
}
