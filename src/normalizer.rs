use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use regex::Regex;
use scraper::{Html, Node};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::{ReminderError, Result};
use crate::models::{DecodedPart, MessagePart, RawMessage};
use crate::validation::InputValidator;

/// Mail bodies arrive as base64url with or without padding
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const SKIPPED_HTML_TAGS: [&str; 4] = ["script", "style", "head", "noscript"];

/// Turns raw message trees into plain text ready for keyword matching and
/// date extraction
pub struct TextNormalizer {
    url_regex: Regex,
    blank_lines_regex: Regex,
}

impl TextNormalizer {
    /// Create a new normalizer
    pub fn new() -> Result<Self> {
        let url_regex = Regex::new(r"https?://\S+")
            .map_err(|e| ReminderError::Other(format!("Failed to compile URL regex: {e}")))?;
        let blank_lines_regex = Regex::new(r"[ \t]*\n\s*")
            .map_err(|e| ReminderError::Other(format!("Failed to compile newline regex: {e}")))?;

        Ok(Self {
            url_regex,
            blank_lines_regex,
        })
    }

    /// Subject and cleaned body joined the way the extractor expects them
    #[must_use]
    pub fn combined_text(&self, message: &RawMessage) -> String {
        format!("{}\n{}", message.subject, self.body_text(message))
    }

    /// Cleaned body text of a message, or an empty string
    #[must_use]
    pub fn body_text(&self, message: &RawMessage) -> String {
        let parts = flatten_parts(&message.payload);

        if let Some(plain) = parts.iter().find(|p| p.mime_type.contains("text/plain")) {
            return self.clean_text(&plain.text);
        }

        if let Some(html) = parts.iter().find(|p| p.mime_type.contains("text/html")) {
            return self.clean_text(&html_to_text(&html.text));
        }

        debug!(message_id = %message.id, "No text part found in message");
        String::new()
    }

    /// Remove links and redundant line breaks
    #[must_use]
    pub fn clean_text(&self, text: &str) -> String {
        // Normalize Unicode characters
        let normalized = text.replace("\r\n", "\n").nfc().collect::<String>();
        let sanitized = InputValidator::sanitize_text(&normalized);

        // Remove URLs
        let no_urls = self.url_regex.replace_all(&sanitized, "");

        // Collapse newline runs, including whitespace-only lines
        let collapsed = self.blank_lines_regex.replace_all(&no_urls, "\n");

        collapsed.trim().to_string()
    }
}

/// Flatten a MIME tree into its decoded leaves, in document order
///
/// Leaves without data are skipped, and so are leaves whose data is not
/// valid base64url.
#[must_use]
pub fn flatten_parts(root: &MessagePart) -> Vec<DecodedPart> {
    let mut leaves = Vec::new();
    let mut stack = vec![root];

    while let Some(part) = stack.pop() {
        if !part.parts.is_empty() {
            stack.extend(part.parts.iter().rev());
            continue;
        }

        let Some(data) = part.data.as_deref().filter(|d| !d.is_empty()) else {
            continue;
        };

        match decode_body(data) {
            Ok(text) => leaves.push(DecodedPart {
                mime_type: part.mime_type.clone(),
                text,
            }),
            Err(e) => warn!(mime_type = %part.mime_type, error = %e, "Skipping undecodable body part"),
        }
    }

    leaves
}

/// Decode base64url body data, dropping bytes that are not valid UTF-8
pub fn decode_body(data: &str) -> Result<String> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BODY_ENGINE.decode(compact.as_bytes())?;
    Ok(String::from_utf8_lossy(&bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect())
}

/// Visible text of an HTML document, one text node per line
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_HTML_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}
