//! Mailbox sources
//!
//! [`GmailMailbox`] talks to the Gmail REST API and maps its JSON payload
//! tree onto [`RawMessage`]. Any failure here ends the current scan cycle.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::ConfigHandle;
use crate::error::{ReminderError, Result};
use crate::models::{MessagePart, RawMessage, NO_SUBJECT};

/// Source of recent mail
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Identifiers of the most recent messages, newest first
    async fn list_recent_message_ids(&self, max_results: usize) -> Result<Vec<String>>;

    /// Full message for `id`
    async fn get_message(&self, id: &str) -> Result<RawMessage>;
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    payload: GmailPart,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    #[serde(default)]
    body: GmailBody,
    #[serde(default)]
    parts: Vec<GmailPart>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

impl GmailPart {
    fn into_part(self) -> MessagePart {
        MessagePart {
            mime_type: self.mime_type,
            data: self.body.data,
            parts: self.parts.into_iter().map(Self::into_part).collect(),
        }
    }
}

impl GmailMessage {
    fn into_raw(self) -> RawMessage {
        let subject = self
            .payload
            .headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case("subject"))
            .map(|header| header.value.trim().to_string())
            .filter(|subject| !subject.is_empty())
            .unwrap_or_else(|| NO_SUBJECT.to_string());

        RawMessage {
            id: self.id,
            subject,
            payload: self.payload.into_part(),
        }
    }
}

/// Gmail REST API mailbox
pub struct GmailMailbox {
    client: Client,
    config: ConfigHandle,
}

impl GmailMailbox {
    /// Mailbox client; the access token is read per request
    pub fn new(config: ConfigHandle) -> Result<Self> {
        let timeout = config.mailbox().request_timeout_secs;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| ReminderError::Mailbox(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let settings = self.config.mailbox();
        format!(
            "{}/users/{}/messages",
            settings.api_base.trim_end_matches('/'),
            settings.user_id
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.config.mailbox().access_token;
        if token.is_empty() {
            return Err(ReminderError::Mailbox("Gmail access token is not configured".to_string()));
        }

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ReminderError::Mailbox(format!("Mailbox request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReminderError::Mailbox(format!(
                "Mailbox request failed with status {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl MailboxSource for GmailMailbox {
    #[instrument(skip(self))]
    async fn list_recent_message_ids(&self, max_results: usize) -> Result<Vec<String>> {
        let label = self.config.mailbox().label;
        let request = self
            .client
            .get(self.messages_url())
            .query(&[("maxResults", max_results.to_string()), ("labelIds", label)]);

        let list: MessageList = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ReminderError::Mailbox(format!("Failed to parse message list: {e}")))?;

        debug!(count = list.messages.len(), "Listed messages");
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    #[instrument(skip(self))]
    async fn get_message(&self, id: &str) -> Result<RawMessage> {
        let request = self
            .client
            .get(format!("{}/{id}", self.messages_url()))
            .query(&[("format", "full")]);

        let message: GmailMessage = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| ReminderError::Mailbox(format!("Failed to parse message {id}: {e}")))?;

        Ok(message.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmail_json_maps_to_raw_message() {
        let json = r#"{
            "id": "18c2",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "Subject", "value": "Hackathon invite"}],
                "body": {"size": 0},
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "SGk"}},
                    {"mimeType": "text/html", "body": {"data": "PGI-SGk8L2I-"}}
                ]
            }
        }"#;

        let message: GmailMessage = serde_json::from_str(json).unwrap();
        let raw = message.into_raw();
        assert_eq!(raw.id, "18c2");
        assert_eq!(raw.subject, "Hackathon invite");
        assert_eq!(raw.payload.parts.len(), 2);
        assert_eq!(raw.payload.parts[0].data.as_deref(), Some("SGk"));
    }

    #[test]
    fn test_missing_subject_defaults() {
        let json = r#"{"id": "1", "payload": {"mimeType": "text/plain", "body": {}}}"#;
        let message: GmailMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.into_raw().subject, NO_SUBJECT);
    }

    #[test]
    fn test_empty_list_has_no_messages() {
        let list: MessageList = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_is_mailbox_error() {
        let mailbox = GmailMailbox::new(ConfigHandle::new(crate::config::AppConfig::default())).unwrap();
        let err = mailbox.list_recent_message_ids(5).await.unwrap_err();
        assert!(matches!(err, ReminderError::Mailbox(_)));
    }
}
