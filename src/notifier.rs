//! Notification sinks
//!
//! A sink places one voice call. The Twilio sink reads its credentials from
//! the shared configuration at delivery time, so a reminder armed before a
//! credential change still uses the new credentials when it fires.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::ConfigHandle;
use crate::error::{ReminderError, Result};

/// Delivers a spoken message to a phone number
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Call `destination` and speak `message`
    async fn deliver(&self, destination: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    sid: Option<String>,
    status: Option<String>,
}

/// Places calls through the Twilio REST API
pub struct TwilioCallSink {
    client: Client,
    config: ConfigHandle,
}

impl TwilioCallSink {
    /// Sink with an HTTP client using the configured request timeout
    pub fn new(config: ConfigHandle) -> Result<Self> {
        let timeout = config.notification().request_timeout_secs;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| ReminderError::Delivery(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotificationSink for TwilioCallSink {
    #[instrument(skip(self, message))]
    async fn deliver(&self, destination: &str, message: &str) -> Result<()> {
        let settings = self.config.notification();
        if settings.account_sid.is_empty() || settings.auth_token.is_empty() || settings.from_number.is_empty() {
            return Err(ReminderError::Delivery(
                "Twilio credentials are not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/Accounts/{}/Calls.json",
            settings.api_base.trim_end_matches('/'),
            settings.account_sid
        );
        let twiml = format!("<Response><Say>{}</Say></Response>", xml_escape(message));
        let params = [
            ("To", destination),
            ("From", settings.from_number.as_str()),
            ("Twiml", twiml.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&settings.account_sid, Some(&settings.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| ReminderError::Delivery(format!("Call request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReminderError::Delivery(format!(
                "Call request failed with status {status}: {body}"
            )));
        }

        let call: CallResponse = response
            .json()
            .await
            .map_err(|e| ReminderError::Delivery(format!("Failed to parse call response: {e}")))?;

        info!(
            call_sid = call.sid.as_deref().unwrap_or("unknown"),
            call_status = call.status.as_deref().unwrap_or("unknown"),
            "Call placed"
        );
        Ok(())
    }
}

/// Logs reminders instead of calling
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

#[async_trait]
impl NotificationSink for DryRunSink {
    async fn deliver(&self, destination: &str, message: &str) -> Result<()> {
        info!(destination, message, "Dry run, call not placed");
        Ok(())
    }
}

/// Escape text for use inside a TwiML element
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_xml_escape() {
        assert_eq!(
            xml_escape("Q&A <live> \"today\""),
            "Q&amp;A &lt;live&gt; &quot;today&quot;"
        );
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_delivery() {
        let sink = TwilioCallSink::new(ConfigHandle::new(AppConfig::default())).expect("client");
        let err = sink.deliver("+15551234567", "Reminder").await.unwrap_err();
        assert!(matches!(err, ReminderError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        assert!(DryRunSink.deliver("+15551234567", "Reminder").await.is_ok());
    }
}
