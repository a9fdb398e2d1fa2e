use anyhow::{Context, Result};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where messages are read from
    pub mailbox: MailboxConfig,
    /// How event times are read
    pub extraction: ExtractionConfig,
    /// Where and how reminder calls are placed
    pub notification: NotificationConfig,
    /// Keyword gate and record retention
    pub reminders: ReminderConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Gmail API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Base URL of the Gmail REST API
    pub api_base: String,
    /// Mailbox owner, `me` for the authorized user
    pub user_id: String,
    /// Label messages are listed from
    pub label: String,
    /// Messages listed per scan
    pub max_results: usize,
    /// OAuth bearer token
    pub access_token: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

/// Event time extraction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// IANA name of the reference timezone
    pub timezone: String,
    /// Years past the current one that an event may lie in
    pub horizon_years: i32,
    /// Longer texts are not parsed
    pub max_text_length: usize,
}

/// Twilio settings and the number to call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Base URL of the Twilio REST API
    pub api_base: String,
    /// Twilio account SID, `AC` followed by 32 hex digits
    pub account_sid: String,
    /// Twilio auth token
    pub auth_token: String,
    /// Caller number the calls come from
    pub from_number: String,
    /// Number that receives reminder calls
    pub destination: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

/// Keyword gate and reminder bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// A message needs one of these to be considered; empty matches nothing
    pub keywords: Vec<String>,
    /// Called or failed records kept; 0 keeps all
    pub max_finished_records: usize,
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: String,
    /// Daily rolling JSON log file, in addition to stderr
    pub file_path: Option<String>,
    /// `json` or `text`
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mailbox: MailboxConfig {
                api_base: "https://gmail.googleapis.com/gmail/v1".to_string(),
                user_id: "me".to_string(),
                label: "INBOX".to_string(),
                max_results: 25,
                access_token: String::new(),
                request_timeout_secs: 30,
            },
            extraction: ExtractionConfig {
                timezone: "Asia/Kolkata".to_string(),
                horizon_years: 2,
                max_text_length: 100_000,
            },
            notification: NotificationConfig {
                api_base: "https://api.twilio.com/2010-04-01".to_string(),
                account_sid: String::new(),
                auth_token: String::new(),
                from_number: String::new(),
                destination: String::new(),
                request_timeout_secs: 15,
            },
            reminders: ReminderConfig {
                keywords: [
                    "competition",
                    "hackathon",
                    "meeting",
                    "coding challenge",
                    "contest",
                    "event",
                    "invitation",
                    "challange",
                ]
                .iter()
                .map(ToString::to_string)
                .collect(),
                max_finished_records: 500,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, layering an explicit file over the default sources
    pub fn load_with(extra_file: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("INBOX_REMINDER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("reminders.keywords")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.fill_credentials_from_env();

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Fill empty credential fields from the conventional environment variables
    pub fn fill_credentials_from_env(&mut self) {
        fn fill(field: &mut String, var: &str) {
            if field.is_empty() {
                if let Ok(value) = std::env::var(var) {
                    *field = value;
                }
            }
        }

        fill(&mut self.notification.account_sid, "TWILIO_ACCOUNT_SID");
        fill(&mut self.notification.auth_token, "TWILIO_AUTH_TOKEN");
        fill(&mut self.notification.from_number, "TWILIO_PHONE_NUMBER");
        fill(&mut self.notification.destination, "USER_PHONE_NUMBER");
        fill(&mut self.mailbox.access_token, "GMAIL_ACCESS_TOKEN");
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate mailbox config
        if self.mailbox.max_results == 0 || self.mailbox.max_results > 500 {
            return Err(anyhow::anyhow!("max_results must be between 1 and 500"));
        }
        if self.mailbox.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("mailbox request_timeout_secs must be greater than 0"));
        }
        if self.mailbox.user_id.trim().is_empty() {
            return Err(anyhow::anyhow!("mailbox user_id cannot be empty"));
        }

        // Validate extraction config
        self.reference_timezone()?;
        if !(1..=50).contains(&self.extraction.horizon_years) {
            return Err(anyhow::anyhow!("horizon_years must be between 1 and 50"));
        }
        if self.extraction.max_text_length == 0 {
            return Err(anyhow::anyhow!("max_text_length must be greater than 0"));
        }

        // Validate notification config; credentials may still be unset
        if self.notification.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("notification request_timeout_secs must be greater than 0"));
        }
        if !self.notification.account_sid.is_empty() {
            InputValidator::validate_account_sid(&self.notification.account_sid)?;
        }
        if !self.notification.from_number.is_empty() {
            InputValidator::validate_phone(&self.notification.from_number)?;
        }
        if !self.notification.destination.is_empty() {
            InputValidator::validate_phone(&self.notification.destination)?;
        }

        // Validate reminder config
        InputValidator::validate_keywords(&self.reminders.keywords)?;

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Parsed reference timezone
    pub fn reference_timezone(&self) -> Result<Tz> {
        InputValidator::validate_timezone(&self.extraction.timezone)
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Copy of this configuration with secrets masked for display
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.notification.account_sid = mask_keep_edges(&self.notification.account_sid);
        masked.notification.auth_token = mask_all(&self.notification.auth_token);
        masked.mailbox.access_token = mask_all(&self.mailbox.access_token);
        masked
    }
}

fn mask_keep_edges(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return mask_all(secret);
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 4))
}

fn mask_all(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}

/// Partial update submitted by a configuration front end
///
/// Secrets that still contain mask characters are ignored, so a form that
/// round-trips [`AppConfig::masked`] never overwrites real credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// Ignored while masked
    pub account_sid: Option<String>,
    /// Ignored while masked
    pub auth_token: Option<String>,
    /// New caller number
    pub from_number: Option<String>,
    /// New number to call
    pub destination: Option<String>,
    /// Comma-separated keyword list
    pub keywords: Option<String>,
}

/// Shared, runtime-mutable configuration
///
/// Readers always see the latest committed value; nothing downstream keeps
/// its own copy.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Wrap `config` without validating it
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the whole current configuration
    pub fn snapshot(&self) -> AppConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current keyword set
    pub fn keywords(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reminders
            .keywords
            .clone()
    }

    /// Current notification settings
    pub fn notification(&self) -> NotificationConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .notification
            .clone()
    }

    /// Current mailbox settings
    pub fn mailbox(&self) -> MailboxConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mailbox
            .clone()
    }

    /// Replace the whole configuration after validating it
    pub fn replace(&self, config: AppConfig) -> Result<()> {
        config.validate()?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Apply a partial update; nothing changes if the result is invalid
    pub fn apply(&self, update: ConfigUpdate) -> Result<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();

        if let Some(sid) = update.account_sid.filter(|s| !s.is_empty() && !s.contains('*')) {
            next.notification.account_sid = sid;
        }
        if let Some(token) = update.auth_token.filter(|s| !s.is_empty() && !s.contains('*')) {
            next.notification.auth_token = token;
        }
        if let Some(from) = update.from_number {
            next.notification.from_number = from;
        }
        if let Some(destination) = update.destination {
            next.notification.destination = destination;
        }
        if let Some(keywords) = update.keywords {
            next.reminders.keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        next.validate()?;
        *guard = next;
        Ok(())
    }
}
