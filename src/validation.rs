use anyhow::{anyhow, Result};
use chrono_tz::Tz;

/// Validation utilities for configuration values and external text
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate phone number format
    pub fn validate_phone(phone: &str) -> Result<()> {
        if phone.trim().is_empty() {
            return Err(anyhow!("Phone number cannot be empty"));
        }

        // Remove common formatting characters
        let cleaned = phone
            .chars()
            .filter(|c| {
                c.is_ascii_digit() || *c == '+' || *c == '-' || *c == '(' || *c == ')' || *c == ' '
            })
            .collect::<String>();

        if cleaned.len() != phone.len() {
            return Err(anyhow!("Phone number contains invalid characters"));
        }

        let digits_only = cleaned.chars().filter(char::is_ascii_digit).count();

        if !(7..=15).contains(&digits_only) {
            return Err(anyhow!("Phone number must be between 7 and 15 digits"));
        }

        if !cleaned.starts_with('+') && !cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!(
                "Phone number must start with + or contain only digits"
            ));
        }

        Ok(())
    }

    /// Validate a single keyword
    pub fn validate_keyword(keyword: &str) -> Result<()> {
        if keyword.trim().is_empty() {
            return Err(anyhow!("Keyword cannot be empty"));
        }

        if keyword.len() > 100 {
            return Err(anyhow!("Keyword too long (max 100 characters)"));
        }

        if keyword.chars().any(char::is_control) {
            return Err(anyhow!("Keyword contains invalid characters"));
        }

        Ok(())
    }

    /// Validate the keyword set used to gate messages
    ///
    /// An empty set is allowed and matches no message.
    pub fn validate_keywords(keywords: &[String]) -> Result<()> {
        for keyword in keywords {
            Self::validate_keyword(keyword)?;
        }

        Ok(())
    }

    /// Validate an IANA timezone name
    pub fn validate_timezone(name: &str) -> Result<Tz> {
        name.parse::<Tz>()
            .map_err(|e| anyhow!("Unknown timezone '{name}': {e}"))
    }

    /// Validate a Twilio account SID
    pub fn validate_account_sid(sid: &str) -> Result<()> {
        if !sid.starts_with("AC") {
            return Err(anyhow!("Account SID must start with AC"));
        }

        if sid.len() != 34 || !sid[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("Account SID must be AC followed by 32 hex characters"));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
