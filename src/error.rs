//! Error types for the inbox-call-reminder library.
//!
//! This module provides custom error types using `thiserror` so that each
//! collaborator failure can be told apart: mailbox failures end a scan cycle,
//! delivery failures mark a single reminder as failed, and extraction or
//! decoding failures only affect the message being processed.

use thiserror::Error;

/// Errors that can occur in the inbox-call-reminder application.
#[derive(Error, Debug)]
pub enum ReminderError {
    /// Listing or fetching messages from the mailbox failed
    #[error("Mailbox error: {0}")]
    Mailbox(String),

    /// The notification sink rejected or failed to place a call
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Event time extraction could not run over the supplied text
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A message body part could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with ReminderError
pub type Result<T> = std::result::Result<T, ReminderError>;

impl From<anyhow::Error> for ReminderError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<base64::DecodeError> for ReminderError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
