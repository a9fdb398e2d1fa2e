//! Inbox Call Reminder - Voice call reminders for events found in email
//!
//! Scans recent mail for messages that mention events, extracts the event
//! times and places phone call reminders ahead of each one.
//!
//! # Features
//!
//! - Read recent messages from a Gmail mailbox
//! - Keyword gate with runtime-editable keywords
//! - Date/time extraction normalized to a reference timezone
//! - Reminder calls 3 hours before, 1 hour before and at event time
//! - In-memory reminder registry with status tracking

/// Configuration management
pub mod config;
/// Error types
pub mod error;
/// Event time extraction
pub mod extractor;
/// Keyword gate
pub mod keywords;
/// Logging setup and utilities
pub mod logging;
/// Mailbox sources
pub mod mailbox;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Message body decoding and text cleanup
pub mod normalizer;
/// Notification sinks
pub mod notifier;
/// Scan cycle orchestration
pub mod pipeline;
/// Reminder record storage
pub mod registry;
/// Delayed reminder calls
pub mod scheduler;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use config::{AppConfig, ConfigHandle, ConfigUpdate};
pub use error::{ReminderError, Result};
pub use extractor::EventTimeExtractor;
pub use models::{ProgressEvent, ProgressLevel, RawMessage, ReminderOffset, ReminderRecord, ReminderStatus, ScanSummary};
pub use pipeline::ScanPipeline;
pub use registry::ReminderRegistry;
pub use scheduler::{ReminderScheduler, TokioExecutor};
