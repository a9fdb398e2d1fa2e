//! Data models for messages, reminders and scan progress
//!
//! This module contains the data structures shared by the normalizer, the
//! extractor, the scheduler and the registry.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for every human-readable reminder timestamp.
///
/// The same string is stored in a [`ReminderRecord`] and rebuilt into a
/// [`ReminderKey`], so it must never depend on anything but the instant.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M %p %Z";

/// Subject used when a message carries no Subject header
pub const NO_SUBJECT: &str = "(No Subject)";

/// Format a reference-zone instant the way reminder records store it
#[must_use]
pub fn format_timestamp(instant: &DateTime<Tz>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// One node of a MIME message tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    /// MIME type of this node (`text/plain`, `multipart/alternative`, ...)
    pub mime_type: String,
    /// base64url-encoded body data, if this node carries any
    pub data: Option<String>,
    /// Child parts, in document order
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Leaf part carrying encoded data
    #[must_use]
    pub fn leaf(mime_type: &str, data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: Some(data.to_string()),
            parts: Vec::new(),
        }
    }

    /// Container part wrapping the given children
    #[must_use]
    pub fn multipart(mime_type: &str, parts: Vec<Self>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: None,
            parts,
        }
    }
}

/// A message as delivered by the mailbox source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Mailbox identifier of the message
    pub id: String,
    /// Subject header, or [`NO_SUBJECT`]
    pub subject: String,
    /// Root of the MIME tree
    pub payload: MessagePart,
}

/// A decoded leaf of a message tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPart {
    /// MIME type of the leaf
    pub mime_type: String,
    /// Decoded UTF-8 text
    pub text: String,
}

/// Fixed points before an event at which a reminder call is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderOffset {
    /// Three hours before the event
    ThreeHoursBefore,
    /// One hour before the event
    OneHourBefore,
    /// When the event starts
    AtEventTime,
}

impl ReminderOffset {
    /// Every offset, earliest firing first
    pub const ALL: [Self; 3] = [Self::ThreeHoursBefore, Self::OneHourBefore, Self::AtEventTime];

    /// Signed distance from the event time
    #[must_use]
    pub fn delta(self) -> Duration {
        match self {
            Self::ThreeHoursBefore => Duration::hours(-3),
            Self::OneHourBefore => Duration::hours(-1),
            Self::AtEventTime => Duration::zero(),
        }
    }

    /// Label stored on reminder records
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ThreeHoursBefore => "3 hours before",
            Self::OneHourBefore => "1 hour before",
            Self::AtEventTime => "At the time of event",
        }
    }

    /// Phrase spoken in the reminder call
    #[must_use]
    pub const fn spoken(self) -> &'static str {
        match self {
            Self::ThreeHoursBefore => "in 3 hours",
            Self::OneHourBefore => "in 1 hour",
            Self::AtEventTime => "now",
        }
    }

    /// Instant at which this offset fires for the given event
    #[must_use]
    pub fn fires_at(self, event_time: DateTime<Tz>) -> DateTime<Tz> {
        event_time + self.delta()
    }
}

impl fmt::Display for ReminderOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of a reminder record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderStatus {
    /// Waiting for its delayed action to fire
    Scheduled,
    /// The call was placed
    Called,
    /// The call could not be placed
    Failed,
}

impl ReminderStatus {
    /// True once the delayed action has completed
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Called | Self::Failed)
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Scheduled => "Scheduled",
            Self::Called => "Called",
            Self::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Identity of a reminder: (subject, event time, offset label)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    /// Message subject
    pub subject: String,
    /// Event time formatted with [`TIMESTAMP_FORMAT`]
    pub event_time: String,
    /// [`ReminderOffset::label`]
    pub offset_label: String,
}

impl ReminderKey {
    /// Build the key for one offset of one event
    #[must_use]
    pub fn new(subject: &str, event_time: &DateTime<Tz>, offset: ReminderOffset) -> Self {
        Self {
            subject: subject.to_string(),
            event_time: format_timestamp(event_time),
            offset_label: offset.label().to_string(),
        }
    }
}

/// In-memory state of one reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    /// Message subject
    pub subject: String,
    /// Event time, formatted
    pub event_time: String,
    /// Offset label
    pub offset_label: String,
    /// Firing time, formatted
    pub fires_at: String,
    /// Firing instant, used for ordering and retention
    pub fires_at_utc: DateTime<Utc>,
    /// Current status
    pub status: ReminderStatus,
    /// Failure reason for `Failed` records
    pub detail: Option<String>,
}

impl ReminderRecord {
    /// New `Scheduled` record for the given key
    #[must_use]
    pub fn scheduled(key: ReminderKey, fires_at: DateTime<Tz>) -> Self {
        Self {
            subject: key.subject,
            event_time: key.event_time,
            offset_label: key.offset_label,
            fires_at: format_timestamp(&fires_at),
            fires_at_utc: fires_at.with_timezone(&Utc),
            status: ReminderStatus::Scheduled,
            detail: None,
        }
    }

    /// True if this record is identified by `key`
    #[must_use]
    pub fn matches(&self, key: &ReminderKey) -> bool {
        self.subject == key.subject
            && self.event_time == key.event_time
            && self.offset_label == key.offset_label
    }
}

/// Severity of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    /// Neutral progress
    Info,
    /// Something was found or scheduled
    Success,
    /// Nothing usable was found
    Warn,
    /// The scan cycle failed
    Error,
}

/// One entry of the scan progress stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Wall-clock time in the reference zone, `%I:%M:%S %p`
    pub timestamp: String,
    /// Severity
    pub level: ProgressLevel,
    /// Human-readable message
    pub message: String,
}

/// Counters collected over one scan cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Message ids returned by the mailbox
    pub messages_found: usize,
    /// Messages fetched and examined
    pub messages_processed: usize,
    /// Messages that contained a keyword
    pub keyword_matches: usize,
    /// Future event times detected
    pub events_detected: usize,
    /// Events with at least one reminder still ahead
    pub events_scheduled: usize,
}
