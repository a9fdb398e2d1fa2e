use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::models::ReminderOffset;

/// Metric names recorded by the scan pipeline and the scheduler
///
/// No exporter is installed here; with no global recorder every call is a
/// no-op, so the collector is safe to use from tests.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Scan metrics
    /// Scan cycles started
    pub scans_total: &'static str,
    /// Scan cycle duration
    pub scan_duration: &'static str,
    /// Messages fetched and checked
    pub messages_processed_total: &'static str,
    /// Messages passing the keyword gate
    pub keyword_matches_total: &'static str,

    // Extraction metrics
    /// Extraction duration per message
    pub extraction_duration: &'static str,
    /// Future event times found
    pub events_detected_total: &'static str,
    /// Extractions that failed
    pub extraction_errors_total: &'static str,

    // Reminder metrics
    /// Reminder calls armed, by offset
    pub reminders_scheduled_total: &'static str,
    /// Reminder calls skipped as past, by offset
    pub reminders_skipped_total: &'static str,
    /// Armed calls not yet fired
    pub reminders_pending: &'static str,

    // Delivery metrics
    /// Calls attempted, by offset and outcome
    pub deliveries_total: &'static str,
    /// Call request duration
    pub delivery_duration: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            scans_total: "inbox_reminder_scans_total",
            scan_duration: "inbox_reminder_scan_duration_seconds",
            messages_processed_total: "inbox_reminder_messages_processed_total",
            keyword_matches_total: "inbox_reminder_keyword_matches_total",

            extraction_duration: "inbox_reminder_extraction_duration_seconds",
            events_detected_total: "inbox_reminder_events_detected_total",
            extraction_errors_total: "inbox_reminder_extraction_errors_total",

            reminders_scheduled_total: "inbox_reminder_reminders_scheduled_total",
            reminders_skipped_total: "inbox_reminder_reminders_skipped_total",
            reminders_pending: "inbox_reminder_reminders_pending",

            deliveries_total: "inbox_reminder_deliveries_total",
            delivery_duration: "inbox_reminder_delivery_duration_seconds",
        }
    }
}

impl MetricsCollector {
    /// Record one finished scan cycle
    pub fn record_scan(&self, messages: usize, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(self.scans_total, "status" => status).increment(1);
        histogram!(self.scan_duration).record(duration.as_secs_f64());
        counter!(self.messages_processed_total).increment(messages as u64);
    }

    /// Record a message that passed the keyword gate
    pub fn record_keyword_match(&self) {
        counter!(self.keyword_matches_total).increment(1);
    }

    /// Record an extraction run over one message
    pub fn record_extraction(&self, events: usize, duration: Duration) {
        histogram!(self.extraction_duration).record(duration.as_secs_f64());
        counter!(self.events_detected_total).increment(events as u64);
    }

    /// Record an extraction that degraded to an empty result
    pub fn record_extraction_error(&self) {
        counter!(self.extraction_errors_total).increment(1);
    }

    /// Record a reminder that was registered and armed
    pub fn record_reminder_scheduled(&self, offset: ReminderOffset) {
        counter!(self.reminders_scheduled_total, "offset" => offset.label()).increment(1);
    }

    /// Record a reminder whose firing time had already passed
    pub fn record_reminder_skipped(&self, offset: ReminderOffset) {
        counter!(self.reminders_skipped_total, "offset" => offset.label()).increment(1);
    }

    /// Update the number of reminders waiting to fire
    pub fn set_pending_reminders(&self, pending: usize) {
        gauge!(self.reminders_pending).set(pending as f64);
    }

    /// Record the outcome of one notification delivery
    pub fn record_delivery(&self, offset: ReminderOffset, duration: Duration, success: bool) {
        let status = if success { "called" } else { "failed" };
        counter!(self.deliveries_total, "offset" => offset.label(), "status" => status).increment(1);
        histogram!(self.delivery_duration).record(duration.as_secs_f64());
    }
}
