//! One scan cycle over the mailbox
//!
//! List recent messages, fetch each one, gate on keywords, extract event
//! times and hand them to the scheduler. Progress is reported as a stream of
//! [`ProgressEvent`]s and mirrored into the log.

use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ConfigHandle;
use crate::error::Result;
use crate::extractor::EventTimeExtractor;
use crate::keywords::KeywordFilter;
use crate::logging::OperationTimer;
use crate::mailbox::MailboxSource;
use crate::metrics::MetricsCollector;
use crate::models::{ProgressEvent, ProgressLevel, ReminderRecord, ScanSummary, TIMESTAMP_FORMAT};
use crate::normalizer::TextNormalizer;
use crate::scheduler::ReminderScheduler;

const PROGRESS_TIME_FORMAT: &str = "%I:%M:%S %p";

/// Sends progress events to an optional listener
pub struct ProgressReporter {
    timezone: Tz,
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Reporter stamping events in `timezone`; `None` only logs
    #[must_use]
    pub const fn new(timezone: Tz, sender: Option<UnboundedSender<ProgressEvent>>) -> Self {
        Self { timezone, sender }
    }

    /// Emit one event; a closed channel only stops the stream, never the scan
    pub fn emit(&self, level: ProgressLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ProgressLevel::Info | ProgressLevel::Success => info!(progress = ?level, "{message}"),
            ProgressLevel::Warn => warn!("{message}"),
            ProgressLevel::Error => error!("{message}"),
        }

        if let Some(sender) = &self.sender {
            let event = ProgressEvent {
                timestamp: chrono::Utc::now()
                    .with_timezone(&self.timezone)
                    .format(PROGRESS_TIME_FORMAT)
                    .to_string(),
                level,
                message,
            };
            if sender.send(event).is_err() {
                debug!("Progress listener went away");
            }
        }
    }
}

/// Mailbox → keyword gate → extraction → scheduling
pub struct ScanPipeline {
    mailbox: Arc<dyn MailboxSource>,
    normalizer: TextNormalizer,
    keywords: KeywordFilter,
    extractor: EventTimeExtractor,
    scheduler: Arc<ReminderScheduler>,
    config: ConfigHandle,
    metrics: MetricsCollector,
}

impl ScanPipeline {
    /// Pipeline over `mailbox`, extracting in the configured timezone
    ///
    /// Fails if the configured timezone is unknown.
    pub fn new(
        config: ConfigHandle,
        mailbox: Arc<dyn MailboxSource>,
        scheduler: Arc<ReminderScheduler>,
    ) -> Result<Self> {
        let extractor = EventTimeExtractor::from_config(&config.snapshot().extraction)?;
        Ok(Self {
            mailbox,
            normalizer: TextNormalizer::new()?,
            keywords: KeywordFilter::new(config.clone()),
            extractor,
            scheduler,
            config,
            metrics: MetricsCollector::default(),
        })
    }

    /// Extractor used by this pipeline
    #[must_use]
    pub const fn extractor(&self) -> &EventTimeExtractor {
        &self.extractor
    }

    /// Every reminder record, latest firing time first
    #[must_use]
    pub fn list_reminders(&self) -> Vec<ReminderRecord> {
        self.scheduler.registry().snapshot()
    }

    /// Run one cycle against the current time
    pub async fn run(&self, events: Option<UnboundedSender<ProgressEvent>>) -> Result<ScanSummary> {
        self.run_at(self.extractor.now(), events).await
    }

    /// Run one cycle with a fixed notion of "now"
    #[instrument(skip(self, events))]
    pub async fn run_at(
        &self,
        now: DateTime<Tz>,
        events: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<ScanSummary> {
        let progress = ProgressReporter::new(self.extractor.timezone(), events);
        let timer = OperationTimer::new("scan_cycle");

        let result = self.scan(now, &progress).await;
        let elapsed = timer.finish();

        match &result {
            Ok(summary) => self.metrics.record_scan(summary.messages_processed, elapsed, true),
            Err(e) => {
                progress.emit(ProgressLevel::Error, format!("An error occurred: {e}"));
                self.metrics.record_scan(0, elapsed, false);
            }
        }
        result
    }

    async fn scan(&self, now: DateTime<Tz>, progress: &ProgressReporter) -> Result<ScanSummary> {
        let max_results = self.config.mailbox().max_results;
        let label = self.config.mailbox().label;
        let mut summary = ScanSummary::default();

        let ids = self.mailbox.list_recent_message_ids(max_results).await?;
        summary.messages_found = ids.len();
        progress.emit(
            ProgressLevel::Info,
            format!("Found {} recent emails in {label}.", ids.len()),
        );
        if ids.is_empty() {
            progress.emit(ProgressLevel::Info, "No emails found to process.");
        }

        for (index, id) in ids.iter().enumerate() {
            progress.emit(
                ProgressLevel::Info,
                format!("Processing email {}/{}...", index + 1, ids.len()),
            );
            let message = self.mailbox.get_message(id).await?;
            summary.messages_processed += 1;
            let subject = message.subject.clone();
            progress.emit(ProgressLevel::Info, format!("Checking email: \"{subject}\""));

            let text = self.normalizer.combined_text(&message);
            let Some(keyword) = self.keywords.matched_keyword(&text) else {
                progress.emit(ProgressLevel::Info, "No matching keyword found.");
                continue;
            };
            summary.keyword_matches += 1;
            self.metrics.record_keyword_match();
            debug!(keyword = %keyword, message_id = %id, "Keyword gate passed");
            progress.emit(ProgressLevel::Success, format!("Keyword matched in \"{subject}\"."));

            let timer = OperationTimer::new("extract_event_times");
            let event_times = match self.extractor.extract(&text, now) {
                Ok(times) => times,
                Err(e) => {
                    warn!(error = %e, message_id = %id, "Date parsing error");
                    self.metrics.record_extraction_error();
                    Vec::new()
                }
            };
            self.metrics.record_extraction(event_times.len(), timer.finish());

            if event_times.is_empty() {
                progress.emit(
                    ProgressLevel::Warn,
                    "Keyword matched, but no valid future event time was found.",
                );
                continue;
            }

            for event_time in event_times {
                summary.events_detected += 1;
                progress.emit(
                    ProgressLevel::Success,
                    format!("Event time detected: {}", event_time.format(TIMESTAMP_FORMAT)),
                );

                if self.scheduler.schedule(&subject, event_time, now) {
                    summary.events_scheduled += 1;
                    progress.emit(
                        ProgressLevel::Success,
                        format!("Reminders scheduled successfully for \"{subject}\"."),
                    );
                } else {
                    progress.emit(
                        ProgressLevel::Warn,
                        "All reminder times are in the past. No new calls scheduled.",
                    );
                }
            }
        }

        progress.emit(
            ProgressLevel::Info,
            format!("Finished processing {} emails.", ids.len()),
        );
        Ok(summary)
    }
}
