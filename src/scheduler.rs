//! Reminder scheduling
//!
//! Each event gets up to three reminder calls. Every call is an independent
//! delayed action: it sleeps until its firing instant, places the call and
//! records the outcome in the [`ReminderRegistry`]. Actions are never
//! cancelled or retried.

use chrono::DateTime;
use chrono_tz::Tz;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::config::ConfigHandle;
use crate::error::{ReminderError, Result};
use crate::metrics::MetricsCollector;
use crate::models::{ReminderKey, ReminderOffset, ReminderRecord, ReminderStatus};
use crate::notifier::NotificationSink;
use crate::registry::ReminderRegistry;

/// Work run by a delayed action
pub type DelayedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs a task once, after a delay
pub trait DelayedExecutor: Send + Sync {
    /// Run `task` once `delay` has elapsed
    fn schedule(&self, delay: Duration, task: DelayedTask);
}

/// Delayed actions as tokio tasks
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Executor spawning onto `handle`
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime the caller is running on
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ReminderError::Other(format!("No tokio runtime available: {e}")))?;
        Ok(Self::new(handle))
    }
}

impl DelayedExecutor for TokioExecutor {
    fn schedule(&self, delay: Duration, task: DelayedTask) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Text spoken in the reminder call
#[must_use]
pub fn render_message(subject: &str, offset: ReminderOffset) -> String {
    format!("Reminder: {subject} starts {}", offset.spoken())
}

/// Arms reminder calls for detected events
pub struct ReminderScheduler {
    registry: Arc<ReminderRegistry>,
    executor: Arc<dyn DelayedExecutor>,
    sink: Arc<dyn NotificationSink>,
    config: ConfigHandle,
    metrics: MetricsCollector,
}

impl ReminderScheduler {
    /// Scheduler recording into `registry` and calling through `sink`
    pub fn new(
        registry: Arc<ReminderRegistry>,
        executor: Arc<dyn DelayedExecutor>,
        sink: Arc<dyn NotificationSink>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            registry,
            executor,
            sink,
            config,
            metrics: MetricsCollector::default(),
        }
    }

    /// Registry the scheduler records into
    #[must_use]
    pub fn registry(&self) -> &Arc<ReminderRegistry> {
        &self.registry
    }

    /// Arm every offset of `event_time` that is still ahead of `now`
    ///
    /// Returns true if at least one offset is in the future, including
    /// offsets that were already armed by an earlier scan.
    pub fn schedule(&self, subject: &str, event_time: DateTime<Tz>, now: DateTime<Tz>) -> bool {
        let mut any_future = false;

        for offset in ReminderOffset::ALL {
            let fires_at = offset.fires_at(event_time);
            let delay = match (fires_at - now).to_std() {
                Ok(delay) if !delay.is_zero() => delay,
                _ => {
                    info!(subject, offset = %offset, fires_at = %fires_at, "Skipping past reminder");
                    self.metrics.record_reminder_skipped(offset);
                    continue;
                }
            };
            any_future = true;

            let key = ReminderKey::new(subject, &event_time, offset);
            if !self.registry.insert_if_absent(ReminderRecord::scheduled(key.clone(), fires_at)) {
                debug!(subject, offset = %offset, "Reminder already armed");
                continue;
            }

            info!(
                subject,
                offset = %offset,
                fires_at = %fires_at,
                delay_secs = delay.as_secs(),
                "Reminder scheduled"
            );
            self.metrics.record_reminder_scheduled(offset);

            let action = DeliveryAction {
                key,
                message: render_message(subject, offset),
                offset,
                registry: Arc::clone(&self.registry),
                sink: Arc::clone(&self.sink),
                config: self.config.clone(),
                metrics: self.metrics,
            };
            self.executor.schedule(delay, Box::pin(action.run()));
        }

        self.metrics.set_pending_reminders(self.registry.pending());
        any_future
    }
}

/// Everything one delayed call needs once it fires
struct DeliveryAction {
    key: ReminderKey,
    message: String,
    offset: ReminderOffset,
    registry: Arc<ReminderRegistry>,
    sink: Arc<dyn NotificationSink>,
    config: ConfigHandle,
    metrics: MetricsCollector,
}

impl DeliveryAction {
    async fn run(self) {
        let started = Instant::now();
        let destination = self.config.notification().destination;

        let outcome = if destination.trim().is_empty() {
            Err(ReminderError::Delivery("No destination phone number configured".to_string()))
        } else {
            self.sink.deliver(&destination, &self.message).await
        };

        let (status, detail) = match outcome {
            Ok(()) => {
                info!(subject = %self.key.subject, offset = %self.offset, "Reminder call placed");
                (ReminderStatus::Called, None)
            }
            Err(e) => {
                error!(subject = %self.key.subject, offset = %self.offset, error = %e, "Reminder call failed");
                (ReminderStatus::Failed, Some(e.to_string()))
            }
        };

        self.metrics
            .record_delivery(self.offset, started.elapsed(), status == ReminderStatus::Called);
        if !self.registry.update_status(&self.key, status, detail) {
            debug!(subject = %self.key.subject, offset = %self.offset, "No record to update");
        }
        self.metrics.set_pending_reminders(self.registry.pending());
    }
}
