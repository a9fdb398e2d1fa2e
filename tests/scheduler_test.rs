//! Integration tests for reminder scheduling and delivery

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use chrono_tz::Asia::Kolkata;
use chrono_tz::Tz;
use mockall::mock;

use inbox_call_reminder::config::{AppConfig, ConfigHandle, ConfigUpdate};
use inbox_call_reminder::error::{ReminderError, Result};
use inbox_call_reminder::models::{ReminderOffset, ReminderStatus};
use inbox_call_reminder::notifier::{DryRunSink, NotificationSink};
use inbox_call_reminder::registry::ReminderRegistry;
use inbox_call_reminder::scheduler::{DelayedExecutor, DelayedTask, ReminderScheduler, TokioExecutor};

mock! {
    pub Sink {}

    #[async_trait]
    impl NotificationSink for Sink {
        async fn deliver(&self, destination: &str, message: &str) -> Result<()>;
    }
}

/// Collects delayed tasks so a test decides when they run
#[derive(Default)]
struct ManualExecutor {
    tasks: Mutex<Vec<(Duration, DelayedTask)>>,
}

impl DelayedExecutor for ManualExecutor {
    fn schedule(&self, delay: Duration, task: DelayedTask) {
        self.tasks.lock().unwrap().push((delay, task));
    }
}

impl ManualExecutor {
    fn delays(&self) -> Vec<Duration> {
        self.tasks.lock().unwrap().iter().map(|(delay, _)| *delay).collect()
    }

    fn take(&self) -> Vec<DelayedTask> {
        self.tasks.lock().unwrap().drain(..).map(|(_, task)| task).collect()
    }
}

struct Harness {
    scheduler: ReminderScheduler,
    executor: Arc<ManualExecutor>,
    registry: Arc<ReminderRegistry>,
    config: ConfigHandle,
}

fn harness(sink: impl NotificationSink + 'static, destination: &str) -> Harness {
    let mut app_config = AppConfig::default();
    app_config.notification.destination = destination.to_string();
    let config = ConfigHandle::new(app_config);
    let registry = Arc::new(ReminderRegistry::new(0));
    let executor = Arc::new(ManualExecutor::default());
    let scheduler = ReminderScheduler::new(
        Arc::clone(&registry),
        executor.clone(),
        Arc::new(sink),
        config.clone(),
    );

    Harness {
        scheduler,
        executor,
        registry,
        config,
    }
}

fn now() -> DateTime<Tz> {
    Kolkata.with_ymd_and_hms(2030, 1, 10, 8, 0, 0).unwrap()
}

fn recording_sink(calls: Arc<Mutex<Vec<(String, String)>>>, expected: usize) -> MockSink {
    let mut sink = MockSink::new();
    sink.expect_deliver().times(expected).returning(move |destination, message| {
        calls
            .lock()
            .unwrap()
            .push((destination.to_string(), message.to_string()));
        Ok(())
    });
    sink
}

fn status_of(registry: &ReminderRegistry, offset: ReminderOffset) -> (ReminderStatus, Option<String>) {
    let record = registry
        .snapshot()
        .into_iter()
        .find(|r| r.offset_label == offset.label())
        .expect("record for offset");
    (record.status, record.detail)
}

#[test]
fn test_event_30_minutes_ahead_schedules_only_event_time() {
    let mut sink = MockSink::new();
    sink.expect_deliver().never();
    let h = harness(sink, "+919876543210");

    let event = now() + chrono::Duration::minutes(30);
    assert!(h.scheduler.schedule("Standup", event, now()));

    let records = h.registry.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].offset_label, "At the time of event");
    assert_eq!(records[0].status, ReminderStatus::Scheduled);
    assert_eq!(h.executor.delays(), vec![Duration::from_secs(30 * 60)]);
}

#[test]
fn test_past_event_schedules_nothing() {
    let mut sink = MockSink::new();
    sink.expect_deliver().never();
    let h = harness(sink, "+919876543210");

    let event = now() - chrono::Duration::minutes(5);
    assert!(!h.scheduler.schedule("Old news", event, now()));
    assert!(h.registry.is_empty());
    assert!(h.executor.delays().is_empty());
}

#[test]
fn test_event_exactly_now_schedules_nothing() {
    let h = harness(DryRunSink, "+919876543210");
    assert!(!h.scheduler.schedule("Right now", now(), now()));
    assert!(h.registry.is_empty());
}

#[test]
fn test_distant_event_schedules_all_offsets() {
    let h = harness(DryRunSink, "+919876543210");

    let event = now() + chrono::Duration::hours(5);
    assert!(h.scheduler.schedule("Demo day", event, now()));

    assert_eq!(h.registry.len(), 3);
    assert_eq!(h.registry.pending(), 3);
    assert_eq!(
        h.executor.delays(),
        vec![
            Duration::from_secs(2 * 3600),
            Duration::from_secs(4 * 3600),
            Duration::from_secs(5 * 3600),
        ]
    );
    let labels: Vec<_> = h.registry.snapshot().into_iter().map(|r| r.offset_label).collect();
    assert_eq!(labels, vec!["At the time of event", "1 hour before", "3 hours before"]);
}

#[test]
fn test_rescheduling_does_not_double_book() {
    let h = harness(DryRunSink, "+919876543210");
    let event = now() + chrono::Duration::hours(5);

    assert!(h.scheduler.schedule("Demo day", event, now()));
    assert!(h.scheduler.schedule("Demo day", event, now()));

    assert_eq!(h.registry.len(), 3);
    assert_eq!(h.executor.delays().len(), 3);
}

#[tokio::test]
async fn test_delivery_marks_records_called() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let h = harness(recording_sink(Arc::clone(&calls), 3), "+919876543210");

    let event = now() + chrono::Duration::hours(5);
    h.scheduler.schedule("Demo day", event, now());
    for task in h.executor.take() {
        task.await;
    }

    assert_eq!(h.registry.count(ReminderStatus::Called), 3);
    let calls = calls.lock().unwrap();
    assert_eq!(
        calls[0],
        (
            "+919876543210".to_string(),
            "Reminder: Demo day starts in 3 hours".to_string()
        )
    );
    assert_eq!(calls[1].1, "Reminder: Demo day starts in 1 hour");
    assert_eq!(calls[2].1, "Reminder: Demo day starts now");
}

#[tokio::test]
async fn test_failed_delivery_only_affects_its_record() {
    let mut sink = MockSink::new();
    sink.expect_deliver().times(3).returning(|_, message| {
        if message.contains("in 1 hour") {
            Err(ReminderError::Delivery("line busy".to_string()))
        } else {
            Ok(())
        }
    });
    let h = harness(sink, "+919876543210");

    h.scheduler.schedule("Demo day", now() + chrono::Duration::hours(5), now());
    for task in h.executor.take() {
        task.await;
    }

    let (status, detail) = status_of(&h.registry, ReminderOffset::OneHourBefore);
    assert_eq!(status, ReminderStatus::Failed);
    assert!(detail.unwrap().contains("line busy"));
    assert_eq!(status_of(&h.registry, ReminderOffset::ThreeHoursBefore).0, ReminderStatus::Called);
    assert_eq!(status_of(&h.registry, ReminderOffset::AtEventTime).0, ReminderStatus::Called);
}

#[tokio::test]
async fn test_missing_destination_is_a_failure() {
    let mut sink = MockSink::new();
    sink.expect_deliver().never();
    let h = harness(sink, "");

    h.scheduler.schedule("Standup", now() + chrono::Duration::minutes(30), now());
    for task in h.executor.take() {
        task.await;
    }

    let (status, detail) = status_of(&h.registry, ReminderOffset::AtEventTime);
    assert_eq!(status, ReminderStatus::Failed);
    assert!(detail.is_some());
}

#[tokio::test]
async fn test_destination_is_read_at_fire_time() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let h = harness(recording_sink(Arc::clone(&calls), 1), "+919876543210");

    h.scheduler.schedule("Standup", now() + chrono::Duration::minutes(30), now());
    h.config
        .apply(ConfigUpdate {
            destination: Some("+14155550123".to_string()),
            ..ConfigUpdate::default()
        })
        .unwrap();
    for task in h.executor.take() {
        task.await;
    }

    assert_eq!(calls.lock().unwrap()[0].0, "+14155550123");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_are_all_recorded() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let h = harness(recording_sink(Arc::clone(&calls), 30), "+919876543210");

    for i in 0..10 {
        let event = now() + chrono::Duration::hours(5) + chrono::Duration::minutes(i);
        assert!(h.scheduler.schedule(&format!("Event {i}"), event, now()));
    }

    let handles: Vec<_> = h.executor.take().into_iter().map(tokio::spawn).collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.registry.len(), 30);
    assert_eq!(h.registry.count(ReminderStatus::Called), 30);
    assert_eq!(h.registry.pending(), 0);
    assert_eq!(calls.lock().unwrap().len(), 30);
}

#[tokio::test]
async fn test_tokio_executor_fires_after_delay() {
    let registry = Arc::new(ReminderRegistry::new(0));
    let mut app_config = AppConfig::default();
    app_config.notification.destination = "+919876543210".to_string();
    let scheduler = ReminderScheduler::new(
        Arc::clone(&registry),
        Arc::new(TokioExecutor::current().unwrap()),
        Arc::new(DryRunSink),
        ConfigHandle::new(app_config),
    );

    let event = now() + chrono::Duration::milliseconds(50);
    assert!(scheduler.schedule("Quick sync", event, now()));
    assert_eq!(registry.pending(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(registry.count(ReminderStatus::Called), 1);
}
