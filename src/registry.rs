//! In-memory reminder registry
//!
//! Every reminder the scheduler arms gets one record here. Records start out
//! `Scheduled` and are moved to `Called` or `Failed` by the delayed action
//! that owns them. All access goes through one mutex, so concurrent
//! completions never lose an update.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::models::{ReminderKey, ReminderRecord, ReminderStatus};

/// Shared store of reminder records
#[derive(Debug)]
pub struct ReminderRegistry {
    records: Mutex<Vec<ReminderRecord>>,
    /// Finished records kept before the oldest are dropped; 0 keeps all
    max_finished: usize,
}

impl Default for ReminderRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ReminderRegistry {
    /// Registry keeping at most `max_finished` called or failed records
    ///
    /// Zero keeps every record.
    #[must_use]
    pub fn new(max_finished: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_finished,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ReminderRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record unconditionally
    pub fn append(&self, record: ReminderRecord) {
        self.lock().push(record);
    }

    /// Add a record unless one with the same key already exists
    ///
    /// Returns true if the record was added.
    pub fn insert_if_absent(&self, record: ReminderRecord) -> bool {
        let mut records = self.lock();
        let exists = records.iter().any(|existing| {
            existing.subject == record.subject
                && existing.event_time == record.event_time
                && existing.offset_label == record.offset_label
        });
        if exists {
            debug!(subject = %record.subject, offset = %record.offset_label, "Reminder already registered");
            return false;
        }
        records.push(record);
        true
    }

    /// Set the status of the first record matching `key`
    ///
    /// Returns false, and changes nothing, if no record matches.
    pub fn update_status(&self, key: &ReminderKey, status: ReminderStatus, detail: Option<String>) -> bool {
        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|record| record.matches(key)) else {
            return false;
        };
        record.status = status;
        record.detail = detail;

        if status.is_finished() {
            self.prune(&mut records);
        }
        true
    }

    /// Drop the oldest finished records beyond the retention limit
    fn prune(&self, records: &mut Vec<ReminderRecord>) {
        if self.max_finished == 0 {
            return;
        }

        let finished = records.iter().filter(|r| r.status.is_finished()).count();
        if finished <= self.max_finished {
            return;
        }

        let mut excess = finished - self.max_finished;
        let mut by_age: Vec<_> = records
            .iter()
            .filter(|r| r.status.is_finished())
            .map(|r| r.fires_at_utc)
            .collect();
        by_age.sort();
        let cutoff = by_age[excess - 1];

        records.retain(|record| {
            if excess > 0 && record.status.is_finished() && record.fires_at_utc <= cutoff {
                excess -= 1;
                return false;
            }
            true
        });
        debug!(remaining = records.len(), "Pruned finished reminders");
    }

    /// Copy of every record, latest firing time first
    #[must_use]
    pub fn snapshot(&self) -> Vec<ReminderRecord> {
        let mut records = self.lock().clone();
        records.sort_by(|a, b| b.fires_at_utc.cmp(&a.fires_at_utc));
        records
    }

    /// Number of records still waiting to fire
    #[must_use]
    pub fn pending(&self) -> usize {
        self.count(ReminderStatus::Scheduled)
    }

    /// Number of records with the given status
    #[must_use]
    pub fn count(&self, status: ReminderStatus) -> usize {
        self.lock().iter().filter(|r| r.status == status).count()
    }

    /// Number of records, in any status
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if the registry holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
