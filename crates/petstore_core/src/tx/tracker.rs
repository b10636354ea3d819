//! Transaction event tracker.
//!
//! Records physical transaction events so tests and the CLI demo can assert
//! how many transactions began, committed or rolled back, and in what order.

use parking_lot::Mutex;
use std::fmt::{Display, Formatter, Write as _};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionEvent {
    Begin,
    Commit,
    Rollback,
    Savepoint,
    RollbackToSavepoint,
    ReleaseSavepoint,
}

impl Display for TransactionEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
            Self::Savepoint => "SAVEPOINT",
            Self::RollbackToSavepoint => "ROLLBACK_TO_SAVEPOINT",
            Self::ReleaseSavepoint => "RELEASE_SAVEPOINT",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub event: TransactionEvent,
    pub handle: u64,
    pub at: SystemTime,
    pub thread: String,
}

impl Display for TransactionRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} tx{} on thread '{}'", self.event, self.handle, self.thread)
    }
}

/// Thread-safe event log; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct TransactionTracker {
    events: Arc<Mutex<Vec<TransactionRecord>>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TransactionEvent, handle: u64) {
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        self.events.lock().push(TransactionRecord {
            event,
            handle,
            at: SystemTime::now(),
            thread,
        });
    }

    pub fn reset(&self) {
        self.events.lock().clear();
    }

    pub fn events(&self) -> Vec<TransactionRecord> {
        self.events.lock().clone()
    }

    pub fn event_types(&self) -> Vec<TransactionEvent> {
        self.events.lock().iter().map(|record| record.event).collect()
    }

    pub fn count(&self, event: TransactionEvent) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|record| record.event == event)
            .count()
    }

    pub fn begin_count(&self) -> usize {
        self.count(TransactionEvent::Begin)
    }

    pub fn commit_count(&self) -> usize {
        self.count(TransactionEvent::Commit)
    }

    pub fn rollback_count(&self) -> usize {
        self.count(TransactionEvent::Rollback)
    }

    pub fn has_committed(&self) -> bool {
        self.commit_count() > 0
    }

    pub fn has_rolled_back(&self) -> bool {
        self.rollback_count() > 0
    }

    pub fn all_committed(&self) -> bool {
        let begins = self.begin_count();
        begins > 0 && begins == self.commit_count() && self.rollback_count() == 0
    }

    pub fn all_rolled_back(&self) -> bool {
        let begins = self.begin_count();
        begins > 0 && begins == self.rollback_count() && self.commit_count() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "BEGIN={} COMMIT={} ROLLBACK={} SAVEPOINT={} ROLLBACK_TO_SAVEPOINT={} RELEASE_SAVEPOINT={}",
            self.begin_count(),
            self.commit_count(),
            self.rollback_count(),
            self.count(TransactionEvent::Savepoint),
            self.count(TransactionEvent::RollbackToSavepoint),
            self.count(TransactionEvent::ReleaseSavepoint),
        )
    }

    pub fn detailed_report(&self) -> String {
        let mut report = self.summary();
        report.push('\n');
        for (index, record) in self.events.lock().iter().enumerate() {
            let _ = writeln!(report, "{}. {}", index + 1, record);
        }
        report
    }
}
