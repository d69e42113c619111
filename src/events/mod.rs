//! Structured event recording.
//!
//! The orchestrator reports everything it does through an [`EventSink`].
//! Sinks are best-effort: `emit` never fails and never panics, so a broken
//! log destination cannot stop a backup run.

mod log;
mod types;

use parking_lot::Mutex;

pub use log::{EventLog, LogFileKind, parse_log_file_name};
pub use types::{BackupEvent, Level, LogRecord, bytes_to_mb};

/// Destination for structured events.
pub trait EventSink {
    /// Record one event at the given level. Must swallow its own failures.
    fn emit(&self, level: Level, event: &BackupEvent);

    /// Record an event at its default level.
    fn record(&self, event: BackupEvent) {
        self.emit(event.default_level(), &event);
    }

    /// Maintenance that may change the sink's storage, such as pruning old
    /// files. Called only by a run that holds the lock.
    fn housekeeping(&self) {}
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn emit(&self, level: Level, event: &BackupEvent) {
        (**self).emit(level, event);
    }

    fn housekeeping(&self) {
        (**self).housekeeping();
    }
}

/// In-memory sink that keeps every record, for inspection in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records emitted so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Event kinds in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        self.records.lock().iter().map(|r| r.event.kind()).collect()
    }

    /// All events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: &str) -> Vec<BackupEvent> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event.kind() == kind)
            .map(|r| r.event.clone())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, level: Level, event: &BackupEvent) {
        self.records.lock().push(LogRecord::new(level, event.clone()));
    }
}
