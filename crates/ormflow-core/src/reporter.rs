//! Output channel for lifecycle listeners.
//!
//! Listeners never log on their own; whatever they want to say goes through
//! the [`Reporter`] injected into the connection.

use std::fmt;

use parking_lot::Mutex;
use tracing::info;

use crate::metadata::ListenerKind;

/// Receives messages emitted by lifecycle listeners.
pub trait Reporter: Send + Sync + fmt::Debug {
    /// Record one message.
    fn report(&self, entity: &str, event: ListenerKind, message: &str);
}

/// Forwards listener messages to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, entity: &str, event: ListenerKind, message: &str) {
        info!(target: "ormflow::listener", entity, %event, "{message}");
    }
}

/// One message captured by a [`MemoryReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub entity: String,
    pub event: ListenerKind,
    pub message: String,
}

/// Keeps listener messages in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<ReportEntry>>,
}

impl MemoryReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages captured so far, oldest first.
    pub fn entries(&self) -> Vec<ReportEntry> {
        self.entries.lock().clone()
    }

    /// Messages only, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Drop every captured message.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, entity: &str, event: ListenerKind, message: &str) {
        self.entries.lock().push(ReportEntry {
            entity: entity.to_string(),
            event,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_keeps_order() {
        let reporter = MemoryReporter::new();
        reporter.report("Post", ListenerKind::BeforeInsert, "event: before post insert");
        reporter.report("Post", ListenerKind::AfterInsert, "event: after post insert");

        assert_eq!(
            reporter.messages(),
            vec!["event: before post insert", "event: after post insert"]
        );
        assert_eq!(reporter.entries()[1].event, ListenerKind::AfterInsert);

        reporter.clear();
        assert!(reporter.entries().is_empty());
    }
}
