//! Ordered error log
//!
//! Every failed store call appends an entry here instead of returning a
//! fault to the caller. Entries are never pruned; index 0 always addresses
//! the most recent one.

use chrono::{DateTime, Utc};

use crate::storage::error::{ErrorKind, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Input was coerced; the call went ahead
    Warning,
    /// The call was aborted
    Error,
}

/// One logged failure or warning
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub severity: Severity,
    /// Set for errors, `None` for warnings
    pub kind: Option<ErrorKind>,
    pub message: String,
    /// Store operations active when the entry was raised, outermost first
    pub trace: Vec<String>,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn error(error: &StoreError, trace: Vec<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind: Some(error.kind()),
            message: error.to_string(),
            trace,
            at: Utc::now(),
        }
    }

    pub fn warning(message: impl Into<String>, trace: Vec<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind: None,
            message: message.into(),
            trace,
            at: Utc::now(),
        }
    }

    /// Trace rendered as `outer > inner`
    pub fn trace_line(&self) -> String {
        self.trace.join(" > ")
    }
}

/// Append-only entry sequence
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: Vec<LogEntry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry `n` positions back from the most recent
    pub fn back(&self, n: usize) -> Option<&LogEntry> {
        let index = self.entries.len().checked_sub(n.checked_add(1)?)?;
        self.entries.get(index)
    }

    /// Entries, most recent first
    pub fn recent(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().rev()
    }
}
