//! Bounded command history.
//!
//! Stores recent (command, response) pairs for the presentation layer.
//! Uses a fixed-capacity ring so the process never grows unbounded.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// One dispatched command and its narrated outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// When the command finished dispatching.
    pub at: DateTime<Utc>,
    /// The normalized user utterance.
    pub command: String,
    /// Outcome summary (what was narrated, or a branch marker).
    pub response: String,
}

/// Rolling history with fixed capacity.
#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
}

impl CommandHistory {
    /// Create a history retaining at most `max_entries`.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries.min(64)),
            max_entries: max_entries.max(1),
        }
    }

    /// Record an exchange, evicting the oldest entry at capacity.
    pub fn record(&mut self, command: &str, response: &str) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            at: Utc::now(),
            command: command.to_owned(),
            response: response.to_owned(),
        });
    }

    /// The most recent `n` entries, newest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
