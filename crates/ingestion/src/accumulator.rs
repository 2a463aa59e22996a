//! Accumulation of recoverable per-member failures.

use std::fmt::Display;

/// Collects recoverable member-level errors during one ingestion.
///
/// The accumulator is threaded explicitly through the collect phase, one
/// per ingestion call; the joined text becomes the file memo.
#[derive(Debug, Default)]
pub struct ParseFailures {
    entries: Vec<String>,
}

impl ParseFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one member's failure.
    pub fn record(&mut self, member: &str, error: impl Display) {
        self.entries.push(format!("{member}: {error}"));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Joined diagnostic text, or `None` when the ingestion ran clean.
    pub fn memo(&self) -> Option<String> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.join("; "))
        }
    }
}
