//! Append-only combat log.

use serde::{Deserialize, Serialize};

/// Ordered, human-readable record of everything that happened in an
/// encounter. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatLog {
    entries: Vec<String>,
}

impl CombatLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!(target: "neon_core::combat_log", "{entry}");
        self.entries.push(entry);
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Entries appended after the first `cursor` entries, for consumers that
    /// poll the log incrementally.
    #[must_use]
    pub fn since(&self, cursor: usize) -> &[String] {
        self.entries.get(cursor..).unwrap_or_default()
    }

    /// Most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_since() {
        let mut log = CombatLog::new();
        log.record("one");
        log.record(String::from("two"));
        log.record("three");

        assert_eq!(log.len(), 3);
        assert_eq!(log.last(), Some("three"));
        assert_eq!(log.since(1), &["two".to_string(), "three".to_string()]);
        assert!(log.since(3).is_empty());
        assert!(log.since(99).is_empty());
    }
}
