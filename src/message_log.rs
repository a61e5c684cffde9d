use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One relayed chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sender identity
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    /// Message length in characters
    #[serde(default)]
    pub length: usize,
    /// Deliveries attempted for this message
    #[serde(default)]
    pub attempted: usize,
    /// Deliveries the send API accepted
    #[serde(default)]
    pub delivered: usize,
}

impl LogEntry {
    pub fn new(sender: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender: sender.to_string(),
            timestamp,
            length: 0,
            attempted: 0,
            delivered: 0,
        }
    }
}

/// Append-only record of relayed messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    fn entries_for<'a>(&'a self, sender: Option<&'a str>) -> impl Iterator<Item = &'a LogEntry> {
        self.entries
            .iter()
            .filter(move |e| sender.map_or(true, |s| e.sender == s))
    }

    /// Messages sent at or after `since`, by one sender or by everyone.
    pub fn count_since(&self, sender: Option<&str>, since: DateTime<Utc>) -> usize {
        self.entries_for(sender)
            .filter(|e| e.timestamp >= since)
            .count()
    }

    /// Timestamp of the most recent message, by one sender or by everyone.
    pub fn last_post(&self, sender: Option<&str>) -> Option<DateTime<Utc>> {
        self.entries_for(sender).map(|e| e.timestamp).max()
    }
}
