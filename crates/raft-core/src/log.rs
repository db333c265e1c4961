//! # log
//!
//! why: hold the ordered, replicated sequence of commands raft agrees on
//! relations: owned by node.rs, read by replication.rs to build append requests
//! what: LogEntry, LogStore (append, truncate-from, range reads, conflict-aware merge)

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Opaque client command carried by a log entry.
pub type Command = serde_json::Value;

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term of the leader that created this entry
    pub term: u64,
    /// Position of this entry in the log (0-indexed)
    pub index: u64,
    /// The command to be applied to the state machine
    pub command: Command,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: u64, index: u64, command: Command) -> Self {
        Self {
            term,
            index,
            command,
        }
    }
}

/// In-memory log. Invariant: `entries[i].index == i`.
#[derive(Debug, Clone, Default)]
pub struct LogStore {
    entries: Vec<LogEntry>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last entry, `None` for an empty log
    pub fn last_index(&self) -> Option<u64> {
        self.entries.last().map(|e| e.index)
    }

    /// Term of the last entry, `0` for an empty log
    pub fn last_term(&self) -> u64 {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        self.entries.get(usize::try_from(index).ok()?)
    }

    pub fn term_at(&self, index: u64) -> Option<u64> {
        self.get(index).map(|e| e.term)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Append a command at the tail, stamping it with `term`
    pub fn append(&mut self, term: u64, command: Command) -> &LogEntry {
        let index = self.len();
        self.entries.push(LogEntry::new(term, index, command));
        &self.entries[self.entries.len() - 1]
    }

    /// Drop every entry at or after `index`
    pub fn truncate_from(&mut self, index: u64) {
        if let Ok(at) = usize::try_from(index) {
            self.entries.truncate(at);
        }
    }

    /// Entries in `range`, clamped to the log bounds
    pub fn range(&self, range: Range<u64>) -> &[LogEntry] {
        let len = self.entries.len();
        let start = (range.start as usize).min(len);
        let end = (range.end as usize).clamp(start, len);
        &self.entries[start..end]
    }

    /// Owned copy of `log[start..]`
    pub fn entries_from(&self, start: u64) -> Vec<LogEntry> {
        self.range(start..self.len()).to_vec()
    }

    /// Entries `0..=index`, empty when `index` is `None`
    pub fn prefix_through(&self, index: Option<u64>) -> &[LogEntry] {
        match index {
            Some(i) => self.range(0..i.saturating_add(1)),
            None => &[],
        }
    }

    /// Log-continuity check used by AppendEntries.
    ///
    /// `None` means "before the first entry" and always matches.
    pub fn matches(&self, prev_index: Option<u64>, prev_term: u64) -> bool {
        match prev_index {
            None => true,
            Some(i) => self.term_at(i) == Some(prev_term),
        }
    }

    /// Place `entries` after `prev_index`, truncating only at the first conflict.
    ///
    /// Entries already present with the same term are left untouched, so a
    /// reordered, shorter request never erases a longer one that arrived first.
    /// Returns the index of the last entry covered by the request.
    pub fn merge_from(&mut self, prev_index: Option<u64>, entries: Vec<LogEntry>) -> Option<u64> {
        let start = prev_index.map_or(0, |i| i + 1);
        let covered = match entries.len() as u64 {
            0 => prev_index,
            n => Some(start + n - 1),
        };

        for (offset, entry) in entries.into_iter().enumerate() {
            let index = start + offset as u64;
            match self.term_at(index) {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    self.truncate_from(index);
                    self.entries.push(LogEntry { index, ..entry });
                }
                None => self.entries.push(LogEntry { index, ..entry }),
            }
        }

        covered
    }
}
