//! Bounded linear undo/redo history of buffer snapshots
//!
//! Pushing while not at the tail drops the redo branch. Once the stack is
//! full the oldest snapshot is evicted and the index stays at the tail.

use std::collections::VecDeque;

/// Default number of snapshots kept
pub const MAX_HISTORY: usize = 30;

#[derive(Debug, Clone)]
pub struct HistoryStack {
    entries: VecDeque<String>,
    /// Position of the current snapshot; `None` while empty
    index: Option<usize>,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl HistoryStack {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            index: None,
            capacity,
        }
    }

    /// Record a snapshot. Returns `false` when it equals the current one.
    pub fn push(&mut self, snapshot: &str) -> bool {
        if self.current() == Some(snapshot) {
            return false;
        }

        if let Some(index) = self.index {
            self.entries.truncate(index + 1);
        }
        self.entries.push_back(snapshot.to_string());

        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        } else {
            self.index = Some(self.index.map_or(0, |i| i + 1));
        }
        true
    }

    /// Step back, returning the snapshot now current
    pub fn undo(&mut self) -> Option<&str> {
        match self.index {
            Some(index) if index > 0 => {
                self.index = Some(index - 1);
                self.current()
            }
            _ => None,
        }
    }

    /// Step forward, returning the snapshot now current
    pub fn redo(&mut self) -> Option<&str> {
        match self.index {
            Some(index) if index + 1 < self.entries.len() => {
                self.index = Some(index + 1);
                self.current()
            }
            _ => None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.index
            .and_then(|i| self.entries.get(i))
            .map(String::as_str)
    }

    pub fn can_undo(&self) -> bool {
        self.index.is_some_and(|i| i > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.index.is_some_and(|i| i + 1 < self.entries.len())
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
