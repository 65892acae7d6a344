//! Normalized filesystem event types.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

/// Structural change to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Path now exists.
    Add,
    /// Path no longer exists.
    Delete,
}

/// A single add or delete of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub is_dir: bool,
}

impl PathEvent {
    pub fn add(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Add,
            is_dir,
        }
    }

    pub fn delete(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Delete,
            is_dir,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ordered batch of events delivered together.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventBatch {
    events: Vec<PathEvent>,
}

impl EventBatch {
    /// Create a new empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, collapsing it into the previous one if identical.
    pub fn push(&mut self, event: PathEvent) {
        if self.events.last() != Some(&event) {
            self.events.push(event);
        }
    }

    /// Check if batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathEvent> {
        self.events.iter()
    }
}

impl Extend<PathEvent> for EventBatch {
    fn extend<I: IntoIterator<Item = PathEvent>>(&mut self, iter: I) {
        for event in iter {
            self.push(event);
        }
    }
}

impl FromIterator<PathEvent> for EventBatch {
    fn from_iter<I: IntoIterator<Item = PathEvent>>(iter: I) -> Self {
        let mut batch = Self::new();
        batch.extend(iter);
        batch
    }
}

impl IntoIterator for EventBatch {
    type Item = PathEvent;
    type IntoIter = std::vec::IntoIter<PathEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventBatch {
    type Item = &'a PathEvent;
    type IntoIter = std::slice::Iter<'a, PathEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_duplicates_collapse() {
        let mut batch = EventBatch::new();
        batch.push(PathEvent::add("/a", false));
        batch.push(PathEvent::add("/a", false));
        batch.push(PathEvent::add("/b", true));

        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_order_preserved_across_kinds() {
        let batch: EventBatch = [
            PathEvent::add("/a", false),
            PathEvent::delete("/a", false),
            PathEvent::add("/a", false),
        ]
        .into_iter()
        .collect();

        let kinds: Vec<EventKind> = batch.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Add, EventKind::Delete, EventKind::Add]);
    }

    #[test]
    fn test_kind_distinguishes_duplicates() {
        let mut batch = EventBatch::new();
        batch.push(PathEvent::delete("/gone", false));
        batch.push(PathEvent::delete("/gone", true));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_batch_len_and_empty() {
        let mut batch = EventBatch::new();
        assert!(batch.is_empty());
        batch.push(PathEvent::add("/x", false));
        assert!(!batch.is_empty());
        assert_eq!(batch.into_iter().count(), 1);
    }
}
