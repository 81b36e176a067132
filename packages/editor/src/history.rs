//! # History Engine
//!
//! Linear, bounded snapshot log with a cursor.
//!
//! ## Design
//!
//! - Every real document change pushes a `(document, tombstones)` snapshot
//! - Undo/redo move the cursor; the snapshot under the cursor is current
//! - A new push discards everything after the cursor
//! - Pushing past the bound evicts the oldest snapshot
//! - Commit records a baseline used for dirty detection
//!
//! Snapshots share their documents through `Arc`, so stepping through history
//! never copies a document and nobody can mutate one in place.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = History::new(100);
//!
//! history.push(Snapshot::new(doc, tombstones));
//! assert!(history.has_unsaved_changes());
//!
//! let previous = history.undo();
//! let next = history.redo();
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::sync::Arc;

use crate::config::DEFAULT_MAX_HISTORY;
use crate::diff::canonically_equal;
use crate::document::EaC;

/// Immutable `(document, tombstones)` pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub document: Arc<EaC>,

    #[serde(rename = "deleteTombstones")]
    pub tombstones: Arc<EaC>,
}

impl Snapshot {
    pub fn new(document: EaC, tombstones: EaC) -> Self {
        Self {
            document: Arc::new(document),
            tombstones: Arc::new(tombstones),
        }
    }

    pub fn from_shared(document: Arc<EaC>, tombstones: Arc<EaC>) -> Self {
        Self {
            document,
            tombstones,
        }
    }

    pub fn empty() -> Self {
        Self::new(Map::new(), Map::new())
    }

    /// Compare by canonical serialization of both documents
    pub fn canonically_equal(&self, other: &Snapshot) -> bool {
        canonically_equal(&self.document, &other.document)
            && canonically_equal(&self.tombstones, &other.tombstones)
    }
}

/// Snapshot log for one document
#[derive(Debug, Clone)]
pub struct History {
    /// Snapshots, oldest first
    snapshots: Vec<Snapshot>,

    /// Index of the current snapshot
    cursor: usize,

    /// Maximum number of snapshots kept
    max_history: usize,

    /// Baseline for dirty detection
    last_committed: Option<Snapshot>,

    /// Raised explicitly by callers to force a dirty state
    dirty: bool,
}

impl History {
    /// Create a history seeded with one empty, committed snapshot
    pub fn new(max_history: usize) -> Self {
        let seed = Snapshot::empty();
        Self {
            snapshots: vec![seed.clone()],
            cursor: 0,
            max_history: max_history.max(1),
            last_committed: Some(seed),
            dirty: false,
        }
    }

    /// Create a history with no commit baseline
    pub fn uncommitted(max_history: usize) -> Self {
        Self {
            last_committed: None,
            ..Self::new(max_history)
        }
    }

    /// Record a new snapshot, discarding any redo future
    pub fn push(&mut self, snapshot: Snapshot) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(snapshot);
        self.cursor = self.snapshots.len() - 1;

        if self.snapshots.len() > self.max_history {
            self.snapshots.remove(0);
            self.cursor -= 1;
        }
    }

    /// Step back one snapshot
    pub fn undo(&mut self) -> Option<Snapshot> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    /// Step forward one snapshot
    pub fn redo(&mut self) -> Option<Snapshot> {
        if self.cursor + 1 >= self.snapshots.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    /// Snapshot under the cursor
    pub fn current(&self) -> Snapshot {
        self.snapshots[self.cursor].clone()
    }

    /// Make the current snapshot the dirty-detection baseline
    pub fn commit(&mut self) {
        self.last_committed = Some(self.current());
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        match &self.last_committed {
            None => true,
            Some(_) if self.dirty => true,
            Some(committed) => !self.snapshots[self.cursor].canonically_equal(committed),
        }
    }

    /// Push the committed baseline as a new, undoable snapshot.
    ///
    /// Nothing is pushed when the current snapshot already matches it.
    pub fn revert_to_last_commit(&mut self) -> Option<Snapshot> {
        let committed = self.last_committed.clone()?;
        if !self.snapshots[self.cursor].canonically_equal(&committed) {
            self.push(committed.clone());
        }
        self.dirty = false;
        Some(committed)
    }

    /// Detached deep copy of the current document, without tombstones
    pub fn fork_runtime(&self) -> EaC {
        self.snapshots[self.cursor].document.as_ref().clone()
    }

    /// Drop all history and start over from one committed snapshot
    pub fn reset_from_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshots = vec![snapshot.clone()];
        self.cursor = 0;
        self.last_committed = Some(snapshot);
        self.dirty = false;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn last_committed(&self) -> Option<&Snapshot> {
        self.last_committed.as_ref()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
