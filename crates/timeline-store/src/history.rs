//! Snapshot-based undo/redo.
//!
//! - Undo/redo stacks of state snapshots, each labelled with the action
//! - Pushing a new entry clears the redo stack
//! - Batch mode collapses a gesture (a drag, a trim) into one entry
//! - The oldest entries are dropped beyond `max_entries`
//!
//! ```ignore
//! history.push("Move clip", before.clone());
//!
//! if let Some(previous) = history.undo(current) {
//!     state = previous;
//! }
//! ```

use std::collections::VecDeque;

/// One undo or redo step.
#[derive(Clone, Debug)]
struct HistoryEntry<S> {
    label: String,
    snapshot: S,
}

/// Undo/redo stacks over snapshots of type `S`.
#[derive(Clone, Debug)]
pub struct HistoryManager<S> {
    undo_stack: VecDeque<HistoryEntry<S>>,
    redo_stack: Vec<HistoryEntry<S>>,
    max_entries: usize,
    /// Label and "before" snapshot of the open batch.
    batch: Option<HistoryEntry<S>>,
}

impl<S> HistoryManager<S> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_entries,
            batch: None,
        }
    }

    fn push_entry(&mut self, entry: HistoryEntry<S>) {
        self.redo_stack.clear();
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.max_entries {
            self.undo_stack.pop_front();
        }
    }

    /// Record the state from before an action. Suppressed while batching.
    pub fn push(&mut self, label: &str, before: S) {
        if self.batch.is_some() {
            tracing::trace!(label, "Push suppressed: batch in progress");
            return;
        }
        self.push_entry(HistoryEntry {
            label: label.to_string(),
            snapshot: before,
        });
        tracing::debug!(label, undo_depth = self.undo_stack.len(), "History entry pushed");
    }

    /// Close a batch left open by a lost gesture end.
    fn end_stuck_batch(&mut self) {
        if self.batch.is_some() {
            tracing::warn!("Ending stuck batch");
            self.end_batch();
        }
    }

    /// Step back. `current` is kept for redo; the returned snapshot replaces
    /// it.
    pub fn undo(&mut self, current: S) -> Option<S> {
        self.end_stuck_batch();
        let entry = self.undo_stack.pop_back()?;
        tracing::debug!(label = %entry.label, undo_remaining = self.undo_stack.len(), "Undo");
        self.redo_stack.push(HistoryEntry {
            label: entry.label,
            snapshot: current,
        });
        Some(entry.snapshot)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: S) -> Option<S> {
        self.end_stuck_batch();
        let entry = self.redo_stack.pop()?;
        tracing::debug!(label = %entry.label, redo_remaining = self.redo_stack.len(), "Redo");
        self.undo_stack.push_back(HistoryEntry {
            label: entry.label,
            snapshot: current,
        });
        Some(entry.snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Start collapsing pushes into one entry that restores `before`.
    /// A second start while batching is ignored.
    pub fn start_batch(&mut self, label: &str, before: S) {
        if self.batch.is_some() {
            tracing::warn!(label, "start_batch called while already batching, ignoring");
            return;
        }
        self.batch = Some(HistoryEntry {
            label: label.to_string(),
            snapshot: before,
        });
        tracing::debug!(label, "Batch started");
    }

    /// Close the batch, pushing its single entry. No-op without a batch.
    pub fn end_batch(&mut self) {
        if let Some(entry) = self.batch.take() {
            tracing::debug!(label = %entry.label, "Batch ended");
            self.push_entry(entry);
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_some()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.label.as_str())
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.batch = None;
        tracing::debug!("History cleared");
    }

    /// Change the depth limit, dropping the oldest entries if needed.
    pub fn set_max_entries(&mut self, max: usize) {
        self.max_entries = max;
        while self.undo_stack.len() > self.max_entries {
            self.undo_stack.pop_front();
        }
    }
}
