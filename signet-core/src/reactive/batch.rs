//! Batch Queue
//!
//! The batch queue is the write-grouping boundary. Signal writes apply
//! immediately, but the effects they invalidate are collected here and run
//! when the outermost batch closes. Each effect is queued at most once per
//! batch regardless of how many of its sources changed.
//!
//! A write outside any explicit batch behaves as a batch of one: it
//! enqueues and the runtime flushes immediately.

use indexmap::IndexSet;

use crate::graph::NodeId;

/// Pending effect schedule plus batch nesting state.
///
/// Kept behind a single mutex in the runtime; none of these methods run
/// user code.
#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    /// Nesting depth of open explicit batches.
    depth: usize,
    /// Set while the runtime is draining the queue, so writes performed by
    /// running effects enqueue instead of recursing into another flush.
    flushing: bool,
    /// Effects scheduled to run, deduplicated, in first-scheduled order.
    pending: IndexSet<NodeId>,
}

impl BatchQueue {
    pub fn open(&mut self) {
        self.depth += 1;
    }

    pub fn close(&mut self) {
        debug_assert!(self.depth > 0, "batch close without open");
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn schedule(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.pending.extend(nodes);
    }

    /// Try to claim the queue for draining. Returns `false` when a batch is
    /// still open, another drain is in progress, or nothing is pending.
    pub fn begin_flush(&mut self) -> bool {
        if self.depth > 0 || self.flushing || self.pending.is_empty() {
            return false;
        }
        self.flushing = true;
        true
    }

    /// Take the current pending set. Effects that schedule more work while
    /// running land in a fresh set, picked up by the flush loop.
    pub fn drain(&mut self) -> Vec<NodeId> {
        self.pending.drain(..).collect()
    }

    pub fn end_flush(&mut self) {
        self.flushing = false;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
