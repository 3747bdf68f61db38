//! Tracking Scopes
//!
//! The scope stack records which consumer is currently evaluating. When a
//! signal or memo is read while a tracking scope is active, the read is
//! attributed to the top-of-stack scope; reads outside any scope create no
//! subscription.
//!
//! # Implementation
//!
//! Each runtime owns one scope stack. Entering a scope (running a memo,
//! effect, or tracked render) pushes a frame; the frame collects the stamped
//! source set as reads happen. Frames are popped by a drop guard, so the
//! stack is restored exactly even when the evaluated body panics or returns
//! early. The instrumentation transform depends on this contract.
//!
//! Untracked sections push a sentinel frame instead: while a sentinel is on
//! top, reads are attributed to nothing. Sentinels nest freely, so
//! `untracked` calls compose without restoring outer tracking early.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::graph::NodeId;

/// A single frame on the tracking stack.
#[derive(Debug)]
pub(crate) enum ScopeFrame {
    /// A consumer is evaluating; reads append to `sources`.
    Tracking {
        owner: NodeId,
        sources: IndexMap<NodeId, u64>,
    },
    /// An untracked sentinel; reads are dropped.
    Untracked,
}

/// The per-runtime stack of active scopes.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    frames: SmallVec<[ScopeFrame; 4]>,
}

impl ScopeStack {
    pub fn push_tracking(&mut self, owner: NodeId) {
        self.frames.push(ScopeFrame::Tracking {
            owner,
            sources: IndexMap::new(),
        });
    }

    pub fn push_untracked(&mut self) {
        self.frames.push(ScopeFrame::Untracked);
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        self.frames.pop()
    }

    /// Whether a read right now would be attributed to a consumer.
    pub fn is_tracking(&self) -> bool {
        matches!(self.frames.last(), Some(ScopeFrame::Tracking { .. }))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Attribute a read of `source` (at `version`) to the current scope.
    /// Recording the same source twice is a no-op; the first stamp wins.
    pub fn record(&mut self, source: NodeId, version: u64) {
        if let Some(ScopeFrame::Tracking { sources, .. }) = self.frames.last_mut() {
            sources.entry(source).or_insert(version);
        }
    }

    /// Whether `node` is a consumer currently mid-evaluation on this stack.
    /// Used for cycle detection.
    pub fn is_evaluating(&self, node: NodeId) -> bool {
        self.frames.iter().any(|frame| {
            matches!(frame, ScopeFrame::Tracking { owner, .. } if *owner == node)
        })
    }
}
