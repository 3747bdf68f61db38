//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! A node carries the bookkeeping the runtime needs for invalidation:
//! a version counter, a dirty state, and the edges to its sources and
//! dependents. Values themselves live with the signal/memo handles, not
//! in the graph.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no sources, only dependents.
    Source,

    /// A derived node (memo). These have sources and may have dependents.
    /// Their value is recomputed lazily, on pull.
    Derived,

    /// An effect-like node (effect or render subscription). These are
    /// leaves: they have sources but no dependents, and they are scheduled
    /// eagerly through the batch queue.
    Effect,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's cached output is up-to-date.
    Clean,

    /// A source might have changed. The node must validate its source
    /// version stamps before deciding whether to re-run.
    MaybeDirty,

    /// The node definitely needs to re-run.
    Dirty,
}

/// A node in the dependency graph.
///
/// Edges are stored in both directions: `sources` maps each upstream node
/// to the version it had when this node last read it (the stamp used for
/// staleness validation), and `dependents` is the reverse index used for
/// invalidation.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,

    /// Version counter. Bumped iff the node's observable value changed.
    version: u64,

    /// Upstream nodes this node read during its last run, with the version
    /// each had at read time. Rebuilt in full on every run.
    sources: IndexMap<NodeId, u64>,

    /// Nodes that read from this node during their last run.
    dependents: HashSet<NodeId>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                // Derived/effect nodes start dirty to force the first run.
                NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
            },
            version: 0,
            sources: IndexMap::new(),
            dependents: HashSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty (a source might have changed).
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// Current version of this node's output.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bump the version counter. Called when the node's value changed.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// The stamped source set from the node's last run.
    pub fn sources(&self) -> &IndexMap<NodeId, u64> {
        &self.sources
    }

    /// Replace the stamped source set wholesale.
    pub fn set_sources(&mut self, sources: IndexMap<NodeId, u64>) {
        self.sources = sources;
    }

    pub fn take_sources(&mut self) -> IndexMap<NodeId, u64> {
        std::mem::take(&mut self.sources)
    }

    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.remove(&node_id);
    }

    pub fn dependents(&self) -> &HashSet<NodeId> {
        &self.dependents
    }
}
