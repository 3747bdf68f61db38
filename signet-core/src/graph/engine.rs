//! Dependency Graph Engine
//!
//! The engine resolves a source change into the set of consumers that must
//! be revalidated, and decides the order effects settle in.
//!
//! # Algorithm
//!
//! The update model is push-pull:
//!
//! 1. When a source node changes, its version is bumped and all transitive
//!    dependents are marked "maybe dirty" with a BFS over the reverse edges.
//! 2. Effect-kind nodes reached by the BFS are collected for scheduling;
//!    derived nodes are not recomputed here; they recompute on next pull.
//! 3. At flush time, scheduled effects are processed in topological order
//!    (dependencies before dependents) so no consumer runs before its dirty
//!    upstream has settled.
//! 4. A maybe-dirty consumer validates its stamped sources before re-running;
//!    if every source version still matches, it is marked clean without a
//!    re-run. This is what keeps diamonds glitch-free: an unchanged memo
//!    never re-dirties its own dependents.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use super::node::{Node, NodeId, NodeKind};

/// The bipartite-like graph of sources and consumers.
///
/// The graph owns invalidation bookkeeping only; signal values and memo
/// caches live with their handles. All structural mutation goes through
/// [`DependencyGraph::commit`] and [`DependencyGraph::mark_changed`], which
/// preserves the version-based invalidation invariant.
pub struct DependencyGraph {
    nodes: HashMap<NodeId, Node>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a fresh node of the given kind, returning its ID.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    /// Remove a node and every edge involving it.
    ///
    /// Used both for dropped signals/memos and for disposed effects; for the
    /// latter this is what detaches the effect from every source's dependent
    /// set immediately.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for source_id in node.sources().keys() {
                if let Some(source) = self.nodes.get_mut(source_id) {
                    source.remove_dependent(node_id);
                }
            }
            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    let mut sources = dependent.take_sources();
                    sources.shift_remove(&node_id);
                    dependent.set_sources(sources);
                    // The dependent lost an upstream edge; force it to
                    // re-establish its source set on next run.
                    dependent.mark_dirty();
                }
            }
        }
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Current version of a node's output, if the node still exists.
    pub fn version(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(|n| n.version())
    }

    /// Snapshot of a consumer's stamped source set.
    pub fn sources_of(&self, node_id: NodeId) -> Vec<(NodeId, u64)> {
        self.nodes
            .get(&node_id)
            .map(|n| n.sources().iter().map(|(id, v)| (*id, *v)).collect())
            .unwrap_or_default()
    }

    /// Commit the outcome of a consumer's run: rewire its source edges to
    /// the freshly collected set (stale edges from the previous run are
    /// dropped), mark it clean, and bump its version if its value changed.
    pub fn commit(
        &mut self,
        consumer: NodeId,
        new_sources: IndexMap<NodeId, u64>,
        value_changed: bool,
    ) {
        let old_sources = match self.nodes.get_mut(&consumer) {
            Some(node) => node.take_sources(),
            None => return,
        };

        for old_id in old_sources.keys() {
            if !new_sources.contains_key(old_id) {
                if let Some(old_source) = self.nodes.get_mut(old_id) {
                    old_source.remove_dependent(consumer);
                }
            }
        }
        for new_id in new_sources.keys() {
            if let Some(new_source) = self.nodes.get_mut(new_id) {
                new_source.add_dependent(consumer);
            }
        }

        let dependents: Vec<NodeId> = match self.nodes.get_mut(&consumer) {
            Some(node) => {
                node.set_sources(new_sources);
                node.mark_clean();
                if value_changed {
                    node.bump_version();
                    node.dependents().iter().copied().collect()
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        // A changed derived value invalidates direct dependents; they were
        // usually already maybe-dirty from the originating write, but a pull
        // outside any write must propagate too.
        for dependent_id in dependents {
            if let Some(dependent) = self.nodes.get_mut(&dependent_id) {
                dependent.mark_maybe_dirty();
            }
        }
    }

    /// Record that a source node's value changed: bump its version, mark
    /// every transitive dependent maybe-dirty, and return the effect-kind
    /// nodes that should be handed to the batch queue.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut scheduled = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get_mut(&source_id) {
            source.bump_version();
            for dependent_id in source.dependents() {
                queue.push_back(*dependent_id);
            }
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_maybe_dirty();
                if node.kind() == NodeKind::Effect {
                    scheduled.push(node_id);
                }
                for dependent_id in node.dependents().clone() {
                    queue.push_back(dependent_id);
                }
            }
        }

        scheduled
    }

    /// Order the given nodes so that dependencies come before dependents
    /// (Kahn's algorithm over the induced subgraph). Nodes with no edges
    /// between them keep their input order.
    pub fn topological_order(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .sources()
                    .keys()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for &dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(&dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
