//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! effects, and render subscriptions. It owns the dependency graph, the
//! tracking-scope stack, the batch queue, and the consumer registry.
//!
//! # How It Works
//!
//! 1. Signals, memos, and effects register a graph node with the runtime
//!    when created.
//!
//! 2. When a reactive value is read inside a tracking scope, the runtime
//!    records the read on the top-of-stack frame, stamped with the source's
//!    current version.
//!
//! 3. When a signal's value changes, the runtime bumps its version, marks
//!    transitive dependents maybe-dirty, and schedules dependent effects on
//!    the batch queue. Memos stay lazy: they validate their stamps and
//!    recompute on next pull.
//!
//! # Isolation
//!
//! A `Runtime` is an explicit, cheaply cloneable handle rather than a
//! process-wide singleton. Tests (and embedders) can run any number of
//! isolated graphs side by side and tear them down by dropping the handle.
//! The runtime assumes cooperative single-threaded evaluation per instance:
//! reentrancy comes from nested synchronous evaluation, never from parallel
//! mutation, and no lock is ever held while user code runs.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::trace;

use super::batch::BatchQueue;
use super::scope::{ScopeFrame, ScopeStack};
use crate::graph::{DependencyGraph, DirtyState, NodeId, NodeKind};

/// Error returned when a consumer transitively reads a value whose own
/// evaluation is still active on the scope stack. Surfaced instead of
/// recursing forever.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reactive cycle detected: node {node} read while its own evaluation is in progress")]
pub struct CycleError {
    node: u64,
}

impl CycleError {
    pub(crate) fn new(node: NodeId) -> Self {
        Self { node: node.raw() }
    }
}

/// A trait for consumers the runtime can bring up to date.
///
/// Memos validate and lazily recompute; effects validate and re-run their
/// callback; render subscriptions validate and notify the host.
pub(crate) trait Reactive: Send + Sync {
    /// Bring this consumer up to date if any of its sources changed.
    fn update_if_necessary(&self, rt: &Runtime);
}

#[derive(Default)]
struct RuntimeInner {
    graph: RwLock<DependencyGraph>,
    /// Weak references to every live consumer, so invalidation can reach
    /// them without owning their lifetime.
    registry: RwLock<HashMap<NodeId, Weak<dyn Reactive>>>,
    /// Strong references to eager consumers (effects, render subscriptions).
    /// These stay alive, and keep receiving invalidations, until explicitly
    /// disposed.
    retained: Mutex<HashMap<NodeId, Arc<dyn Reactive>>>,
    scopes: Mutex<ScopeStack>,
    batch: Mutex<BatchQueue>,
}

/// Handle to a reactive runtime instance.
///
/// Cloning is cheap and clones share the same graph.
#[derive(Clone, Default)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning handle held by eager consumers, so a retained effect does not
/// keep its own runtime alive in a reference cycle.
#[derive(Clone)]
pub(crate) struct WeakRuntime {
    inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }
}

/// Pops one tracking frame on drop unless it was finished explicitly.
/// This is the guaranteed-release half of the scoped acquire/release
/// contract: the frame comes off the stack even when the evaluated body
/// panics.
pub(crate) struct ScopeGuard<'rt> {
    rt: &'rt Runtime,
    finished: bool,
}

impl ScopeGuard<'_> {
    /// Pop the frame and hand back the sources it collected.
    pub fn finish(mut self) -> IndexMap<NodeId, u64> {
        self.finished = true;
        match self.rt.inner.scopes.lock().pop() {
            Some(ScopeFrame::Tracking { sources, .. }) => sources,
            _ => IndexMap::new(),
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rt.inner.scopes.lock().pop();
        }
    }
}

struct UntrackedGuard<'rt> {
    rt: &'rt Runtime,
}

impl Drop for UntrackedGuard<'_> {
    fn drop(&mut self) {
        self.rt.inner.scopes.lock().pop();
    }
}

struct BatchGuard<'rt> {
    rt: &'rt Runtime,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.rt.inner.batch.lock().close();
    }
}

struct FlushGuard<'rt> {
    rt: &'rt Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.rt.inner.batch.lock().end_flush();
    }
}

impl Runtime {
    /// Create a fresh, empty runtime.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Two handles are the same runtime iff they share the same graph.
    pub fn same_runtime(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Node and registry management
    // ------------------------------------------------------------------

    pub(crate) fn add_node(&self, kind: NodeKind) -> NodeId {
        self.inner.graph.write().add_node(kind)
    }

    /// Register a consumer so invalidation can reach it. The runtime keeps
    /// only a weak reference; the handle owns the consumer's lifetime.
    pub(crate) fn register(&self, id: NodeId, reactive: Weak<dyn Reactive>) {
        self.inner.registry.write().insert(id, reactive);
    }

    /// Additionally retain a strong reference. Eager consumers stay alive
    /// and keep receiving invalidations until [`Runtime::release_node`].
    pub(crate) fn retain(&self, id: NodeId, reactive: Arc<dyn Reactive>) {
        self.inner.retained.lock().insert(id, reactive);
    }

    /// Remove a node and all bookkeeping for it. Edges into the node are
    /// unlinked immediately, so a disposed consumer receives nothing more.
    pub(crate) fn release_node(&self, id: NodeId) {
        self.inner.registry.write().remove(&id);
        self.inner.retained.lock().remove(&id);
        self.inner.graph.write().remove_node(id);
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Attribute a read of `id` to the current tracking scope, if any.
    /// A no-op outside any scope: untracked reads are valid and simply
    /// create no subscription.
    pub(crate) fn track_read(&self, id: NodeId) {
        // Lock order is scopes, then graph. Keep it that way everywhere.
        let mut scopes = self.inner.scopes.lock();
        if !scopes.is_tracking() {
            return;
        }
        if let Some(version) = self.inner.graph.read().version(id) {
            scopes.record(id, version);
        }
    }

    /// Push a tracking scope owned by `owner`. The returned guard pops it
    /// on drop; call [`ScopeGuard::finish`] to pop and collect the sources.
    pub(crate) fn enter(&self, owner: NodeId) -> ScopeGuard<'_> {
        self.inner.scopes.lock().push_tracking(owner);
        ScopeGuard {
            rt: self,
            finished: false,
        }
    }

    /// Commit a consumer's collected source set into the graph.
    pub(crate) fn commit_scope(
        &self,
        owner: NodeId,
        sources: IndexMap<NodeId, u64>,
        value_changed: bool,
    ) {
        self.inner.graph.write().commit(owner, sources, value_changed);
    }

    /// Whether a read right now would create a subscription.
    pub fn is_tracking(&self) -> bool {
        self.inner.scopes.lock().is_tracking()
    }

    /// Current depth of the scope stack. Mostly useful to assert that
    /// scopes are balanced around panicking bodies.
    pub fn tracking_depth(&self) -> usize {
        self.inner.scopes.lock().depth()
    }

    pub(crate) fn is_evaluating(&self, node: NodeId) -> bool {
        self.inner.scopes.lock().is_evaluating(node)
    }

    /// Run `f` with dependency tracking suppressed. Reads inside `f`
    /// register nothing, regardless of any outer active scope. Nested calls
    /// compose.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.scopes.lock().push_untracked();
        let _guard = UntrackedGuard { rt: self };
        f()
    }

    // ------------------------------------------------------------------
    // Invalidation and batching
    // ------------------------------------------------------------------

    /// A source node's value changed: propagate dirtiness, schedule
    /// dependent effects, and flush unless a batch is open.
    pub(crate) fn source_changed(&self, id: NodeId) {
        let scheduled = self.inner.graph.write().mark_changed(id);
        if !scheduled.is_empty() {
            trace!(
                source = id.raw(),
                scheduled = scheduled.len(),
                "signal change scheduled effects"
            );
            self.inner.batch.lock().schedule(scheduled);
        }
        self.flush();
    }

    /// Group writes: effects invalidated inside `f` run once, after `f`
    /// returns. Batches nest; only the outermost close flushes. Returns
    /// `f`'s value.
    ///
    /// If `f` panics the batch still closes, but the pending effects stay
    /// queued until the next write or batch flushes them.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch.lock().open();
        let guard = BatchGuard { rt: self };
        let value = f();
        drop(guard);
        self.flush();
        value
    }

    /// Drain the batch queue, running scheduled effects in dependency
    /// order. Writes performed by running effects extend the same drain.
    pub(crate) fn flush(&self) {
        if !self.inner.batch.lock().begin_flush() {
            return;
        }
        let _guard = FlushGuard { rt: self };

        loop {
            let pending = {
                let mut batch = self.inner.batch.lock();
                if !batch.has_pending() {
                    break;
                }
                batch.drain()
            };

            let ordered = self.inner.graph.read().topological_order(&pending);
            trace!(count = ordered.len(), "flushing scheduled effects");

            for id in ordered {
                let reactive = self
                    .inner
                    .registry
                    .read()
                    .get(&id)
                    .and_then(Weak::upgrade);
                match reactive {
                    Some(reactive) => reactive.update_if_necessary(self),
                    // Disposed mid-batch: silently dropped from the schedule.
                    None => trace!(node = id.raw(), "skipping disposed consumer"),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Staleness validation
    // ------------------------------------------------------------------

    /// Bring a derived source up to date before its version is compared.
    /// Signals and missing nodes need nothing.
    pub(crate) fn refresh_source(&self, id: NodeId) {
        let kind = self.inner.graph.read().get_node(id).map(|n| n.kind());
        if kind != Some(NodeKind::Derived) {
            return;
        }
        let reactive = self
            .inner
            .registry
            .read()
            .get(&id)
            .and_then(Weak::upgrade);
        if let Some(reactive) = reactive {
            reactive.update_if_necessary(self);
        }
    }

    /// Decide whether `consumer` must re-run. Refreshes derived sources
    /// first, then compares their versions against the consumer's stamps;
    /// if every stamp still matches, the consumer is marked clean and does
    /// not re-run. This check is the glitch-free half of the push-pull
    /// protocol.
    pub(crate) fn needs_rerun(&self, consumer: NodeId) -> bool {
        let state = self
            .inner
            .graph
            .read()
            .get_node(consumer)
            .map(|n| n.dirty_state());

        match state {
            None | Some(DirtyState::Clean) => false,
            Some(DirtyState::Dirty) => true,
            Some(DirtyState::MaybeDirty) => {
                let sources = self.inner.graph.read().sources_of(consumer);
                for (source, stamp) in sources {
                    self.refresh_source(source);
                    match self.inner.graph.read().version(source) {
                        Some(version) if version == stamp => continue,
                        // Changed, or the source is gone entirely.
                        _ => return true,
                    }
                }
                if let Some(node) = self.inner.graph.write().get_node_mut(consumer) {
                    node.mark_clean();
                }
                false
            }
        }
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.read().node_count()
    }

    /// Number of consumers subscribed to a node.
    pub(crate) fn graph_dependent_count(&self, id: NodeId) -> usize {
        self.inner
            .graph
            .read()
            .get_node(id)
            .map(|n| n.dependents().len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("tracking_depth", &self.tracking_depth())
            .finish()
    }
}
