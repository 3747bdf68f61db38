//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a versioned mutable
//! value cell. Reading it inside a tracking scope records a dependency;
//! writing it invalidates dependents.
//!
//! # How Signals Work
//!
//! 1. `get` attributes the read to the current tracking scope (if any) and
//!    returns a clone of the value. A read never triggers recomputation of
//!    anything.
//!
//! 2. `set` compares the new value against the current one under the
//!    signal's equality. Equal writes are a complete no-op: no version
//!    bump, no propagation. Unequal writes bump the version and hand the
//!    node to the batch queue.
//!
//! 3. `peek` reads without registering a dependency, the escape hatch for
//!    reads that must not create subscriptions.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::Runtime;
use crate::graph::{NodeId, NodeKind};

type EqualityFn<T> = dyn Fn(&T, &T) -> bool + Send + Sync;

struct SignalInner<T> {
    node: NodeId,
    rt: Runtime,
    value: RwLock<T>,
    /// Decides whether a write is a change. Defaults to `PartialEq`.
    equals: Box<EqualityFn<T>>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.rt.release_node(self.node);
    }
}

/// A reactive signal holding a value of type `T`.
///
/// Clones share the same cell. The cell lives as long as any handle (or any
/// closure that captured one) does; dropping the last handle removes its
/// node from the graph.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
///
/// let value = count.get();
/// count.set(5); // notifies dependents
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value, using `PartialEq`
    /// to detect changed writes.
    pub fn new(rt: &Runtime, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(rt, value, |a, b| a == b)
    }

    /// Create a signal with a custom change predicate. The predicate
    /// returns `true` when two values are equal, i.e. when a write should
    /// be discarded without propagation.
    pub fn with_equality(
        rt: &Runtime,
        value: T,
        equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        let node = rt.add_node(NodeKind::Source);
        Self {
            inner: Arc::new(SignalInner {
                node,
                rt: rt.clone(),
                value: RwLock::new(value),
                equals: Box::new(equals),
            }),
        }
    }

    /// Get the graph node backing this signal.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Get the current value.
    ///
    /// If called within a tracking scope, records this signal as a source
    /// of the current consumer.
    pub fn get(&self) -> T {
        self.inner.rt.track_read(self.inner.node);
        self.inner.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify dependents.
    ///
    /// If the new value equals the current one under the signal's equality,
    /// this is a no-op: the version does not advance and nothing is
    /// invalidated.
    pub fn set(&self, value: T) {
        // The current value is cloned out so the equality closure runs with
        // no lock held; it may itself read reactive state.
        let current = self.inner.value.read().clone();
        if (self.inner.equals)(&current, &value) {
            return;
        }
        *self.inner.value.write() = value;
        self.inner.rt.source_changed(self.inner.node);
    }

    /// Update the value using a function of the current value. Subject to
    /// the same equality short-circuit as [`Signal::set`].
    ///
    /// The updater runs with no lock held, so it may write other signals;
    /// effects flushed by those writes can even write this signal back.
    /// The updater's result is applied last.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.inner.value.read().clone();
        self.set(f(&current));
    }

    /// Number of consumers currently subscribed to this signal.
    pub fn dependent_count(&self) -> usize {
        self.inner
            .rt
            .graph_dependent_count(self.inner.node)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.node.raw())
            .field("value", &self.peek())
            .finish()
    }
}
