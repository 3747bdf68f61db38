//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! sources change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its derivation inside a tracking
//!    scope and caches the result; every signal/memo read during the run
//!    becomes a stamped source edge.
//!
//! 2. When a source changes, the memo is only marked maybe-dirty. Nothing
//!    recomputes on write; memos are pull-based.
//!
//! 3. On the next access, the memo refreshes its sources and compares
//!    their versions against its stamps. If none advanced, it is marked
//!    clean and the cache is returned without re-running.
//!
//! 4. If the derivation re-runs but produces an equal value, the memo's
//!    own version does not advance, so downstream consumers are not
//!    re-dirtied (glitch-free diamonds).
//!
//! The source set is rebuilt from scratch on every run: a branch not taken
//! this time contributes no edge, so writes to it no longer invalidate the
//! memo.
//!
//! # Errors
//!
//! A derivation that reads a value whose evaluation is already on the
//! scope stack is a cycle. [`Memo::try_get`] reports a direct self-read as
//! [`CycleError`]; a cycle closed deeper inside the derivation surfaces as
//! a panic from the inner read, propagated unchanged. A derivation that
//! panics leaves the cache at its last valid value and the memo dirty, so
//! the next pull retries from scratch.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::{CycleError, Reactive, Runtime};
use crate::graph::{NodeId, NodeKind};

struct MemoInner<T> {
    node: NodeId,
    rt: Runtime,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
}

impl<T> MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Bring the cache up to date. Returns whether the value changed.
    fn refresh(&self, rt: &Runtime) -> Result<bool, CycleError> {
        if rt.is_evaluating(self.node) {
            return Err(CycleError::new(self.node));
        }
        if !rt.needs_rerun(self.node) {
            return Ok(false);
        }

        // The guard pops the scope even if the derivation panics; in that
        // case nothing below runs, the cache keeps its last valid value,
        // and the node stays dirty for the next pull.
        let guard = rt.enter(self.node);
        let next = (self.compute)();
        let sources = guard.finish();

        let changed = {
            let current = self.value.read();
            current.as_ref() != Some(&next)
        };
        if changed {
            *self.value.write() = Some(next);
        }
        rt.commit_scope(self.node, sources, changed);
        Ok(changed)
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn update_if_necessary(&self, rt: &Runtime) {
        if let Err(err) = self.refresh(rt) {
            panic!("{err}");
        }
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        self.rt.release_node(self.node);
    }
}

/// A cached derived value that recomputes only when its sources change.
///
/// The `PartialEq` bound detects when a recomputed value is unchanged, so
/// equal results do not invalidate downstream consumers.
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given derivation. The derivation does
    /// not run until first access.
    pub fn new<F>(rt: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let node = rt.add_node(NodeKind::Derived);
        let inner = Arc::new(MemoInner {
            node,
            rt: rt.clone(),
            compute: Box::new(compute),
            value: RwLock::new(None),
        });
        let reactive: Arc<dyn Reactive> = inner.clone();
        rt.register(node, Arc::downgrade(&reactive));
        Self { inner }
    }

    /// Get the graph node backing this memo.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics with a [`CycleError`] message if the derivation transitively
    /// reads this memo.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`Memo::get`], but reports a direct cycle as an error instead
    /// of panicking.
    pub fn try_get(&self) -> Result<T, CycleError> {
        self.inner.refresh(&self.inner.rt)?;
        // Record the read after refreshing, so the stamp matches the value
        // actually returned.
        self.inner.rt.track_read(self.inner.node);
        let value = self
            .inner
            .value
            .read()
            .clone()
            .expect("refreshed memo has a value");
        Ok(value)
    }

    /// Whether the derivation has run at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.node.raw())
            .field("has_value", &self.has_value())
            .finish()
    }
}
