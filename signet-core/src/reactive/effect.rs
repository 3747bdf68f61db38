//! Effect Implementation
//!
//! An Effect is an eager consumer: a callback that runs once on creation
//! and again whenever any of its tracked sources change.
//!
//! # How Effects Work
//!
//! 1. The callback runs immediately inside a tracking scope; the reads it
//!    performs become its source set.
//!
//! 2. When a source changes, the effect is scheduled on the batch queue
//!    and re-run at flush. Before re-running, its stamps are validated, so
//!    a change that reaches it only through memos whose values did not
//!    actually change does not re-run it.
//!
//! 3. The source set is rebuilt on every run, so conditional reads
//!    subscribe and unsubscribe as branches change.
//!
//! # Lifetime
//!
//! The runtime retains effects strongly: dropping the [`Effect`] handle
//! does not stop the callback. An effect runs until [`Effect::dispose`] is
//! called or its runtime is dropped. This mirrors how subscriptions work
//! in UI hosts, where the handle often outlives the scope that created it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::runtime::{Reactive, Runtime, WeakRuntime};
use crate::graph::{NodeId, NodeKind};

struct EffectInner {
    node: NodeId,
    /// Weak, because the runtime holds this effect strongly in its retained
    /// set; a strong handle here would form a cycle.
    rt: WeakRuntime,
    callback: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    runs: AtomicU64,
}

impl EffectInner {
    /// Execute the callback inside a fresh tracking scope and commit the
    /// sources it read.
    fn run(&self, rt: &Runtime) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let guard = rt.enter(self.node);
        (self.callback)();
        let sources = guard.finish();
        self.runs.fetch_add(1, Ordering::SeqCst);
        // Effects have no value of their own, so their version never needs
        // to advance.
        rt.commit_scope(self.node, sources, false);
    }
}

impl Reactive for EffectInner {
    fn update_if_necessary(&self, rt: &Runtime) {
        if rt.needs_rerun(self.node) {
            self.run(rt);
        }
    }
}

/// A reactive side effect that re-runs when its sources change.
///
/// Created via [`Effect::new`]; stopped via [`Effect::dispose`]. Clones
/// share the same subscription.
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect and run its callback once, immediately, to collect
    /// the initial source set.
    pub fn new<F>(rt: &Runtime, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let node = rt.add_node(NodeKind::Effect);
        let inner = Arc::new(EffectInner {
            node,
            rt: rt.downgrade(),
            callback: Box::new(callback),
            disposed: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        });

        let reactive: Arc<dyn Reactive> = inner.clone();
        rt.register(node, Arc::downgrade(&reactive));
        rt.retain(node, reactive);

        inner.run(rt);
        Self { inner }
    }

    /// Get the graph node backing this effect.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Stop the effect. The callback never runs again and the node is
    /// removed from the graph. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(node = self.inner.node.raw(), "disposing effect");
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.release_node(self.inner.node);
        }
    }

    /// Whether [`Effect::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// How many times the callback has run, including the initial run.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::SeqCst)
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.node.raw())
            .field("runs", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Memo, Signal};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_immediately() {
        let rt = Runtime::new();
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let effect = Effect::new(&rt, move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_source_changes() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let seen = Arc::new(AtomicI32::new(-1));

        let (signal_c, seen_c) = (signal.clone(), seen.clone());
        let effect = Effect::new(&rt, move || {
            seen_c.store(signal_c.get(), Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        signal.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn batched_writes_run_effect_once() {
        let rt = Runtime::new();
        let a = Signal::new(&rt, 0);
        let b = Signal::new(&rt, 0);

        let (a_c, b_c) = (a.clone(), b.clone());
        let sum = Arc::new(AtomicI32::new(0));
        let sum_c = sum.clone();
        let effect = Effect::new(&rt, move || {
            sum_c.store(a_c.get() + b_c.get(), Ordering::SeqCst);
        });
        assert_eq!(effect.run_count(), 1);

        rt.batch(|| {
            a.set(1);
            b.set(2);
            // Effects do not run until the batch closes.
            assert_eq!(sum.load(Ordering::SeqCst), 0);
        });

        assert_eq!(sum.load(Ordering::SeqCst), 3);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn disposed_effect_never_reruns() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicI32::new(0));

        let (signal_c, runs_c) = (signal.clone(), runs.clone());
        let effect = Effect::new(&rt, move || {
            signal_c.get();
            runs_c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert!(effect.is_disposed());
        signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Dispose twice is fine.
        effect.dispose();
    }

    #[test]
    fn effect_outlives_dropped_handle() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicI32::new(0));

        let (signal_c, runs_c) = (signal.clone(), runs.clone());
        let effect = Effect::new(&rt, move || {
            signal_c.get();
            runs_c.fetch_add(1, Ordering::SeqCst);
        });
        drop(effect);

        signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_skipped_when_memo_value_unchanged() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 1);

        let signal_c = signal.clone();
        let parity = Memo::new(&rt, move || signal_c.get() % 2);

        let runs = Arc::new(AtomicI32::new(0));
        let (parity_c, runs_c) = (parity.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            parity_c.get();
            runs_c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Parity stays odd, so the effect validates clean and skips.
        signal.set(3);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(4);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let rt = Runtime::new();
        let tracked = Signal::new(&rt, 0);
        let ignored = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicI32::new(0));

        let rt_c = rt.clone();
        let (tracked_c, ignored_c, runs_c) = (tracked.clone(), ignored.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            tracked_c.get();
            rt_c.untracked(|| ignored_c.get());
            runs_c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        ignored.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tracked.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_rebuilds_sources_each_run() {
        let rt = Runtime::new();
        let cond = Signal::new(&rt, true);
        let a = Signal::new(&rt, 0);
        let b = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicI32::new(0));

        let (cond_c, a_c, b_c, runs_c) = (cond.clone(), a.clone(), b.clone(), runs.clone());
        let _effect = Effect::new(&rt, move || {
            if cond_c.get() {
                a_c.get();
            } else {
                b_c.get();
            }
            runs_c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        b.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cond.set(false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        a.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        b.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
