//! Render Integration
//!
//! The adapter surface a UI host uses to make its render functions
//! reactive. The core never schedules a re-render itself; it only tells
//! the host that a previously rendered subscription went stale.
//!
//! # How It Works
//!
//! 1. The host creates a [`RenderSubscription`] with a notify callback,
//!    then runs each render pass inside
//!    [`RenderSubscription::run_tracked`]. Every signal or memo read
//!    during the pass becomes a source of the subscription.
//!
//! 2. When a source later changes, the subscription validates its stamps
//!    like an effect would, and calls `notify` instead of re-running
//!    anything. The host schedules the re-render however it likes; the
//!    next `run_tracked` replaces the source set.
//!
//! 3. [`enter_render_scope`] is the hook the instrumentation transform
//!    injects as the first statement of a render function body. It is
//!    depth-counted per thread: the scope belongs to the enclosing
//!    `run_tracked`, nested instrumented calls just bump the depth, and
//!    calls outside any tracked render are inert. The returned guard
//!    releases the depth on drop, so early returns and panics stay
//!    balanced.

use std::cell::Cell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::graph::{NodeId, NodeKind};
use crate::reactive::{Reactive, Runtime, WeakRuntime};

thread_local! {
    /// Whether a `run_tracked` pass is active on this thread.
    static RENDER_ACTIVE: Cell<bool> = const { Cell::new(false) };
    /// Nesting depth of instrumented render functions within the pass.
    static RENDER_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct SubscriptionInner {
    node: NodeId,
    rt: WeakRuntime,
    notify: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    notifications: AtomicU64,
}

impl Reactive for SubscriptionInner {
    fn update_if_necessary(&self, rt: &Runtime) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if rt.needs_rerun(self.node) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
            (self.notify)();
        }
    }
}

/// A host-owned subscription tying one rendered unit to the sources it
/// read.
///
/// Created via [`Runtime::render_subscription`]. The runtime retains it
/// until [`RenderSubscription::dispose`], so dropping the handle does not
/// stop notifications.
pub struct RenderSubscription {
    inner: Arc<SubscriptionInner>,
}

impl Runtime {
    /// Create a render subscription. `notify` is called when sources
    /// committed by a previous [`RenderSubscription::run_tracked`] pass
    /// change.
    pub fn render_subscription<F>(&self, notify: F) -> RenderSubscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let node = self.add_node(NodeKind::Effect);
        let inner = Arc::new(SubscriptionInner {
            node,
            rt: self.downgrade(),
            notify: Box::new(notify),
            disposed: AtomicBool::new(false),
            notifications: AtomicU64::new(0),
        });
        let reactive: Arc<dyn Reactive> = inner.clone();
        self.register(node, Arc::downgrade(&reactive));
        self.retain(node, reactive);
        RenderSubscription { inner }
    }
}

impl RenderSubscription {
    /// Get the graph node backing this subscription.
    pub fn id(&self) -> NodeId {
        self.inner.node
    }

    /// Run a render pass with tracking. Reads inside `f` become the
    /// subscription's sources, replacing the previous pass's set. Returns
    /// `f`'s value.
    ///
    /// If `f` panics the scope is popped without committing, so the
    /// previous source set stays in place and the next source change still
    /// notifies.
    pub fn run_tracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let rt = match self.inner.rt.upgrade() {
            Some(rt) => rt,
            None => return f(),
        };
        if self.inner.disposed.load(Ordering::SeqCst) {
            return f();
        }

        let guard = rt.enter(self.inner.node);
        let value = {
            let _active = ActiveRenderGuard::activate();
            f()
        };
        let sources = guard.finish();
        rt.commit_scope(self.inner.node, sources, false);
        value
    }

    /// Detach the subscription. `notify` is never called again and the
    /// node is removed from the graph. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(node = self.inner.node.raw(), "disposing render subscription");
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.release_node(self.inner.node);
        }
    }

    /// Whether [`RenderSubscription::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// How many times `notify` has fired.
    pub fn notification_count(&self) -> u64 {
        self.inner.notifications.load(Ordering::SeqCst)
    }
}

impl Clone for RenderSubscription {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for RenderSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSubscription")
            .field("id", &self.inner.node.raw())
            .field("notifications", &self.notification_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Marks a `run_tracked` pass active for the current thread.
struct ActiveRenderGuard {
    was_active: bool,
}

impl ActiveRenderGuard {
    fn activate() -> Self {
        let was_active = RENDER_ACTIVE.with(|a| a.replace(true));
        Self { was_active }
    }
}

impl Drop for ActiveRenderGuard {
    fn drop(&mut self) {
        RENDER_ACTIVE.with(|a| a.set(self.was_active));
    }
}

/// Guard returned by [`enter_render_scope`]. Dropping it releases one
/// level of render-scope depth.
#[must_use = "dropping the guard immediately ends the render scope"]
pub struct RenderScopeGuard {
    counted: bool,
}

impl Drop for RenderScopeGuard {
    fn drop(&mut self) {
        if self.counted {
            RENDER_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
        }
    }
}

/// Enter an instrumented render function.
///
/// The instrumentation transform injects a call to this as the first
/// statement of qualifying function bodies. Inside a
/// [`RenderSubscription::run_tracked`] pass it counts nesting depth; the
/// tracking scope itself belongs to the pass, so nested instrumented
/// functions share it rather than pushing their own. Outside any tracked
/// pass the guard is inert and reads stay untracked.
pub fn enter_render_scope() -> RenderScopeGuard {
    let counted = RENDER_ACTIVE.with(Cell::get);
    if counted {
        RENDER_DEPTH.with(|d| d.set(d.get() + 1));
    }
    RenderScopeGuard { counted }
}

/// Current nesting depth of instrumented render functions on this thread.
/// Zero outside any tracked pass.
pub fn render_depth() -> usize {
    RENDER_DEPTH.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Memo, Signal};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn notify_fires_when_a_rendered_source_changes() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let notified = Arc::new(AtomicI32::new(0));

        let notified_c = notified.clone();
        let sub = rt.render_subscription(move || {
            notified_c.fetch_add(1, Ordering::SeqCst);
        });

        let signal_c = signal.clone();
        let rendered = sub.run_tracked(|| signal_c.get());
        assert_eq!(rendered, 0);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        signal.set(1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(sub.notification_count(), 1);
    }

    #[test]
    fn unchanged_memo_does_not_notify() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 1);

        let signal_c = signal.clone();
        let parity = Memo::new(&rt, move || signal_c.get() % 2);

        let notified = Arc::new(AtomicI32::new(0));
        let notified_c = notified.clone();
        let sub = rt.render_subscription(move || {
            notified_c.fetch_add(1, Ordering::SeqCst);
        });

        let parity_c = parity.clone();
        sub.run_tracked(|| parity_c.get());

        // Parity stays odd: subscription validates clean, no notify.
        signal.set(3);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        signal.set(4);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rerender_replaces_the_source_set() {
        let rt = Runtime::new();
        let cond = Signal::new(&rt, true);
        let a = Signal::new(&rt, 0);
        let b = Signal::new(&rt, 0);
        let notified = Arc::new(AtomicI32::new(0));

        let notified_c = notified.clone();
        let sub = rt.render_subscription(move || {
            notified_c.fetch_add(1, Ordering::SeqCst);
        });

        let render = {
            let (cond_c, a_c, b_c) = (cond.clone(), a.clone(), b.clone());
            move || {
                if cond_c.get() {
                    a_c.get()
                } else {
                    b_c.get()
                }
            }
        };

        sub.run_tracked(render.clone());
        b.set(1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        cond.set(false);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // Host re-renders; a is no longer a source.
        sub.run_tracked(render);
        a.set(1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        b.set(2);
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disposed_subscription_stops_notifying() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let notified = Arc::new(AtomicI32::new(0));

        let notified_c = notified.clone();
        let sub = rt.render_subscription(move || {
            notified_c.fetch_add(1, Ordering::SeqCst);
        });

        let signal_c = signal.clone();
        sub.run_tracked(|| signal_c.get());

        sub.dispose();
        assert!(sub.is_disposed());
        signal.set(1);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn render_scope_guard_is_inert_outside_run_tracked() {
        assert_eq!(render_depth(), 0);
        {
            let _guard = enter_render_scope();
            assert_eq!(render_depth(), 0);
        }
        assert_eq!(render_depth(), 0);
    }

    #[test]
    fn render_scope_depth_counts_inside_run_tracked() {
        let rt = Runtime::new();
        let sub = rt.render_subscription(|| {});

        sub.run_tracked(|| {
            let _outer = enter_render_scope();
            assert_eq!(render_depth(), 1);
            {
                let _inner = enter_render_scope();
                assert_eq!(render_depth(), 2);
            }
            assert_eq!(render_depth(), 1);
        });
        assert_eq!(render_depth(), 0);
    }

    #[test]
    fn panicking_render_leaves_the_stack_balanced() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        let notified = Arc::new(AtomicI32::new(0));

        let notified_c = notified.clone();
        let sub = rt.render_subscription(move || {
            notified_c.fetch_add(1, Ordering::SeqCst);
        });

        let signal_c = signal.clone();
        sub.run_tracked(|| signal_c.get());

        let signal_c = signal.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sub.run_tracked(|| {
                let _guard = enter_render_scope();
                signal_c.get();
                panic!("render failure");
            })
        }));
        assert!(result.is_err());
        assert_eq!(rt.tracking_depth(), 0);
        assert_eq!(render_depth(), 0);

        // The previous committed sources still notify.
        signal.set(1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }
}
