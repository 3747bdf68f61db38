//! Reactive Primitives
//!
//! The user-facing reactive layer: signals (mutable sources), memos
//! (cached derivations), effects (eager side effects), and the runtime
//! that coordinates them over the dependency graph.
//!
//! Everything here is push-pull: writes push dirtiness through the graph
//! and schedule effects, while memo values are pulled lazily and validated
//! against version stamps before recomputing.

mod batch;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use effect::Effect;
pub use memo::Memo;
pub use runtime::{CycleError, Runtime};
pub use signal::Signal;

pub(crate) use runtime::{Reactive, WeakRuntime};
