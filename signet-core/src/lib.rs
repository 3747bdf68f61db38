//! Signet Core
//!
//! This crate provides the core runtime for the Signet fine-grained
//! reactivity system. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - A push-pull dependency graph with glitch-free invalidation
//! - Write batching with deterministic settle order
//! - A build-time transform that auto-instruments render functions
//! - The render-integration surface UI hosts plug into
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Signals, memos, effects, and the runtime coordinating them
//! - `graph`: The versioned dependency graph and invalidation engine
//! - `render`: Render subscriptions and the injected tracking-scope hook
//! - `transform`: The source-to-source instrumentation pass
//!
//! # Example
//!
//! ```rust,ignore
//! use signet_core::reactive::{Effect, Memo, Runtime, Signal};
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = Signal::new(&rt, 0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Memo::new(&rt, move || count.get() * 2)
//! };
//!
//! // Create an effect
//! Effect::new(&rt, move || {
//!     println!("Doubled: {}", doubled.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Doubled: 10"
//! ```

pub mod graph;
pub mod reactive;
pub mod render;
pub mod transform;
