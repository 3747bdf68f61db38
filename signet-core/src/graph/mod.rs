//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and their consumers.
//!
//! # Overview
//!
//! The graph is a DAG where:
//!
//! - Nodes represent signals (sources), memos (derived values), or
//!   effect-like consumers (effects, render subscriptions)
//! - Edges represent dependencies, stamped with the source version observed
//!   at read time
//!
//! When a signal changes we traverse the graph to mark affected nodes
//! maybe-dirty; consumers then validate their stamps lazily to decide
//! whether they actually need to re-run.
//!
//! # Design Decisions
//!
//! 1. A centralized graph rather than distributed linked lists:
//!    - It enables topological ordering for batched effect runs
//!    - It keeps disposal deterministic (edges are removed explicitly,
//!      no weak pointers in the hot path)
//!    - Dirty state lives in one place, so lazy consumers need no
//!      callbacks to be invalidated
//!
//! 2. The graph is indexed by node ID for O(1) lookups, and maintains
//!    both forward (sources) and reverse (dependents) edges.

mod engine;
mod node;

pub use engine::DependencyGraph;
pub use node::{DirtyState, Node, NodeId, NodeKind};
