//! Dependency Graph
//!
//! This module implements the table of atom records and the edges between
//! them.
//!
//! # Overview
//!
//! The graph is a directed graph where:
//!
//! - Nodes are records, one per atom the store has seen
//! - Edges are dependencies: if A read B during its last computation, A has
//!   B in its dependencies and B has A in its dependents
//!
//! When a source atom changes, we walk the dependent edges to mark every
//! affected record as invalidated, then compute an order in which to bring
//! them up to date.
//!
//! # Design Decisions
//!
//! 1. Records live in one central table owned by the store and refer to each
//!    other only by `AtomId`, so edges can be cleared and rebuilt without
//!    shared ownership between records.
//!
//! 2. The table is indexed by atom ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    so invalidation never has to scan every record.

mod record;
mod scheduler;

pub use record::RecordState;

pub(crate) use record::Record;
pub(crate) use scheduler::DependencyGraph;
