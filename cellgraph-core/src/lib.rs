//! Cellgraph Core
//!
//! This crate provides a fine-grained, pull-based reactive cell store. It
//! implements:
//!
//! - Atoms: source cells holding a value, and derived cells computed from
//!   other atoms
//! - Automatic dependency tracking: reads made during a computation become
//!   the computed atom's dependencies
//! - Version-based change detection, so unchanged values stop propagation
//! - Batched writes with listener notification once per settled write
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `atom`: Atom handles and the factory functions that create them
//! - `graph`: Per-atom records and the dependency graph between them
//! - `store`: The read/compute/write protocol and subscriptions
//! - `config`: Store settings
//! - `error`: The error type shared by every operation
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use cellgraph_core::{atom, derived, Store};
//!
//! let count = atom(1);
//! let doubled = {
//!     let count = count.clone();
//!     derived(move |get| Ok(get.get(&count)? * 2))
//! };
//!
//! let store = Store::new();
//! let notified = Arc::new(AtomicUsize::new(0));
//! let _sub = {
//!     let notified = notified.clone();
//!     store.subscribe(&doubled, move || {
//!         notified.fetch_add(1, Ordering::SeqCst);
//!     })
//! };
//!
//! store.set(&count, 5).unwrap();
//! assert_eq!(store.get(&doubled).unwrap(), 10);
//! assert_eq!(notified.load(Ordering::SeqCst), 1);
//! ```

pub mod atom;
pub mod config;
pub mod error;
pub mod store;

mod graph;

pub use atom::{atom, derived, derived_with_write, Atom, AtomId, Readable, WritableAtom, WriteFn};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use graph::RecordState;
pub use store::{create_store, default_store, Getter, Setter, Store, Subscriber, SubscriberId, Subscription};
