//! Store
//!
//! This module implements the atom store: the read/compute/cache protocol,
//! write propagation and subscriber notification.
//!
//! # Concepts
//!
//! ## Tracking
//!
//! A derived atom's compute function receives a [`Getter`]. Every atom read
//! through it becomes a dependency of the atom being computed, with the
//! version that was observed. Dependencies are rediscovered on every run,
//! so a compute function that branches only depends on the branch it took.
//!
//! ## Writes
//!
//! `Store::set` runs the atom's update function with a [`Setter`]. Writes to
//! source atoms invalidate their dependents immediately, but the ordered
//! recompute walk and the listener flush wait until the outermost store
//! operation returns, so nested writes settle together.
//!
//! ## Subscriptions
//!
//! Listeners registered with `Store::subscribe` run once per settled write
//! in which their atom's version changed.

mod context;
mod engine;
mod runtime;
mod subscriber;

pub use context::{Getter, Setter};
pub use engine::Store;
pub use runtime::{create_store, default_store};
pub use subscriber::{Subscriber, SubscriberId, Subscription};
