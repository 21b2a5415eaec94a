//! Subscriber types for the store.
//!
//! A subscriber is a listener registered on one atom. It is invoked after a
//! write settles whenever the atom's version changed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::Store;
use crate::atom::AtomId;

/// Unique identifier for a subscriber registration.
///
/// Every `subscribe` call gets a fresh ID, even when the same listener is
/// registered twice. Registrations are never deduplicated by listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A listener registered on an atom.
///
/// Clones share the callback and the active flag, so a snapshot taken for
/// a flush still observes an unsubscribe that happens mid-flush.
#[derive(Clone)]
pub struct Subscriber {
    id: SubscriberId,
    notify: Arc<dyn Fn() + Send + Sync>,
    active: Arc<AtomicBool>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Arc::new(notify),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the registration is still live.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Invoke the callback unless the registration was removed.
    pub fn notify(&self) {
        if self.is_active() {
            (self.notify)();
        }
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Handle to a listener registration.
///
/// Dropping this handle unsubscribes the listener. Call
/// [`Subscription::detach`] to keep it registered for the store's lifetime.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    store: Store,
    atom: AtomId,
    id: SubscriberId,
    armed: bool,
}

impl Subscription {
    pub(crate) fn new(store: Store, atom: AtomId, id: SubscriberId) -> Self {
        Self {
            store,
            atom,
            id,
            armed: true,
        }
    }

    /// The atom this subscription listens to.
    pub fn atom(&self) -> AtomId {
        self.atom
    }

    /// The registration's ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove exactly this registration.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the listener registered without holding the handle.
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.armed {
            self.store.unsubscribe(self.atom, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("atom", &self.atom)
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscriber = Subscriber::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        subscriber.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deactivated_clone_stops_notifying() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscriber = Subscriber::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let snapshot = subscriber.clone();

        subscriber.deactivate();
        snapshot.notify();

        assert!(!snapshot.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
