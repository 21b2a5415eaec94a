//! Atom Records
//!
//! This module defines the per-atom bookkeeping that lives in the
//! dependency graph.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::atom::{ArcAny, AtomDef, AtomId};
use crate::store::{Subscriber, SubscriberId};

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// No value has been computed or seeded yet.
    Uninitialized,

    /// The cached value is up-to-date.
    Valid,

    /// An upstream atom changed. The cached value must be checked, and
    /// possibly recomputed, before it is served again.
    Invalidated,
}

/// The store's bookkeeping for one atom.
pub(crate) struct Record {
    /// The descriptor this record belongs to.
    def: Arc<AtomDef>,

    /// Cached value (None until first computed or seeded).
    value: Option<ArcAny>,

    /// Bumped only when a new value differs from the cached one.
    version: u64,

    state: RecordState,

    /// The last computation failed, so the cached value (if any) predates
    /// the recorded dependencies and must not be revalidated.
    failed: bool,

    /// Atoms read by the last computation, with the version observed.
    dependencies: IndexMap<AtomId, u64>,

    /// Atoms whose last computation read this atom.
    dependents: IndexSet<AtomId>,

    subscribers: SmallVec<[Subscriber; 2]>,
}

impl Record {
    /// Create an empty record for the given atom.
    pub(crate) fn new(def: Arc<AtomDef>) -> Self {
        Self {
            def,
            value: None,
            version: 0,
            state: RecordState::Uninitialized,
            failed: false,
            dependencies: IndexMap::new(),
            dependents: IndexSet::new(),
            subscribers: SmallVec::new(),
        }
    }

    pub(crate) fn def(&self) -> &Arc<AtomDef> {
        &self.def
    }

    pub(crate) fn name(&self) -> String {
        self.def.name()
    }

    pub(crate) fn value(&self) -> Option<&ArcAny> {
        self.value.as_ref()
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn state(&self) -> RecordState {
        self.state
    }

    /// Seed a source record with its value at version 0.
    pub(crate) fn seed(&mut self, value: ArcAny) {
        self.value = Some(value);
        self.version = 0;
        self.state = RecordState::Valid;
    }

    /// Store a freshly computed or written value and mark the record valid.
    ///
    /// `unchanged` is the atom's equality applied to the cached and the new
    /// value; the caller evaluates it outside the record table. Returns true
    /// when the version was bumped, i.e. a previous value existed and the
    /// new one differs. An equal value leaves the previous one in place.
    pub(crate) fn store_value(&mut self, value: ArcAny, unchanged: bool) -> bool {
        let bumped = self.value.is_some() && !unchanged;
        if bumped {
            self.version += 1;
        }
        if bumped || self.value.is_none() {
            self.value = Some(value);
        }
        self.state = RecordState::Valid;
        self.failed = false;
        bumped
    }

    /// Record a failed computation. The record keeps any previous value but
    /// is never served or revalidated until a computation succeeds.
    pub(crate) fn mark_failed(&mut self) {
        self.failed = true;
        if self.state == RecordState::Valid {
            self.state = RecordState::Invalidated;
        }
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failed
    }

    /// Mark a valid record as invalidated. Returns false for records that
    /// were not valid.
    pub(crate) fn invalidate(&mut self) -> bool {
        if self.state == RecordState::Valid {
            self.state = RecordState::Invalidated;
            true
        } else {
            false
        }
    }

    /// Mark the record valid without touching its value.
    pub(crate) fn mark_valid(&mut self) {
        self.state = RecordState::Valid;
    }

    pub(crate) fn dependencies(&self) -> &IndexMap<AtomId, u64> {
        &self.dependencies
    }

    pub(crate) fn dependents(&self) -> &IndexSet<AtomId> {
        &self.dependents
    }

    pub(crate) fn insert_dependency(&mut self, atom: AtomId, version: u64) {
        self.dependencies.insert(atom, version);
    }

    pub(crate) fn take_dependencies(&mut self) -> IndexMap<AtomId, u64> {
        std::mem::take(&mut self.dependencies)
    }

    pub(crate) fn add_dependent(&mut self, atom: AtomId) {
        self.dependents.insert(atom);
    }

    pub(crate) fn remove_dependent(&mut self, atom: AtomId) {
        self.dependents.shift_remove(&atom);
    }

    pub(crate) fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub(crate) fn add_subscriber(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    /// Remove exactly one registration. Returns it if it was present.
    pub(crate) fn remove_subscriber(&mut self, id: SubscriberId) -> Option<Subscriber> {
        let position = self.subscribers.iter().position(|s| s.id() == id)?;
        Some(self.subscribers.remove(position))
    }
}
