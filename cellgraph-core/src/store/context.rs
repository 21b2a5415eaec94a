//! Dependency Tracking Context
//!
//! Every computation runs with its own [`Getter`]. Reads made through it are
//! attributed to the atom being computed, so a derived atom that reads
//! another derived atom records edges at the right depth: the inner
//! computation gets its own getter.
//!
//! Alongside the getters, the store keeps a stack of the atoms currently
//! being computed. A read of an atom that is already on the stack is a
//! dependency cycle.
//!
//! Update functions get a [`Setter`] instead. Its reads are not tracked,
//! and its writes join the batch of the outermost `set`.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::engine::StoreState;
use super::Store;
use crate::atom::{ArcAny, Atom, AtomDef, AtomId, Readable, WritableAtom};
use crate::error::{StoreError, StoreResult};

/// Read access handed to compute functions.
pub struct Getter<'a> {
    store: &'a Store,
    owner: AtomId,
    reads: RefCell<IndexMap<AtomId, u64>>,
}

impl<'a> Getter<'a> {
    pub(crate) fn new(store: &'a Store, owner: AtomId) -> Self {
        Self {
            store,
            owner,
            reads: RefCell::new(IndexMap::new()),
        }
    }

    /// The atom whose computation this getter belongs to.
    pub fn owner(&self) -> AtomId {
        self.owner
    }

    /// Read an atom and record it as a dependency of the owner.
    pub fn get<T: Readable + ?Sized>(&self, atom: &T) -> StoreResult<T::Value> {
        let def = atom.atom().def();
        let (value, version) = self.store.read_entry(def)?;
        self.reads.borrow_mut().insert(def.id, version);
        downcast(&value, def)
    }

    /// Read an atom without recording a dependency.
    pub fn peek<T: Readable + ?Sized>(&self, atom: &T) -> StoreResult<T::Value> {
        let def = atom.atom().def();
        let (value, _) = self.store.read_entry(def)?;
        downcast(&value, def)
    }

    /// The dependencies observed so far, with their versions.
    pub(crate) fn into_reads(self) -> IndexMap<AtomId, u64> {
        self.reads.into_inner()
    }
}

/// Read and write access handed to update functions.
pub struct Setter<'a> {
    store: &'a Store,
}

impl<'a> Setter<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Read an atom's current value. Atoms invalidated by earlier writes in
    /// the same update are recomputed first.
    pub fn get<T: Readable + ?Sized>(&self, atom: &T) -> StoreResult<T::Value> {
        let def = atom.atom().def();
        let (value, _) = self.store.read_entry(def)?;
        downcast(&value, def)
    }

    /// Run another atom's update function within the current write.
    pub fn set<V, A, R>(&self, atom: &WritableAtom<V, A, R>, args: A) -> StoreResult<R> {
        atom.write(self, args)
    }

    /// Write a source atom directly.
    ///
    /// Fails with `NotWritable` when `atom` is a derived atom.
    pub fn put<V: Send + Sync + 'static>(&self, atom: &Atom<V>, value: V) -> StoreResult<()> {
        self.store.write_source(atom.def(), Arc::new(value))
    }
}

/// Recover a typed value from a cached entry.
pub(crate) fn downcast<V: Clone + 'static>(value: &ArcAny, def: &AtomDef) -> StoreResult<V> {
    (**value)
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| StoreError::TypeMismatch { atom: def.name() })
}

/// The atoms currently being computed, innermost last.
#[derive(Debug, Default)]
pub(crate) struct ComputeStack {
    frames: SmallVec<[AtomId; 8]>,
}

impl ComputeStack {
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn current(&self) -> Option<AtomId> {
        self.frames.last().copied()
    }

    /// If `atom` is being computed, the frames from its computation up to
    /// the innermost one.
    pub(crate) fn cycle_from(&self, atom: AtomId) -> Option<&[AtomId]> {
        let start = self.frames.iter().position(|&frame| frame == atom)?;
        Some(&self.frames[start..])
    }

    fn push(&mut self, atom: AtomId) {
        self.frames.push(atom);
    }

    fn pop(&mut self) -> Option<AtomId> {
        self.frames.pop()
    }
}

/// Guard that pops the compute frame when dropped.
///
/// This keeps the stack balanced even if a compute function panics.
pub(crate) struct ComputeFrame<'s> {
    state: &'s RefCell<StoreState>,
    atom: AtomId,
}

impl<'s> ComputeFrame<'s> {
    pub(crate) fn enter(state: &'s RefCell<StoreState>, atom: AtomId) -> Self {
        state.borrow_mut().computing.push(atom);
        Self { state, atom }
    }
}

impl Drop for ComputeFrame<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            let popped = state.computing.pop();
            debug_assert_eq!(
                popped,
                Some(self.atom),
                "compute frame mismatch: expected {:?}, got {:?}",
                self.atom,
                popped
            );
        }
    }
}
