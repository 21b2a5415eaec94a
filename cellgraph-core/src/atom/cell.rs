//! Atom Handles
//!
//! An atom is an immutable descriptor: an identity plus either an initial
//! value (source atom) or a compute function (derived atom), and optionally
//! an update function. The store never mutates descriptors; it keeps its
//! own bookkeeping per atom and uses the descriptor as a lookup key.
//!
//! Values are stored type-erased inside the store. The typed handles
//! (`Atom<V>`, `WritableAtom<V, A, R>`) carry the value type so reads can
//! hand back a `V` again.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::AtomId;
use crate::error::StoreResult;
use crate::store::{Getter, Setter};

/// A type-erased cached value.
pub(crate) type ArcAny = Arc<dyn Any + Send + Sync>;

/// Equality over type-erased values, used to decide version bumps.
pub(crate) type EqFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool + Send + Sync>;

/// A type-erased compute function.
pub(crate) type ComputeFn = Arc<dyn Fn(&Getter<'_>) -> StoreResult<ArcAny> + Send + Sync>;

/// A typed update function. Receives the setter, the atom itself and the
/// caller's arguments.
pub type WriteFn<V, A, R> = dyn Fn(&Setter<'_>, &Atom<V>, A) -> StoreResult<R> + Send + Sync;

/// How an atom obtains its value.
#[derive(Clone)]
pub(crate) enum AtomKind {
    /// Holds a directly settable value, seeded from `initial`.
    Source { initial: ArcAny },

    /// Computed from other atoms.
    Derived { compute: ComputeFn },
}

/// The shared descriptor behind every atom handle.
#[derive(Clone)]
pub(crate) struct AtomDef {
    pub(crate) id: AtomId,
    pub(crate) label: Option<String>,
    pub(crate) kind: AtomKind,
    pub(crate) eq: EqFn,
}

impl AtomDef {
    /// The label if one was given, otherwise the ID.
    pub(crate) fn name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.id.to_string(),
        }
    }

    pub(crate) fn is_source(&self) -> bool {
        matches!(self.kind, AtomKind::Source { .. })
    }
}

fn default_eq<V: PartialEq + 'static>(a: &(dyn Any + Send + Sync), b: &(dyn Any + Send + Sync)) -> bool {
    match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A readable atom holding values of type `V`.
pub struct Atom<V> {
    def: Arc<AtomDef>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Atom<V> {
    fn from_def(def: AtomDef) -> Self {
        Self {
            def: Arc::new(def),
            _marker: PhantomData,
        }
    }

    pub(crate) fn def(&self) -> &Arc<AtomDef> {
        &self.def
    }

    /// Get the atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.def.id
    }

    /// Get the debug label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.def.label.as_deref()
    }

    /// Check whether this is a source atom (holds a settable value).
    pub fn is_source(&self) -> bool {
        self.def.is_source()
    }

    /// Attach a debug label used in log events and error messages.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.def).label = Some(label.into());
        self
    }
}

impl<V: 'static> Atom<V> {
    /// Replace the equality used to decide whether a new value is a change.
    pub fn with_equality<F>(mut self, eq: F) -> Self
    where
        F: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.def).eq = Arc::new(
            move |a: &(dyn Any + Send + Sync), b: &(dyn Any + Send + Sync)| {
                match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
                    (Some(a), Some(b)) => eq(a, b),
                    _ => false,
                }
            },
        );
        self
    }
}

impl<V> Clone for Atom<V> {
    fn clone(&self) -> Self {
        Self {
            def: Arc::clone(&self.def),
            _marker: PhantomData,
        }
    }
}

impl<V> fmt::Debug for Atom<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.def.id)
            .field("label", &self.def.label)
            .field("source", &self.def.is_source())
            .finish()
    }
}

/// An atom that can be targeted by `Store::set`.
///
/// `A` is the argument type accepted by the update function and `R` its
/// result. Source atoms are `WritableAtom<V, V, ()>`.
pub struct WritableAtom<V, A = V, R = ()> {
    atom: Atom<V>,
    write: Arc<WriteFn<V, A, R>>,
}

impl<V, A, R> WritableAtom<V, A, R> {
    /// The readable side of this atom.
    pub fn as_atom(&self) -> &Atom<V> {
        &self.atom
    }

    /// Get the atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.atom.id()
    }

    /// Attach a debug label used in log events and error messages.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.atom = self.atom.with_label(label);
        self
    }

    /// Run the update function.
    pub(crate) fn write(&self, setter: &Setter<'_>, args: A) -> StoreResult<R> {
        (self.write)(setter, &self.atom, args)
    }
}

impl<V: 'static, A, R> WritableAtom<V, A, R> {
    /// Replace the equality used to decide whether a new value is a change.
    pub fn with_equality<F>(mut self, eq: F) -> Self
    where
        F: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        self.atom = self.atom.with_equality(eq);
        self
    }
}

impl<V, A, R> Clone for WritableAtom<V, A, R> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            write: Arc::clone(&self.write),
        }
    }
}

impl<V, A, R> fmt::Debug for WritableAtom<V, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WritableAtom").field(&self.atom).finish()
    }
}

/// Anything the store can read: plain and writable atom handles.
pub trait Readable {
    /// The value type produced by reads.
    type Value: Clone + Send + Sync + 'static;

    /// The underlying readable atom.
    fn atom(&self) -> &Atom<Self::Value>;
}

impl<V: Clone + Send + Sync + 'static> Readable for Atom<V> {
    type Value = V;

    fn atom(&self) -> &Atom<V> {
        self
    }
}

impl<V: Clone + Send + Sync + 'static, A, R> Readable for WritableAtom<V, A, R> {
    type Value = V;

    fn atom(&self) -> &Atom<V> {
        &self.atom
    }
}

// ----------------------------------------------------------------------------
// Factory
// ----------------------------------------------------------------------------

fn write_source<V: Send + Sync + 'static>(setter: &Setter<'_>, this: &Atom<V>, value: V) -> StoreResult<()> {
    setter.put(this, value)
}

/// Create a source atom holding `initial`.
///
/// # Example
///
/// ```rust
/// use cellgraph_core::{atom, Store};
///
/// let count = atom(1);
/// let store = Store::new();
/// store.set(&count, 5).unwrap();
/// assert_eq!(store.get(&count).unwrap(), 5);
/// ```
pub fn atom<V>(initial: V) -> WritableAtom<V, V, ()>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    let atom = Atom::from_def(AtomDef {
        id: AtomId::next(),
        label: None,
        kind: AtomKind::Source {
            initial: Arc::new(initial),
        },
        eq: Arc::new(default_eq::<V>),
    });
    WritableAtom {
        atom,
        write: Arc::new(write_source::<V>),
    }
}

/// Create a read-only atom computed from other atoms.
///
/// Dependencies are discovered while `compute` runs: every atom read
/// through the [`Getter`] becomes a dependency.
pub fn derived<V, F>(compute: F) -> Atom<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&Getter<'_>) -> StoreResult<V> + Send + Sync + 'static,
{
    let compute: ComputeFn =
        Arc::new(move |getter: &Getter<'_>| compute(getter).map(|value| Arc::new(value) as ArcAny));
    Atom::from_def(AtomDef {
        id: AtomId::next(),
        label: None,
        kind: AtomKind::Derived { compute },
        eq: Arc::new(default_eq::<V>),
    })
}

/// Create a computed atom with a custom update function.
///
/// The update function receives a [`Setter`] to read and write other
/// atoms, the atom itself, and the arguments passed to `Store::set`.
pub fn derived_with_write<V, A, R, F, W>(compute: F, write: W) -> WritableAtom<V, A, R>
where
    V: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&Getter<'_>) -> StoreResult<V> + Send + Sync + 'static,
    W: Fn(&Setter<'_>, &Atom<V>, A) -> StoreResult<R> + Send + Sync + 'static,
{
    WritableAtom {
        atom: derived(compute),
        write: Arc::new(write),
    }
}
