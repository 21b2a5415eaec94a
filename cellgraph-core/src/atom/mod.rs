//! Atoms
//!
//! Atoms are the cells of the store. A source atom holds a value that is
//! set directly; a derived atom computes its value from other atoms. The
//! functions in this module build atom descriptors; all state lives in the
//! [`Store`](crate::store::Store).

mod cell;
mod id;

pub use cell::{atom, derived, derived_with_write, Atom, Readable, WritableAtom, WriteFn};
pub use id::AtomId;

pub(crate) use cell::{ArcAny, AtomDef, AtomKind};
