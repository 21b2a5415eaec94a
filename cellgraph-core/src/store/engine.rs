//! Store
//!
//! The store composes the dependency graph, the tracking context and the
//! subscriber registry into three operations: `get`, `set` and `subscribe`.
//!
//! # How It Works
//!
//! 1. `get` brings the atom's record up to date (seeding a source, running a
//!    derived atom's compute, or re-checking an invalidated one) and returns
//!    the cached value.
//!
//! 2. `set` runs the atom's update function. Every source write inside it
//!    bumps the source's version, invalidates its transitive dependents
//!    right away and queues the source as a root.
//!
//! 3. When the outermost operation returns, the roots are walked in
//!    dependency order and each invalidated atom is refreshed once. An atom
//!    whose dependencies all kept their recorded versions is marked valid
//!    without recomputing.
//!
//! 4. Finally, listeners of every atom whose version changed are invoked,
//!    each registration once.
//!
//! # Re-entrancy
//!
//! Compute, update, equality and listener code may call back into the store
//! on the same thread. Calls are serialized by a reentrant lock, and the
//! record table is never borrowed while user code runs. A plain `get` made
//! from inside a compute function is tracked like a read through the
//! getter.
//!
//! # Deep chains
//!
//! A cold read of a long chain nests one compute frame per link. Nesting is
//! capped at `max_compute_depth`; when a read outside any computation hits
//! the cap, the atom at the cap is resolved on its own first and the read
//! is retried, so long chains are evaluated in bounded slices.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::ReentrantMutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::{downcast, ComputeFrame, ComputeStack, Getter, Setter};
use super::subscriber::{Subscriber, SubscriberId, Subscription};
use crate::atom::{ArcAny, AtomDef, AtomId, AtomKind, Readable, WritableAtom};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::graph::{DependencyGraph, Record, RecordState};

/// Mutable state behind the store's lock.
pub(crate) struct StoreState {
    pub(crate) graph: DependencyGraph,

    /// Atoms whose compute function is running, innermost last.
    pub(crate) computing: ComputeStack,

    /// Nesting level of public store operations on the current call stack.
    depth: usize,

    /// Source atoms written since the last walk.
    pending: IndexSet<AtomId>,

    /// Atoms whose version changed since the last flush.
    changed: IndexSet<AtomId>,

    /// The atom whose computation hit the depth limit most recently.
    deferred: Option<Arc<AtomDef>>,
}

impl StoreState {
    pub(crate) fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
            computing: ComputeStack::default(),
            depth: 0,
            pending: IndexSet::new(),
            changed: IndexSet::new(),
            deferred: None,
        }
    }
}

type StateCell = RefCell<StoreState>;

/// Upper bound on reads resumed below the depth limit by one outer read.
const MAX_RESUMED_READS: usize = 4096;

struct StoreInner {
    config: StoreConfig,
    state: ReentrantMutex<StateCell>,
}

/// One public store operation on the call stack.
///
/// Dropping it restores the nesting level, so a panic in user code that is
/// caught further up does not leave the store looking mid-operation.
struct Operation<'s> {
    state: &'s StateCell,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.depth = state.depth.saturating_sub(1);
        }
    }
}

/// A reactive atom store.
///
/// Cloning a `Store` yields another handle to the same records.
///
/// # Example
///
/// ```rust
/// use cellgraph_core::{atom, derived, Store};
///
/// let count = atom(2);
/// let doubled = {
///     let count = count.clone();
///     derived(move |get| Ok(get.get(&count)? * 2))
/// };
///
/// let store = Store::new();
/// assert_eq!(store.get(&doubled).unwrap(), 4);
///
/// store.set(&count, 5).unwrap();
/// assert_eq!(store.get(&doubled).unwrap(), 10);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        debug!(store = %config.name, eager = config.eager_recompute, "creating store");
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: ReentrantMutex::new(RefCell::new(StoreState::new())),
            }),
        }
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Read an atom's current value, computing and caching it if needed.
    ///
    /// A failing compute function propagates its error; the atom is left
    /// without a value and the next read retries. Called from inside a
    /// compute function, the read becomes a dependency of that computation.
    pub fn get<T: Readable + ?Sized>(&self, atom: &T) -> StoreResult<T::Value> {
        let def = atom.atom().def();
        let guard = self.inner.state.lock();
        let state: &StateCell = &guard;

        let op = self.enter(state);
        let read = self.resolve(state, def);
        if let Ok((_, version)) = &read {
            self.track_direct_read(state, def.id, *version);
        }
        let settled = self.leave(op);

        let (value, _) = read?;
        settled?;
        downcast(&value, def)
    }

    /// Run an atom's update function, then recompute everything the writes
    /// affected and notify subscribers.
    ///
    /// Writes are not rolled back when the update or a recomputation fails;
    /// the error is returned after the changes that did settle are flushed.
    pub fn set<V, A, R>(&self, atom: &WritableAtom<V, A, R>, args: A) -> StoreResult<R> {
        let guard = self.inner.state.lock();
        let state: &StateCell = &guard;

        let op = self.enter(state);
        let result = atom.write(&Setter::new(self), args);
        let settled = self.leave(op);

        let value = result?;
        settled?;
        Ok(value)
    }

    /// Register `listener` to run whenever the atom's version changes.
    ///
    /// The atom is read once so its dependencies are known. A failing read
    /// is logged and the subscription stays in place.
    pub fn subscribe<T, F>(&self, atom: &T, listener: F) -> Subscription
    where
        T: Readable + ?Sized,
        F: Fn() + Send + Sync + 'static,
    {
        let def = atom.atom().def();
        let subscriber = Subscriber::new(listener);
        let id = subscriber.id();

        let guard = self.inner.state.lock();
        let state: &StateCell = &guard;
        state.borrow_mut().graph.ensure(def).add_subscriber(subscriber);

        let op = self.enter(state);
        if let Err(err) = self.resolve(state, def) {
            warn!(store = %self.inner.config.name, atom = %def.name(), error = %err, "mount read failed");
        }
        if let Err(err) = self.leave(op) {
            warn!(store = %self.inner.config.name, atom = %def.name(), error = %err, "mount propagation failed");
        }

        Subscription::new(self.clone(), def.id, id)
    }

    /// Remove one listener registration.
    pub(crate) fn unsubscribe(&self, atom: AtomId, id: SubscriberId) {
        let guard = self.inner.state.lock();
        let removed = guard
            .borrow_mut()
            .graph
            .get_mut(atom)
            .and_then(|record| record.remove_subscriber(id));
        if let Some(subscriber) = removed {
            subscriber.deactivate();
            trace!(store = %self.inner.config.name, %atom, "unsubscribed");
        }
    }

    /// The atom's version, or None while it has no value.
    pub fn version<T: Readable + ?Sized>(&self, atom: &T) -> Option<u64> {
        self.inspect(atom.atom().id(), |record| record.value().map(|_| record.version()))
            .flatten()
    }

    /// The atom's record state. Atoms the store has never seen are
    /// `Uninitialized`.
    pub fn record_state<T: Readable + ?Sized>(&self, atom: &T) -> RecordState {
        self.inspect(atom.atom().id(), Record::state)
            .unwrap_or(RecordState::Uninitialized)
    }

    /// Number of atoms read by the atom's last computation.
    pub fn dependency_count<T: Readable + ?Sized>(&self, atom: &T) -> usize {
        self.inspect(atom.atom().id(), |record| record.dependencies().len())
            .unwrap_or(0)
    }

    /// Number of atoms whose last computation read this atom.
    pub fn dependent_count<T: Readable + ?Sized>(&self, atom: &T) -> usize {
        self.inspect(atom.atom().id(), |record| record.dependents().len())
            .unwrap_or(0)
    }

    /// Number of live listener registrations on the atom.
    pub fn subscriber_count<T: Readable + ?Sized>(&self, atom: &T) -> usize {
        self.inspect(atom.atom().id(), |record| record.subscribers().len())
            .unwrap_or(0)
    }

    /// Number of atoms the store holds records for.
    pub fn len(&self) -> usize {
        let guard = self.inner.state.lock();
        let len = guard.borrow().graph.len();
        len
    }

    /// Check whether the store has no records yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn inspect<R>(&self, atom: AtomId, f: impl FnOnce(&Record) -> R) -> Option<R> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        let result = state.graph.get(atom).map(f);
        result
    }

    // ------------------------------------------------------------------------
    // Entry points for the tracking context
    // ------------------------------------------------------------------------

    /// Resolve an atom on behalf of a getter or setter.
    pub(crate) fn read_entry(&self, def: &Arc<AtomDef>) -> StoreResult<(ArcAny, u64)> {
        let guard = self.inner.state.lock();
        self.resolve(&guard, def)
    }

    /// Write a source atom's value.
    ///
    /// A value equal to the cached one is a no-op. Otherwise the version is
    /// bumped, dependents are invalidated and the atom is queued for the walk.
    pub(crate) fn write_source(&self, def: &Arc<AtomDef>, value: ArcAny) -> StoreResult<()> {
        let AtomKind::Source { initial } = &def.kind else {
            return Err(StoreError::NotWritable { atom: def.name() });
        };

        let guard = self.inner.state.lock();
        {
            let mut state = guard.borrow_mut();
            let record = state.graph.ensure(def);
            if record.state() == RecordState::Uninitialized {
                record.seed(Arc::clone(initial));
            }
        }

        let unchanged = self.unchanged(&guard, def.id, &value);
        let mut state = guard.borrow_mut();
        let bumped = state
            .graph
            .get_mut(def.id)
            .map(|record| record.store_value(value, unchanged))
            .unwrap_or(false);
        if !bumped {
            trace!(store = %self.inner.config.name, atom = %def.name(), "write left value unchanged");
            return Ok(());
        }
        let version = state.graph.get(def.id).map(Record::version).unwrap_or_default();

        state.changed.insert(def.id);
        state.pending.insert(def.id);
        let invalidated = state.graph.invalidate_dependents(def.id);

        debug!(
            store = %self.inner.config.name,
            atom = %def.name(),
            version,
            invalidated,
            "source written"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Read / compute protocol
    // ------------------------------------------------------------------------

    /// Read an atom, resuming below the depth limit when called outside
    /// any computation.
    fn resolve(&self, state: &StateCell, def: &Arc<AtomDef>) -> StoreResult<(ArcAny, u64)> {
        if state.borrow().computing.depth() > 0 {
            return self.read(state, def);
        }
        state.borrow_mut().deferred = None;

        let mut suspended: Vec<Arc<AtomDef>> = Vec::new();
        let mut target = Arc::clone(def);
        loop {
            match self.read(state, &target) {
                Ok(entry) => match suspended.pop() {
                    Some(next) => target = next,
                    None => return Ok(entry),
                },
                Err(err @ StoreError::DepthExceeded { .. }) => {
                    let deeper = state.borrow_mut().deferred.take();
                    match deeper {
                        Some(deeper) if deeper.id != target.id && suspended.len() < MAX_RESUMED_READS => {
                            trace!(
                                store = %self.inner.config.name,
                                atom = %deeper.name(),
                                suspended = suspended.len() + 1,
                                "resolving below depth limit"
                            );
                            suspended.push(std::mem::replace(&mut target, deeper));
                        }
                        _ => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Record a `Store::get` made from inside a compute function as a
    /// dependency of the innermost computation.
    fn track_direct_read(&self, state: &StateCell, atom: AtomId, version: u64) {
        let mut guard = state.borrow_mut();
        let state = &mut *guard;
        if let Some(owner) = state.computing.current() {
            state.graph.add_edge(atom, owner, version);
        }
    }

    /// Apply the atom's equality to its cached value and `value`.
    ///
    /// Runs with the record table released, since equality is user code.
    fn unchanged(&self, state: &StateCell, atom: AtomId, value: &ArcAny) -> bool {
        let cached = {
            let state = state.borrow();
            let cached = state
                .graph
                .get(atom)
                .and_then(|record| record.value().map(|old| (Arc::clone(old), Arc::clone(record.def()))));
            cached
        };
        match cached {
            Some((old, def)) => (def.eq)(&*old, &**value),
            None => false,
        }
    }

    fn read(&self, state: &StateCell, def: &Arc<AtomDef>) -> StoreResult<(ArcAny, u64)> {
        let current = state.borrow_mut().graph.ensure(def).state();
        match current {
            RecordState::Valid => {}
            RecordState::Uninitialized => self.initialize(state, def)?,
            RecordState::Invalidated => self.refresh(state, def)?,
        }

        let state = state.borrow();
        let entry = state
            .graph
            .get(def.id)
            .and_then(|record| record.value().map(|value| (Arc::clone(value), record.version())));
        entry.ok_or_else(|| StoreError::compute("no value was cached").in_atom(&def.name()))
    }

    /// Seed a source atom or run a derived atom's first computation.
    fn initialize(&self, state: &StateCell, def: &Arc<AtomDef>) -> StoreResult<()> {
        self.check_cycle(state, def.id)?;
        match &def.kind {
            AtomKind::Source { initial } => {
                if let Some(record) = state.borrow_mut().graph.get_mut(def.id) {
                    record.seed(Arc::clone(initial));
                }
                Ok(())
            }
            AtomKind::Derived { .. } => self.recompute(state, def),
        }
    }

    /// Bring an invalidated atom up to date.
    ///
    /// Each recorded dependency is refreshed first, under a frame for this
    /// atom so a dependency that leads back here is reported as a cycle.
    /// The compute function only runs if one of them ended up with a
    /// different version than the one observed at the last computation, or
    /// if the previous computation failed.
    fn refresh(&self, state: &StateCell, def: &Arc<AtomDef>) -> StoreResult<()> {
        self.check_cycle(state, def.id)?;

        let (failed, dependencies): (bool, SmallVec<[(Arc<AtomDef>, u64); 8]>) = {
            let state = state.borrow();
            let snapshot = match state.graph.get(def.id) {
                Some(record) => (
                    record.has_failed(),
                    record
                        .dependencies()
                        .iter()
                        .filter_map(|(atom, seen)| {
                            state.graph.get(*atom).map(|dep| (Arc::clone(dep.def()), *seen))
                        })
                        .collect(),
                ),
                None => (true, SmallVec::new()),
            };
            snapshot
        };
        if failed {
            return self.recompute(state, def);
        }

        let mut stale = dependencies.is_empty();
        {
            let _frame = self.push_frame(state, def)?;
            for (dependency, seen) in &dependencies {
                let (_, version) = self.read(state, dependency)?;
                if version != *seen {
                    stale = true;
                    break;
                }
            }
        }

        if stale {
            return self.recompute(state, def);
        }

        if let Some(record) = state.borrow_mut().graph.get_mut(def.id) {
            record.mark_valid();
        }
        trace!(store = %self.inner.config.name, atom = %def.name(), "dependencies unchanged, kept cached value");
        Ok(())
    }

    /// Run the compute function under a fresh getter and install the result.
    fn recompute(&self, state: &StateCell, def: &Arc<AtomDef>) -> StoreResult<()> {
        let compute = match &def.kind {
            AtomKind::Derived { compute } => compute,
            AtomKind::Source { .. } => {
                if let Some(record) = state.borrow_mut().graph.get_mut(def.id) {
                    record.mark_valid();
                }
                return Ok(());
            }
        };

        let parent = state.borrow().computing.current();
        let frame = self.push_frame(state, def)?;
        state.borrow_mut().graph.clear_dependencies(def.id);
        let getter = Getter::new(self, def.id);
        let outcome = compute(&getter);
        drop(frame);

        let unchanged = match &outcome {
            Ok(value) => self.unchanged(state, def.id, value),
            Err(_) => false,
        };
        let mut state = state.borrow_mut();
        state.graph.install_dependencies(def.id, getter.into_reads());

        match outcome {
            Ok(value) => {
                let bumped = state
                    .graph
                    .get_mut(def.id)
                    .map(|record| record.store_value(value, unchanged))
                    .unwrap_or(false);
                if bumped {
                    state.changed.insert(def.id);
                }
                trace!(
                    store = %self.inner.config.name,
                    atom = %def.name(),
                    parent = ?parent,
                    bumped,
                    "recomputed"
                );
                Ok(())
            }
            Err(err) => {
                if let Some(record) = state.graph.get_mut(def.id) {
                    record.mark_failed();
                }
                let err = err.in_atom(&def.name());
                if matches!(err, StoreError::DepthExceeded { .. }) {
                    debug!(store = %self.inner.config.name, atom = %def.name(), "compute suspended at depth limit");
                } else {
                    warn!(store = %self.inner.config.name, atom = %def.name(), error = %err, "compute failed");
                }
                Err(err)
            }
        }
    }

    /// Push a frame for `def`, failing once the configured depth is reached.
    /// The atom that hit the limit is remembered for `resolve`.
    fn push_frame<'s>(&self, state: &'s StateCell, def: &Arc<AtomDef>) -> StoreResult<ComputeFrame<'s>> {
        let limit = self.inner.config.max_compute_depth;
        {
            let mut state = state.borrow_mut();
            if state.computing.depth() >= limit {
                state.deferred = Some(Arc::clone(def));
                return Err(StoreError::DepthExceeded { limit });
            }
        }
        Ok(ComputeFrame::enter(state, def.id))
    }

    fn check_cycle(&self, state: &StateCell, atom: AtomId) -> StoreResult<()> {
        let state = state.borrow();
        let Some(frames) = state.computing.cycle_from(atom) else {
            return Ok(());
        };
        let path = frames
            .iter()
            .map(|frame| state.graph.name(*frame))
            .chain(std::iter::once(state.graph.name(atom)))
            .collect();
        Err(StoreError::Cycle { path })
    }

    // ------------------------------------------------------------------------
    // Batching, propagation and notification
    // ------------------------------------------------------------------------

    fn enter<'s>(&self, state: &'s StateCell) -> Operation<'s> {
        state.borrow_mut().depth += 1;
        Operation { state }
    }

    /// Close one store operation. The outermost one walks the pending writes
    /// and then flushes listeners.
    fn leave(&self, op: Operation<'_>) -> StoreResult<()> {
        let state = op.state;
        let outermost = state.borrow().depth == 1;
        let settled = if outermost {
            self.propagate(state)
        } else {
            Ok(())
        };

        let changed = if outermost {
            std::mem::take(&mut state.borrow_mut().changed)
        } else {
            IndexSet::new()
        };
        drop(op);
        if !changed.is_empty() {
            self.flush(state, &changed);
        }

        settled
    }

    /// Refresh everything reachable from the pending writes, in dependency
    /// order. Writes made during the walk start another round.
    fn propagate(&self, state: &StateCell) -> StoreResult<()> {
        let eager = self.inner.config.eager_recompute;

        loop {
            let roots = std::mem::take(&mut state.borrow_mut().pending);
            if roots.is_empty() {
                return Ok(());
            }

            let order = state.borrow().graph.recompute_order(roots.iter().copied());
            let order = match order {
                Ok(order) => order,
                Err(err) => {
                    warn!(store = %self.inner.config.name, error = %err, "recompute order failed");
                    return Err(err);
                }
            };
            debug!(
                store = %self.inner.config.name,
                roots = roots.len(),
                reachable = order.len(),
                "propagating writes"
            );

            for atom in order {
                let due = {
                    let state = state.borrow();
                    let due = state.graph.get(atom).and_then(|record| {
                        let wanted = match record.state() {
                            RecordState::Invalidated => eager || record.has_subscribers(),
                            RecordState::Uninitialized => record.has_subscribers(),
                            RecordState::Valid => false,
                        };
                        wanted.then(|| Arc::clone(record.def()))
                    });
                    due
                };
                let Some(def) = due else {
                    continue;
                };

                if let Err(err) = self.resolve(state, &def) {
                    state.borrow_mut().pending.clear();
                    return Err(err);
                }
            }
        }
    }

    /// Invoke each listener registered on a changed atom, once.
    fn flush(&self, state: &StateCell, changed: &IndexSet<AtomId>) {
        let listeners: IndexMap<SubscriberId, Subscriber> = {
            let state = state.borrow();
            let listeners = changed
                .iter()
                .filter_map(|atom| state.graph.get(*atom))
                .flat_map(|record| record.subscribers().iter())
                .map(|subscriber| (subscriber.id(), subscriber.clone()))
                .collect();
            listeners
        };
        if listeners.is_empty() {
            return;
        }

        debug!(
            store = %self.inner.config.name,
            changed = changed.len(),
            listeners = listeners.len(),
            "notifying subscribers"
        );
        for subscriber in listeners.values() {
            subscriber.notify();
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.config.name)
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{atom, derived, derived_with_write, Atom};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (count.clone(), count)
    }

    #[test]
    fn store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Store>();
    }

    #[test]
    fn records_are_created_lazily() {
        let store = Store::new();
        let a = atom(1);
        assert!(store.is_empty());
        assert_eq!(store.record_state(&a), RecordState::Uninitialized);
        assert_eq!(store.version(&a), None);

        assert_eq!(store.get(&a).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.record_state(&a), RecordState::Valid);
        assert_eq!(store.version(&a), Some(0));
    }

    #[test]
    fn read_registers_edges_on_both_sides() {
        let store = Store::new();
        let a = atom(1);
        let b = {
            let a = a.clone();
            derived(move |get| Ok(get.get(&a)? + 1))
        };

        assert_eq!(store.get(&b).unwrap(), 2);
        assert_eq!(store.dependency_count(&b), 1);
        assert_eq!(store.dependent_count(&a), 1);
    }

    #[test]
    fn write_invalidates_then_walk_revalidates() {
        let store = Store::new();
        let a = atom(1);
        let b = {
            let a = a.clone();
            derived(move |get| Ok(get.get(&a)? * 10))
        };
        store.get(&b).unwrap();

        store.set(&a, 2).unwrap();
        assert_eq!(store.record_state(&b), RecordState::Valid);
        assert_eq!(store.version(&b), Some(1));
        assert_eq!(store.get(&b).unwrap(), 20);
    }

    #[test]
    fn equal_recompute_keeps_dependents_cached() {
        let store = Store::new();
        let (parity_runs, parity_runs_clone) = counter();
        let (label_runs, label_runs_clone) = counter();

        let n = atom(2);
        let parity = {
            let n = n.clone();
            derived(move |get| {
                parity_runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(get.get(&n)? % 2)
            })
        };
        let label = {
            let parity = parity.clone();
            derived(move |get| {
                label_runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(if get.get(&parity)? == 0 { "even" } else { "odd" })
            })
        };

        assert_eq!(store.get(&label).unwrap(), "even");
        store.set(&n, 4).unwrap();

        // parity recomputed to the same value, so label short-circuits
        assert_eq!(parity_runs.load(Ordering::SeqCst), 2);
        assert_eq!(label_runs.load(Ordering::SeqCst), 1);
        assert_eq!(store.version(&parity), Some(0));
        assert_eq!(store.get(&label).unwrap(), "even");
    }

    #[test]
    fn lazy_mode_defers_unsubscribed_atoms() {
        let store = Store::with_config(StoreConfig {
            eager_recompute: false,
            ..StoreConfig::default()
        });
        let (runs, runs_clone) = counter();

        let a = atom(1);
        let b = {
            let a = a.clone();
            derived(move |get| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(get.get(&a)? + 1)
            })
        };
        store.get(&b).unwrap();

        store.set(&a, 5).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(store.record_state(&b), RecordState::Invalidated);

        assert_eq!(store.get(&b).unwrap(), 6);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    fn chain_of(store_depth: usize, links: usize) -> (Store, Vec<Atom<i32>>) {
        let store = Store::with_config(StoreConfig {
            max_compute_depth: store_depth,
            ..StoreConfig::default()
        });
        let base = atom(0);
        let mut chain: Vec<Atom<i32>> = Vec::new();
        for _ in 0..links {
            let previous = chain.last().cloned();
            let base = base.clone();
            chain.push(derived(move |get| match &previous {
                Some(previous) => Ok(get.get(previous)? + 1),
                None => Ok(get.get(&base)?),
            }));
        }
        (store, chain)
    }

    #[test]
    fn cold_read_resumes_below_depth_limit() {
        let (store, chain) = chain_of(3, 20);
        let deepest = chain.last().unwrap();

        assert_eq!(store.get(deepest).unwrap(), 19);
        for atom in &chain {
            assert_eq!(store.record_state(atom), RecordState::Valid);
        }
    }

    #[test]
    fn runaway_nesting_still_fails() {
        fn endless(level: u32) -> Atom<u32> {
            derived(move |get| get.get(&endless(level + 1)))
        }

        let store = Store::with_config(StoreConfig {
            max_compute_depth: 3,
            ..StoreConfig::default()
        });
        let err = store.get(&endless(0)).unwrap_err();
        assert!(matches!(err, StoreError::DepthExceeded { limit: 3 }));
    }

    #[test]
    fn panicking_compute_leaves_store_usable() {
        let store = Store::new();
        let boom: Atom<i32> = derived(|_| panic!("compute exploded"));
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| store.get(&boom)));
        assert!(caught.is_err());

        let (calls, calls_clone) = counter();
        let a = atom(1);
        let next = {
            let a = a.clone();
            derived(move |get| Ok(get.get(&a)? + 1))
        };
        let _sub = store.subscribe(&next, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set(&a, 5).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.record_state(&next), RecordState::Valid);
        assert_eq!(store.get(&next).unwrap(), 6);
    }

    #[test]
    fn direct_get_inside_compute_is_tracked() {
        let store = Store::new();
        let a = atom(1);
        let scaled = {
            let inner = store.clone();
            let a = a.clone();
            derived(move |_| Ok(inner.get(&a)? * 10))
        };

        assert_eq!(store.get(&scaled).unwrap(), 10);
        assert_eq!(store.dependency_count(&scaled), 1);
        assert_eq!(store.dependent_count(&a), 1);

        store.set(&a, 2).unwrap();
        assert_eq!(store.get(&scaled).unwrap(), 20);
    }

    #[test]
    fn equality_may_read_the_store() {
        let store = Store::new();
        let (checks, checks_clone) = counter();
        let (derived_checks, derived_checks_clone) = counter();
        let other = atom(0);

        let watched = {
            let inner = store.clone();
            let other = other.clone();
            atom(1).with_equality(move |x: &i32, y: &i32| {
                checks_clone.fetch_add(1, Ordering::SeqCst);
                inner.get(&other).is_ok() && x == y
            })
        };
        let halved = {
            let inner = store.clone();
            let other = other.clone();
            let watched = watched.clone();
            derived(move |get| Ok(get.get(&watched)? / 2)).with_equality(move |x: &i32, y: &i32| {
                derived_checks_clone.fetch_add(1, Ordering::SeqCst);
                inner.get(&other).is_ok() && x == y
            })
        };
        assert_eq!(store.get(&halved).unwrap(), 0);

        store.set(&watched, 2).unwrap();
        assert_eq!(store.version(&watched), Some(1));
        assert_eq!(store.get(&halved).unwrap(), 1);
        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert_eq!(derived_checks.load(Ordering::SeqCst), 1);

        store.set(&watched, 2).unwrap();
        assert_eq!(store.version(&watched), Some(1));
    }

    #[test]
    fn writable_derived_atom_forwards_writes() {
        let store = Store::new();
        let celsius = atom(0.0_f64);
        let fahrenheit = {
            let read_from = celsius.clone();
            let write_to = celsius.clone();
            derived_with_write(
                move |get| Ok(get.get(&read_from)? * 9.0 / 5.0 + 32.0),
                move |set, _this, f: f64| set.set(&write_to, (f - 32.0) * 5.0 / 9.0),
            )
        };

        assert_eq!(store.get(&fahrenheit).unwrap(), 32.0);
        store.set(&fahrenheit, 212.0).unwrap();
        assert_eq!(store.get(&celsius).unwrap(), 100.0);
        assert_eq!(store.get(&fahrenheit).unwrap(), 212.0);
    }

    #[test]
    fn debug_shows_name_and_size() {
        let store = Store::with_config(StoreConfig {
            name: "ui".into(),
            ..StoreConfig::default()
        });
        store.get(&atom(1)).unwrap();
        assert_eq!(format!("{store:?}"), r#"Store { name: "ui", records: 1 }"#);
    }
}
