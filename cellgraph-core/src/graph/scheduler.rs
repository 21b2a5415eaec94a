//! Update Scheduler
//!
//! The dependency graph owns every record and keeps the dependency and
//! dependent edges mutually consistent. It also answers the two questions a
//! write asks:
//!
//! 1. Which atoms are affected? An iterative walk along dependent edges from
//!    the changed atoms marks every reachable valid record as invalidated.
//! 2. In what order must they be recomputed? A depth-first post-order over
//!    dependent edges, reversed, puts every atom after all of its changed
//!    dependencies. An atom reached again while it is still being visited
//!    closes a cycle and is reported instead of looping.
//!
//! Edges are keyed by `AtomId` rather than held as references between
//! records, so the table can clear and rebuild them freely.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::record::Record;
use crate::atom::{AtomDef, AtomId};
use crate::error::{StoreError, StoreResult};

/// Visit marks for the post-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// All records of a store, indexed by atom ID.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    records: IndexMap<AtomId, Record>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Look up the record for an atom, creating it on first access.
    pub(crate) fn ensure(&mut self, def: &Arc<AtomDef>) -> &mut Record {
        self.records
            .entry(def.id)
            .or_insert_with(|| Record::new(Arc::clone(def)))
    }

    pub(crate) fn get(&self, atom: AtomId) -> Option<&Record> {
        self.records.get(&atom)
    }

    pub(crate) fn get_mut(&mut self, atom: AtomId) -> Option<&mut Record> {
        self.records.get_mut(&atom)
    }

    /// Name of an atom for log events and errors.
    pub(crate) fn name(&self, atom: AtomId) -> String {
        self.records
            .get(&atom)
            .map(Record::name)
            .unwrap_or_else(|| atom.to_string())
    }

    /// Number of records in the graph.
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Record that `dependent` read `dependency` at `version`.
    pub(crate) fn add_edge(&mut self, dependency: AtomId, dependent: AtomId, version: u64) {
        if let Some(node) = self.records.get_mut(&dependency) {
            node.add_dependent(dependent);
        }
        if let Some(node) = self.records.get_mut(&dependent) {
            node.insert_dependency(dependency, version);
        }
    }

    /// Remove every outgoing edge of `dependent`, on both sides.
    ///
    /// Called before a computation re-runs, since a branching compute
    /// function may read a different set of atoms this time.
    pub(crate) fn clear_dependencies(&mut self, dependent: AtomId) {
        let old = match self.records.get_mut(&dependent) {
            Some(node) => node.take_dependencies(),
            None => return,
        };
        for dependency in old.keys() {
            if let Some(node) = self.records.get_mut(dependency) {
                node.remove_dependent(dependent);
            }
        }
    }

    /// Install the edges observed by a computation of `dependent`.
    pub(crate) fn install_dependencies(&mut self, dependent: AtomId, reads: IndexMap<AtomId, u64>) {
        for (dependency, version) in reads {
            self.add_edge(dependency, dependent, version);
        }
    }

    /// Mark every valid atom reachable from `changed` along dependent edges
    /// as invalidated. Returns the number of records newly invalidated.
    pub(crate) fn invalidate_dependents(&mut self, changed: AtomId) -> usize {
        let mut visited = HashSet::new();
        let mut stack: SmallVec<[AtomId; 16]> = match self.records.get(&changed) {
            Some(node) => node.dependents().iter().copied().collect(),
            None => return 0,
        };
        let mut invalidated = 0;

        while let Some(atom) = stack.pop() {
            if !visited.insert(atom) {
                continue;
            }
            if let Some(node) = self.records.get_mut(&atom) {
                if node.invalidate() {
                    invalidated += 1;
                }
                stack.extend(node.dependents().iter().copied());
            }
        }

        invalidated
    }

    /// Order the atoms reachable from `roots` so that every atom comes after
    /// all of its dependencies within the reachable set.
    ///
    /// The roots themselves lead the order. Fails with `StoreError::Cycle`
    /// when the dependent edges contain a cycle.
    pub(crate) fn recompute_order<I>(&self, roots: I) -> StoreResult<Vec<AtomId>>
    where
        I: IntoIterator<Item = AtomId>,
    {
        let mut marks: HashMap<AtomId, Visit> = HashMap::new();
        let mut post_order = Vec::new();

        for root in roots {
            if marks.contains_key(&root) {
                continue;
            }
            marks.insert(root, Visit::InProgress);

            // (atom, index of the next dependent to visit)
            let mut stack: Vec<(AtomId, usize)> = vec![(root, 0)];

            while let Some(&(atom, next)) = stack.last() {
                let dependent = self
                    .records
                    .get(&atom)
                    .and_then(|node| node.dependents().get_index(next))
                    .copied();

                match dependent {
                    Some(dependent) => {
                        if let Some(top) = stack.last_mut() {
                            top.1 += 1;
                        }
                        match marks.get(&dependent) {
                            Some(Visit::Done) => {}
                            Some(Visit::InProgress) => {
                                return Err(self.cycle_error(&stack, dependent));
                            }
                            None => {
                                marks.insert(dependent, Visit::InProgress);
                                stack.push((dependent, 0));
                            }
                        }
                    }
                    None => {
                        stack.pop();
                        marks.insert(atom, Visit::Done);
                        post_order.push(atom);
                    }
                }
            }
        }

        post_order.reverse();
        Ok(post_order)
    }

    fn cycle_error(&self, stack: &[(AtomId, usize)], closing: AtomId) -> StoreError {
        let start = stack
            .iter()
            .position(|&(atom, _)| atom == closing)
            .unwrap_or(0);
        let path = stack[start..]
            .iter()
            .map(|&(atom, _)| self.name(atom))
            .chain(std::iter::once(self.name(closing)))
            .collect();
        StoreError::Cycle { path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{atom, derived, Readable};
    use crate::graph::RecordState;

    fn source(graph: &mut DependencyGraph, label: &str) -> AtomId {
        let a = atom(0).with_label(label);
        let record = graph.ensure(a.atom().def());
        record.seed(Arc::new(0i32));
        a.id()
    }

    fn computed(graph: &mut DependencyGraph, label: &str) -> AtomId {
        let a = derived(|_| Ok(0)).with_label(label);
        let record = graph.ensure(a.def());
        record.store_value(Arc::new(0i32), false);
        a.id()
    }

    fn position(order: &[AtomId], atom: AtomId) -> usize {
        order.iter().position(|&a| a == atom).unwrap()
    }

    #[test]
    fn ensure_creates_record_once() {
        let mut graph = DependencyGraph::new();
        let a = atom(1);

        graph.ensure(a.atom().def());
        graph.ensure(a.atom().def());
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get(a.id()).unwrap().state(), RecordState::Uninitialized);
    }

    #[test]
    fn edges_are_mutually_consistent() {
        let mut graph = DependencyGraph::new();
        let a = source(&mut graph, "a");
        let b = computed(&mut graph, "b");

        graph.add_edge(a, b, 0);
        assert!(graph.get(a).unwrap().dependents().contains(&b));
        assert_eq!(graph.get(b).unwrap().dependencies().get(&a), Some(&0));

        graph.clear_dependencies(b);
        assert!(!graph.get(a).unwrap().dependents().contains(&b));
        assert!(graph.get(b).unwrap().dependencies().is_empty());
    }

    #[test]
    fn invalidation_reaches_transitive_dependents_once() {
        let mut graph = DependencyGraph::new();

        // count -> double -> quad, count -> sum, double -> sum
        let count = source(&mut graph, "count");
        let double = computed(&mut graph, "double");
        let quad = computed(&mut graph, "quad");
        let sum = computed(&mut graph, "sum");
        graph.add_edge(count, double, 0);
        graph.add_edge(double, quad, 0);
        graph.add_edge(count, sum, 0);
        graph.add_edge(double, sum, 0);

        assert_eq!(graph.invalidate_dependents(count), 3);
        for atom in [double, quad, sum] {
            assert_eq!(graph.get(atom).unwrap().state(), RecordState::Invalidated);
        }
        assert_eq!(graph.get(count).unwrap().state(), RecordState::Valid);

        // Already invalidated records are not counted twice
        assert_eq!(graph.invalidate_dependents(count), 0);
    }

    #[test]
    fn unrelated_atoms_stay_valid() {
        let mut graph = DependencyGraph::new();
        let a = source(&mut graph, "a");
        let b = source(&mut graph, "b");
        let from_b = computed(&mut graph, "from_b");
        graph.add_edge(b, from_b, 0);

        assert_eq!(graph.invalidate_dependents(a), 0);
        assert_eq!(graph.get(from_b).unwrap().state(), RecordState::Valid);
    }

    #[test]
    fn diamond_orders_dependencies_first() {
        let mut graph = DependencyGraph::new();
        let count = source(&mut graph, "count");
        let double = computed(&mut graph, "double");
        let quad = computed(&mut graph, "quad");
        let sum = computed(&mut graph, "sum");
        graph.add_edge(count, double, 0);
        graph.add_edge(count, sum, 0);
        graph.add_edge(double, quad, 0);
        graph.add_edge(double, sum, 0);

        let order = graph.recompute_order([count]).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], count);
        assert!(position(&order, double) < position(&order, quad));
        assert!(position(&order, double) < position(&order, sum));
    }

    #[test]
    fn order_spans_multiple_roots() {
        let mut graph = DependencyGraph::new();
        let a = source(&mut graph, "a");
        let b = source(&mut graph, "b");
        let both = computed(&mut graph, "both");
        let after = computed(&mut graph, "after");
        graph.add_edge(a, both, 0);
        graph.add_edge(b, both, 0);
        graph.add_edge(both, after, 0);

        let order = graph.recompute_order([a, b]).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, a) < position(&order, both));
        assert!(position(&order, b) < position(&order, both));
        assert!(position(&order, both) < position(&order, after));
    }

    #[test]
    fn cycle_is_reported_with_path() {
        let mut graph = DependencyGraph::new();
        let root = source(&mut graph, "root");
        let x = computed(&mut graph, "x");
        let y = computed(&mut graph, "y");
        graph.add_edge(root, x, 0);
        graph.add_edge(x, y, 0);
        graph.add_edge(y, x, 0);

        let err = graph.recompute_order([root]).unwrap_err();
        match err {
            StoreError::Cycle { path } => assert_eq!(path, vec!["x", "y", "x"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut graph = DependencyGraph::new();
        let root = source(&mut graph, "root");
        let mut previous = root;
        for i in 0..50_000 {
            let next = computed(&mut graph, &format!("n{i}"));
            graph.add_edge(previous, next, 0);
            previous = next;
        }

        assert_eq!(graph.invalidate_dependents(root), 50_000);
        let order = graph.recompute_order([root]).unwrap();
        assert_eq!(order.len(), 50_001);
        assert_eq!(order.last(), Some(&previous));
    }
}
