//! Reference index for formula cells.
//!
//! Tracks, for every formula cell, the cells its expression references, and
//! the reverse: for every referenced position, the formula cells reading it.
//! The reverse side drives transitive cache invalidation on edits.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B's formula references A"  (B depends on A)
//! ```
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** `r ∈ refs[p]` iff `p ∈ dependents[r]`.
//! 2. **No dangling entries:** empty sets are removed, not stored.
//! 3. **No duplicate edges:** set semantics enforced by `FxHashSet`.
//! 4. **Atomic updates:** `replace_refs` is the only mutator touching both maps.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::position::Position;

#[derive(Clone, Debug, Default)]
pub struct DepGraph {
    /// For each formula cell, the positions its expression references.
    refs: FxHashMap<Position, FxHashSet<Position>>,

    /// Reverse dependency index: for each position, the formula cells whose
    /// expressions reference it.
    dependents: FxHashMap<Position, FxHashSet<Position>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The formula cells that read `pos`.
    pub fn dependents(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        self.dependents
            .get(&pos)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// The positions `cell`'s formula references.
    pub fn references(&self, cell: Position) -> impl Iterator<Item = Position> + '_ {
        self.refs
            .get(&cell)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Replace all edges for a formula cell atomically:
    /// remove the cell from its old references' dependent sets, then install
    /// the new reference set on both sides. Pass an empty set to unwire.
    pub fn replace_refs(&mut self, cell: Position, new_refs: FxHashSet<Position>) {
        if let Some(old_refs) = self.refs.remove(&cell) {
            for referenced in old_refs {
                if let Some(deps) = self.dependents.get_mut(&referenced) {
                    deps.remove(&cell);
                    if deps.is_empty() {
                        self.dependents.remove(&referenced);
                    }
                }
            }
        }

        if new_refs.is_empty() {
            return;
        }

        for referenced in &new_refs {
            self.dependents.entry(*referenced).or_default().insert(cell);
        }
        self.refs.insert(cell, new_refs);
    }

    /// Forget a cell's outgoing references (formula removed or cell deleted).
    /// Dependents of the cell are untouched: formulas elsewhere still
    /// reference the position.
    pub fn clear_cell(&mut self, cell: Position) {
        self.replace_refs(cell, FxHashSet::default());
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, refs) in &self.refs {
            assert!(!refs.is_empty(), "empty refs set stored for {cell}");
            for referenced in refs {
                assert!(
                    self.dependents
                        .get(referenced)
                        .is_some_and(|deps| deps.contains(cell)),
                    "missing dependent edge: {referenced} should list {cell}"
                );
            }
        }
        for (pos, deps) in &self.dependents {
            assert!(!deps.is_empty(), "empty dependents set stored for {pos}");
            for dep in deps {
                assert!(
                    self.refs.get(dep).is_some_and(|refs| refs.contains(pos)),
                    "missing ref edge: {dep} should reference {pos}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(address: &str) -> Position {
        address.parse().unwrap()
    }

    fn set(cells: &[Position]) -> FxHashSet<Position> {
        cells.iter().copied().collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();
        assert_eq!(graph.dependents(pos("A1")).count(), 0);
        assert_eq!(graph.references(pos("A1")).count(), 0);
        graph.assert_consistent();
    }

    #[test]
    fn test_single_edge() {
        // B1 = A1
        let mut graph = DepGraph::new();
        graph.replace_refs(pos("B1"), set(&[pos("A1")]));
        graph.assert_consistent();

        assert_eq!(graph.references(pos("B1")).collect::<Vec<_>>(), vec![pos("A1")]);
        assert_eq!(graph.dependents(pos("A1")).collect::<Vec<_>>(), vec![pos("B1")]);
        assert_eq!(graph.dependents(pos("B1")).count(), 0);
    }

    #[test]
    fn test_multiple_dependents() {
        // B1 = A1, C1 = A1
        let mut graph = DepGraph::new();
        graph.replace_refs(pos("B1"), set(&[pos("A1")]));
        graph.replace_refs(pos("C1"), set(&[pos("A1")]));
        graph.assert_consistent();

        let mut deps: Vec<_> = graph.dependents(pos("A1")).collect();
        deps.sort();
        assert_eq!(deps, vec![pos("B1"), pos("C1")]);
    }

    #[test]
    fn test_rewiring_drops_old_edges() {
        // B1 = A1, then B1 = A2
        let mut graph = DepGraph::new();
        graph.replace_refs(pos("B1"), set(&[pos("A1")]));
        graph.replace_refs(pos("B1"), set(&[pos("A2")]));
        graph.assert_consistent();

        assert_eq!(graph.dependents(pos("A1")).count(), 0);
        assert_eq!(graph.dependents(pos("A2")).collect::<Vec<_>>(), vec![pos("B1")]);
        assert_eq!(graph.references(pos("B1")).collect::<Vec<_>>(), vec![pos("A2")]);
    }

    #[test]
    fn test_unwiring() {
        let mut graph = DepGraph::new();
        graph.replace_refs(pos("B1"), set(&[pos("A1"), pos("A2")]));
        graph.clear_cell(pos("B1"));
        graph.assert_consistent();

        assert_eq!(graph.references(pos("B1")).count(), 0);
        assert_eq!(graph.dependents(pos("A1")).count(), 0);
        assert_eq!(graph.dependents(pos("A2")).count(), 0);
    }

    #[test]
    fn test_clear_keeps_incoming_edges() {
        // B1 = A1; clearing A1 must not unwire B1's reference to it.
        let mut graph = DepGraph::new();
        graph.replace_refs(pos("B1"), set(&[pos("A1")]));
        graph.clear_cell(pos("A1"));
        graph.assert_consistent();

        assert_eq!(graph.dependents(pos("A1")).collect::<Vec<_>>(), vec![pos("B1")]);
    }

    #[test]
    fn test_diamond() {
        //     A1
        //    /  \
        //   B1   C1
        //    \  /
        //     D1
        let mut graph = DepGraph::new();
        graph.replace_refs(pos("B1"), set(&[pos("A1")]));
        graph.replace_refs(pos("C1"), set(&[pos("A1")]));
        graph.replace_refs(pos("D1"), set(&[pos("B1"), pos("C1")]));
        graph.assert_consistent();

        let mut a1_deps: Vec<_> = graph.dependents(pos("A1")).collect();
        a1_deps.sort();
        assert_eq!(a1_deps, vec![pos("B1"), pos("C1")]);

        let mut d1_refs: Vec<_> = graph.references(pos("D1")).collect();
        d1_refs.sort();
        assert_eq!(d1_refs, vec![pos("B1"), pos("C1")]);
    }
}
