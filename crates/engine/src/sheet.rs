//! The sheet: owns cells by position and keeps the whole grid coherent
//! across edits - reference tracking, cycle rejection with rollback, and
//! transitive cache invalidation.

use std::cell::RefCell;
use std::io::{self, Write};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::Cell;
use crate::dep_graph::DepGraph;
use crate::error::SheetError;
use crate::position::{Position, Size};

/// Printable extent bookkeeping. Grown incrementally on insert, marked stale
/// on removal and recomputed lazily from the occupancy map.
#[derive(Clone, Copy, Debug, Default)]
struct PrintArea {
    rows: usize,
    cols: usize,
    stale: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Sheet {
    cells: FxHashMap<Position, Cell>,
    deps: DepGraph,
    area: RefCell<PrintArea>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cell at `pos` from source text.
    ///
    /// The text is parsed first; a parse failure changes nothing. An edit
    /// that would make the reference graph cyclic is rejected and rolled
    /// back, leaving every cell's text, value and references as they were.
    /// Cells referenced by a formula but not yet present come into existence
    /// as empty cells (and stay, even when the edit is rejected).
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        check_position(pos)?;
        let new_cell = Cell::parse(text)?;

        // Dependents can exist even when `pos` itself is absent (a cleared
        // cell may still be referenced), so invalidate on both paths.
        self.invalidate_dependents(pos);

        match self.cells.get_mut(&pos) {
            Some(existing) => {
                let old_state = std::mem::replace(&mut existing.state, new_cell.state);
                self.deps.clear_cell(pos);
                if self.creates_cycle(pos) {
                    // Restore the saved state; no re-parse, cannot fail.
                    let old_refs: FxHashSet<Position> =
                        old_state.referenced_cells().iter().copied().collect();
                    if let Some(cell) = self.cells.get_mut(&pos) {
                        cell.state = old_state;
                    }
                    self.deps.replace_refs(pos, old_refs);
                    return Err(SheetError::CircularDependency(pos));
                }
                let new_refs = self.refs_of(pos);
                self.deps.replace_refs(pos, new_refs);
            }
            None => {
                self.cells.insert(pos, new_cell);
                if self.creates_cycle(pos) {
                    self.cells.remove(&pos);
                    return Err(SheetError::CircularDependency(pos));
                }
                let new_refs = self.refs_of(pos);
                self.deps.replace_refs(pos, new_refs);
                self.grow_area(pos);
            }
        }
        Ok(())
    }

    /// Remove the cell at `pos`. Clearing an absent cell is a no-op.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        check_position(pos)?;
        if self.cells.remove(&pos).is_some() {
            // Dependent formulas now read an empty cell.
            self.invalidate_dependents(pos);
            self.deps.clear_cell(pos);
            self.area.borrow_mut().stale = true;
        }
        Ok(())
    }

    /// The cell at `pos`, if any. Never materializes.
    pub fn get_cell(&self, pos: Position) -> Result<Option<&Cell>, SheetError> {
        check_position(pos)?;
        Ok(self.cells.get(&pos))
    }

    /// Occupied cells, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = (Position, &Cell)> {
        self.cells.iter().map(|(pos, cell)| (*pos, cell))
    }

    /// The minimal bounding rectangle containing every occupied cell.
    pub fn printable_size(&self) -> Size {
        let mut area = self.area.borrow_mut();
        if area.stale {
            area.rows = 0;
            area.cols = 0;
            for pos in self.cells.keys() {
                area.rows = area.rows.max(pos.row + 1);
                area.cols = area.cols.max(pos.col + 1);
            }
            area.stale = false;
        }
        Size {
            rows: area.rows,
            cols: area.cols,
        }
    }

    /// Render evaluated values: rows separated by `\n` (every row
    /// terminated), cells by `\t`, absent cells as the empty string.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |cell| cell.value(self).to_string())
    }

    /// Render source texts in the same row/tab layout as `print_values`.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |cell| cell.text())
    }

    /// Lookup used during formula evaluation; positions are already known
    /// to be valid there.
    pub(crate) fn cell_at(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(&pos)
    }

    fn print_with<W, F>(&self, out: &mut W, render: F) -> io::Result<()>
    where
        W: Write,
        F: Fn(&Cell) -> String,
    {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                if let Some(cell) = self.cells.get(&Position::new(row, col)) {
                    write!(out, "{}", render(cell))?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Depth-first walk over the referenced-cells graph from `start`,
    /// looking for a path back to `start`. Referenced positions that do not
    /// exist yet are materialized as empty cells along the way, so future
    /// references resolve to the same cell.
    fn creates_cycle(&mut self, start: Position) -> bool {
        let mut stack = match self.cells.get(&start) {
            Some(cell) => cell.referenced_cells().to_vec(),
            None => return false,
        };
        let mut visited: FxHashSet<Position> = FxHashSet::default();

        while let Some(pos) = stack.pop() {
            if pos == start {
                return true;
            }
            if !visited.insert(pos) {
                continue;
            }
            match self.cells.get(&pos) {
                Some(cell) => stack.extend(cell.referenced_cells().iter().copied()),
                None => {
                    self.cells.insert(pos, Cell::new_empty());
                    self.grow_area(pos);
                }
            }
        }
        false
    }

    /// Walk the reverse index transitively and drop every dependent's
    /// memoized value.
    fn invalidate_dependents(&self, pos: Position) {
        let mut visited: FxHashSet<Position> = FxHashSet::default();
        let mut stack: Vec<Position> = self.deps.dependents(pos).collect();

        while let Some(dependent) = stack.pop() {
            if !visited.insert(dependent) {
                continue;
            }
            if let Some(cell) = self.cells.get(&dependent) {
                cell.invalidate_cache();
            }
            stack.extend(self.deps.dependents(dependent));
        }
    }

    fn refs_of(&self, pos: Position) -> FxHashSet<Position> {
        self.cells
            .get(&pos)
            .map(|cell| cell.referenced_cells().iter().copied().collect())
            .unwrap_or_default()
    }

    fn grow_area(&self, pos: Position) {
        let mut area = self.area.borrow_mut();
        if !area.stale {
            area.rows = area.rows.max(pos.row + 1);
            area.cols = area.cols.max(pos.col + 1);
        }
    }
}

fn check_position(pos: Position) -> Result<(), SheetError> {
    if pos.is_valid() {
        Ok(())
    } else {
        Err(SheetError::InvalidPosition(pos))
    }
}
