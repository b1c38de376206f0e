//! The sheet: a sparse position-addressed cell table with dependency
//! tracking, printable-region accounting, and bulk printing.
//!
//! All mutation funnels through [`Sheet::set_cell`], which runs the full
//! install sequence for a content change: build the candidate, vivify
//! referenced cells, check for cycles, commit the edge rewiring, invalidate
//! dependent caches. Failures leave the sheet exactly as it was.

use std::io;

use rustc_hash::{FxHashMap, FxHashSet};
use tabula_common::{CellValue, FormulaError, Position, SheetConfig, Size};
use tabula_parse::ValueResolver;
use tracing::{debug, warn};

use crate::cell::{Cell, CellContent};
use crate::error::SheetError;

/// A sparse spreadsheet table.
///
/// Cells live in a single owned map keyed by [`Position`]; every cross-cell
/// relation is a position into that map, so there are no ownership cycles
/// and the backing store can be relocated freely.
#[derive(Debug, Default)]
pub struct Sheet {
    config: SheetConfig,
    cells: FxHashMap<Position, Cell>,
    /// Live non-empty cells per row. Entries are erased at zero, so the keys
    /// are exactly the rows that keep the printable region open.
    row_occupancy: FxHashMap<u32, u32>,
    /// Live non-empty cells per column.
    col_occupancy: FxHashMap<u32, u32>,
}

impl Sheet {
    /// A sheet with the default 16 384 × 16 384 bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sheet with explicit bounds.
    pub fn with_config(config: SheetConfig) -> Self {
        Sheet {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    /// Replace the content at `pos` with the classification of `text`.
    ///
    /// On any error the sheet is unchanged: a parse failure creates nothing,
    /// and a rejected cycle drops the placeholders it vivified while
    /// checking. On success all graph invariants hold and every dependent
    /// formula's cache is invalidated.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        self.validate(pos)?;
        let candidate = CellContent::from_input(text)?;

        // Declared references, restricted to addressable positions. An
        // out-of-bounds reference gets no edge and no placeholder; it
        // surfaces as #REF! when the formula evaluates.
        let new_refs: Vec<Position> = match &candidate {
            CellContent::Formula(formula) => formula
                .referenced_cells()
                .iter()
                .copied()
                .filter(|r| r.is_valid_in(&self.config))
                .collect(),
            _ => Vec::new(),
        };

        // Vivify before the cycle walk so the edges-to-be have
        // identity-stable targets.
        let mut vivified = Vec::new();
        for &r in &new_refs {
            if !self.cells.contains_key(&r) {
                self.cells.insert(r, Cell::placeholder());
                vivified.push(r);
            }
        }
        if !vivified.is_empty() {
            debug!(cell = %pos, count = vivified.len(), "auto-vivified referenced cells");
        }

        if self.creates_cycle(pos, &new_refs) {
            // The placeholders gained no edges; dropping them restores the
            // pre-call table.
            for r in vivified {
                self.cells.remove(&r);
            }
            warn!(cell = %pos, "rejected formula: it would close a dependency cycle");
            return Err(SheetError::CircularDependency(pos));
        }

        self.commit(pos, candidate, &new_refs);
        Ok(())
    }

    /// An observer handle to the cell at `pos`, if one exists.
    pub fn cell(&self, pos: Position) -> Result<Option<&Cell>, SheetError> {
        self.validate(pos)?;
        Ok(self.cells.get(&pos))
    }

    /// Clear the content at `pos`.
    ///
    /// Content-wise this is `set_cell(pos, "")`: edges unlink, dependent
    /// caches invalidate, and the cell is dropped unless some formula still
    /// references it (then an empty placeholder stays behind). Idempotent.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        self.validate(pos)?;
        if self.cells.contains_key(&pos) {
            self.set_cell(pos, "")?;
        }
        Ok(())
    }

    /// The smallest rectangle anchored at `(0, 0)` covering every live
    /// non-empty cell, `(0, 0)` when there are none.
    pub fn printable_size(&self) -> Size {
        let rows = self.row_occupancy.keys().copied().max().map_or(0, |r| r + 1);
        let cols = self.col_occupancy.keys().copied().max().map_or(0, |c| c + 1);
        Size::new(rows, cols)
    }

    /// Print every cell's value over the printable rectangle.
    pub fn print_values<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |cell| cell.value(self).to_string())
    }

    /// Print every cell's text over the printable rectangle.
    pub fn print_texts<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |cell| cell.text())
    }

    /// Row-major emission: one tab between columns, a newline after each
    /// row, nothing for missing cells, no trailing tab.
    fn print_with<W: io::Write>(
        &self,
        out: &mut W,
        render: impl Fn(&Cell) -> String,
    ) -> io::Result<()> {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                if let Some(cell) = self.cells.get(&Position::new(row, col)) {
                    out.write_all(render(cell).as_bytes())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn validate(&self, pos: Position) -> Result<(), SheetError> {
        if pos.is_valid_in(&self.config) {
            Ok(())
        } else {
            Err(SheetError::InvalidPosition(pos))
        }
    }

    /// Internal accessor for resolution paths that have already validated.
    pub(crate) fn cell_ref(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(&pos)
    }

    /// Would installing edges `pos → targets` close a cycle?
    ///
    /// Walks the *existing* `refs_in` edges from `pos`: everything reached
    /// already depends on `pos`, so a cycle exists iff one of the new
    /// targets is among them. `pos` itself is reached first, which covers
    /// self-reference.
    fn creates_cycle(&self, pos: Position, targets: &[Position]) -> bool {
        if targets.is_empty() {
            return false;
        }
        let targets: FxHashSet<Position> = targets.iter().copied().collect();
        let mut visited = FxHashSet::default();
        let mut stack = vec![pos];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if targets.contains(&current) {
                return true;
            }
            if let Some(cell) = self.cells.get(&current) {
                stack.extend(cell.refs_in.iter().copied());
            }
        }
        false
    }

    /// Install `candidate` at `pos` and rewire edges. Only called after the
    /// cycle check has passed.
    fn commit(&mut self, pos: Position, candidate: CellContent, new_refs: &[Position]) {
        let (was_occupied, old_refs) = match self.cells.get(&pos) {
            Some(cell) => (
                !cell.is_empty_content(),
                cell.refs_out.iter().copied().collect::<Vec<_>>(),
            ),
            None => (false, Vec::new()),
        };
        let now_occupied = !candidate.is_empty();

        for r in &old_refs {
            if let Some(cell) = self.cells.get_mut(r) {
                cell.refs_in.remove(&pos);
            }
        }

        let cell = self.cells.entry(pos).or_insert_with(Cell::placeholder);
        cell.replace_content(candidate);
        cell.refs_out.extend(new_refs.iter().copied());

        for &r in new_refs {
            if let Some(cell) = self.cells.get_mut(&r) {
                cell.refs_in.insert(pos);
            }
        }

        // Everything that read the old content must recompute.
        self.invalidate_dependents(pos);

        // Placeholders orphaned by the rewire go away.
        for r in old_refs {
            if new_refs.contains(&r) {
                continue;
            }
            if let Some(cell) = self.cells.get(&r) {
                if cell.is_empty_content() && !cell.is_referenced() {
                    self.cells.remove(&r);
                }
            }
        }

        self.update_occupancy(pos, was_occupied, now_occupied);

        // An empty, unreferenced cell has no reason to exist.
        if !now_occupied && self.cells.get(&pos).is_some_and(|c| !c.is_referenced()) {
            self.cells.remove(&pos);
        }
    }

    /// Invalidate the cache of every cell transitively reachable over
    /// `refs_in` from `pos`.
    ///
    /// A dependent whose cache is already invalid had its own dependents
    /// invalidated when it went invalid, so its subtree is skipped. Sound
    /// because the graph is acyclic and because evaluating a formula always
    /// populates the caches of its inputs first.
    fn invalidate_dependents(&self, pos: Position) {
        let Some(cell) = self.cells.get(&pos) else {
            return;
        };
        let mut stack: Vec<Position> = cell.refs_in.iter().copied().collect();

        while let Some(current) = stack.pop() {
            let Some(cell) = self.cells.get(&current) else {
                continue;
            };
            if cell.is_cache_valid() {
                cell.invalidate_cache();
                stack.extend(cell.refs_in.iter().copied());
            }
        }
    }

    /// Occupancy counts live non-empty cells: adjust only on an emptiness
    /// transition, and erase entries that reach zero.
    fn update_occupancy(&mut self, pos: Position, was_occupied: bool, now_occupied: bool) {
        match (was_occupied, now_occupied) {
            (false, true) => {
                *self.row_occupancy.entry(pos.row).or_insert(0) += 1;
                *self.col_occupancy.entry(pos.col).or_insert(0) += 1;
            }
            (true, false) => {
                decrement_entry(&mut self.row_occupancy, pos.row);
                decrement_entry(&mut self.col_occupancy, pos.col);
            }
            _ => {}
        }
    }

    /// Check every structural invariant of the cell table. Test support;
    /// panics with a description on the first violation.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        for (&pos, cell) in &self.cells {
            for r in &cell.refs_out {
                let target = self
                    .cells
                    .get(r)
                    .unwrap_or_else(|| panic!("{pos}: refs_out target {r} missing from table"));
                assert!(
                    target.refs_in.contains(&pos),
                    "edge {pos} -> {r} not mirrored in refs_in"
                );
            }
            for r in &cell.refs_in {
                let source = self
                    .cells
                    .get(r)
                    .unwrap_or_else(|| panic!("{pos}: refs_in source {r} missing from table"));
                assert!(
                    source.refs_out.contains(&pos),
                    "edge {r} -> {pos} not mirrored in refs_out"
                );
            }
            if !cell.is_formula() {
                assert!(
                    cell.refs_out.is_empty(),
                    "{pos}: non-formula cell with outgoing edges"
                );
                assert!(
                    !cell.is_cache_valid(),
                    "{pos}: non-formula cell with a cached value"
                );
            }
            assert!(
                !cell.is_empty_content() || cell.is_referenced(),
                "{pos}: empty unreferenced cell retained"
            );
        }

        self.assert_acyclic();
        self.assert_occupancy_matches();
    }

    /// Kahn's algorithm over the `refs_out` digraph; leftovers mean a cycle.
    fn assert_acyclic(&self) {
        let mut fan_in: FxHashMap<Position, usize> =
            self.cells.keys().map(|&p| (p, 0)).collect();
        for cell in self.cells.values() {
            for r in &cell.refs_out {
                *fan_in.get_mut(r).expect("edge target exists") += 1;
            }
        }

        let mut ready: Vec<Position> = fan_in
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&p, _)| p)
            .collect();
        let mut processed = 0usize;
        while let Some(p) = ready.pop() {
            processed += 1;
            for r in &self.cells[&p].refs_out {
                let count = fan_in.get_mut(r).expect("edge target exists");
                *count -= 1;
                if *count == 0 {
                    ready.push(*r);
                }
            }
        }
        assert_eq!(processed, self.cells.len(), "dependency graph has a cycle");
    }

    fn assert_occupancy_matches(&self) {
        let mut rows: FxHashMap<u32, u32> = FxHashMap::default();
        let mut cols: FxHashMap<u32, u32> = FxHashMap::default();
        for (&pos, cell) in &self.cells {
            if !cell.is_empty_content() {
                *rows.entry(pos.row).or_insert(0) += 1;
                *cols.entry(pos.col).or_insert(0) += 1;
            }
        }
        assert_eq!(rows, self.row_occupancy, "row occupancy out of sync");
        assert_eq!(cols, self.col_occupancy, "column occupancy out of sync");
    }
}

fn decrement_entry(map: &mut FxHashMap<u32, u32>, key: u32) {
    if let Some(count) = map.get_mut(&key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            map.remove(&key);
        }
    }
}

impl ValueResolver for Sheet {
    /// Answer for any position: out-of-bounds is `#REF!`, a missing cell is
    /// empty, everything else is the cell's (possibly cached) value.
    fn cell_value(&self, pos: Position) -> CellValue {
        if !pos.is_valid_in(&self.config) {
            return CellValue::Error(FormulaError::Ref);
        }
        match self.cell_ref(pos) {
            Some(cell) => cell.value(self),
            None => CellValue::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: u32, col: u32) -> Position {
        Position::new(row, col)
    }

    #[test]
    fn setting_empty_text_on_a_missing_cell_creates_nothing() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(3, 3), "").unwrap();
        assert!(sheet.cell(pos(3, 3)).unwrap().is_none());
        assert_eq!(sheet.printable_size(), Size::new(0, 0));
        sheet.assert_invariants();
    }

    #[test]
    fn rewiring_reclaims_orphaned_placeholders() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "=B1").unwrap();
        assert!(sheet.cell(pos(0, 1)).unwrap().is_some(), "B1 vivified");

        sheet.set_cell(pos(0, 0), "=C1").unwrap();
        assert!(sheet.cell(pos(0, 1)).unwrap().is_none(), "B1 reclaimed");
        assert!(sheet.cell(pos(0, 2)).unwrap().is_some(), "C1 vivified");
        sheet.assert_invariants();
    }

    #[test]
    fn failed_self_reference_leaves_no_trace() {
        let mut sheet = Sheet::new();
        let err = sheet.set_cell(pos(0, 0), "=A1").unwrap_err();
        assert!(matches!(err, SheetError::CircularDependency(_)));
        assert!(sheet.cell(pos(0, 0)).unwrap().is_none());
        assert_eq!(sheet.printable_size(), Size::new(0, 0));
        sheet.assert_invariants();
    }

    #[test]
    fn repeated_sets_do_not_inflate_occupancy() {
        let mut sheet = Sheet::new();
        for _ in 0..5 {
            sheet.set_cell(pos(1, 1), "x").unwrap();
        }
        assert_eq!(sheet.printable_size(), Size::new(2, 2));
        sheet.clear_cell(pos(1, 1)).unwrap();
        assert_eq!(sheet.printable_size(), Size::new(0, 0));
        sheet.assert_invariants();
    }

    #[test]
    fn clearing_a_never_set_position_is_a_no_op() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "x").unwrap();
        sheet.clear_cell(pos(5, 5)).unwrap();
        assert_eq!(sheet.printable_size(), Size::new(1, 1));
        sheet.assert_invariants();
    }

    #[test]
    fn clearing_a_referenced_cell_keeps_a_placeholder() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 1), "7").unwrap();
        sheet.set_cell(pos(0, 0), "=B1").unwrap();

        sheet.clear_cell(pos(0, 1)).unwrap();
        let placeholder = sheet.cell(pos(0, 1)).unwrap().expect("kept while referenced");
        assert!(placeholder.is_referenced());
        assert_eq!(placeholder.value(&sheet), CellValue::Empty);
        // Only the formula cell still counts toward the printable region.
        assert_eq!(sheet.printable_size(), Size::new(1, 1));
        sheet.assert_invariants();
    }

    #[test]
    fn out_of_bounds_positions_are_rejected_everywhere() {
        let mut sheet = Sheet::with_config(SheetConfig {
            max_rows: 2,
            max_cols: 2,
        });
        let outside = pos(2, 0);
        assert!(matches!(
            sheet.set_cell(outside, "x"),
            Err(SheetError::InvalidPosition(_))
        ));
        assert!(matches!(
            sheet.cell(outside),
            Err(SheetError::InvalidPosition(_))
        ));
        assert!(matches!(
            sheet.clear_cell(outside),
            Err(SheetError::InvalidPosition(_))
        ));
    }

    #[test]
    fn formula_referencing_beyond_bounds_evaluates_to_ref_error() {
        let mut sheet = Sheet::with_config(SheetConfig {
            max_rows: 4,
            max_cols: 4,
        });
        sheet.set_cell(pos(0, 0), "=Z99").unwrap();
        let cell = sheet.cell(pos(0, 0)).unwrap().unwrap();
        assert_eq!(cell.value(&sheet), CellValue::Error(FormulaError::Ref));
        // No placeholder outside the bounds.
        assert!(matches!(
            sheet.cell(Position::parse_a1("Z99").unwrap()),
            Err(SheetError::InvalidPosition(_))
        ));
        sheet.assert_invariants();
    }

    #[test]
    fn cycle_through_a_chain_is_detected() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 0), "=B1").unwrap(); // A1 = B1
        sheet.set_cell(pos(0, 1), "=C1").unwrap(); // B1 = C1
        let err = sheet.set_cell(pos(0, 2), "=A1").unwrap_err(); // C1 = A1
        assert!(matches!(err, SheetError::CircularDependency(_)));

        // C1 is still the placeholder B1 vivified.
        let c1 = sheet.cell(pos(0, 2)).unwrap().expect("placeholder kept");
        assert!(c1.is_referenced());
        assert_eq!(c1.text(), "");
        sheet.assert_invariants();
    }

    #[test]
    fn replacing_a_formula_updates_both_edge_directions() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos(0, 1), "1").unwrap(); // B1
        sheet.set_cell(pos(0, 2), "2").unwrap(); // C1
        sheet.set_cell(pos(0, 0), "=B1").unwrap(); // A1 = B1
        sheet.set_cell(pos(0, 0), "=C1").unwrap(); // A1 = C1

        let b1 = sheet.cell(pos(0, 1)).unwrap().unwrap();
        let c1 = sheet.cell(pos(0, 2)).unwrap().unwrap();
        assert!(!b1.is_referenced());
        assert!(c1.is_referenced());
        sheet.assert_invariants();
    }
}
