//! Cell storage: one content variant plus the dependency edges and the
//! memoized formula result.

use std::cell::RefCell;

use rustc_hash::FxHashSet;
use tabula_common::{CellValue, Position};
use tabula_parse::{parse_formula, Formula, ParseError, ValueResolver};

/// Formula lead-in sentinel.
pub const FORMULA_SIGN: char = '=';
/// Text escape sentinel; suppresses formula interpretation of the value.
pub const ESCAPE_SIGN: char = '\'';

/// What a cell stores. A closed sum: the three variants are the whole story.
#[derive(Debug)]
pub(crate) enum CellContent {
    Empty,
    Text(String),
    Formula(Formula),
}

impl CellContent {
    /// Classify raw input text.
    ///
    /// The empty string is Empty; `=` followed by at least one character is
    /// a formula (a lone `=` is text); everything else, including escaped
    /// strings, is text.
    pub(crate) fn from_input(text: &str) -> Result<Self, ParseError> {
        if text.is_empty() {
            return Ok(CellContent::Empty);
        }
        match text.strip_prefix(FORMULA_SIGN) {
            Some(expr) if !expr.is_empty() => Ok(CellContent::Formula(parse_formula(expr)?)),
            _ => Ok(CellContent::Text(text.to_string())),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, CellContent::Empty)
    }
}

/// A cell in the sheet's table.
///
/// The sheet exclusively owns every cell; `refs_out` / `refs_in` relate
/// cells by position, never by owning handles. `refs_in` is maintained by
/// the sheet when edges are rewired, never by the cell itself.
#[derive(Debug)]
pub struct Cell {
    content: CellContent,
    /// Memoized formula result. Interior-mutable so a read can populate it;
    /// only meaningful for formula content.
    cache: RefCell<Option<CellValue>>,
    /// Positions this cell's formula reads (this cell's inputs).
    pub(crate) refs_out: FxHashSet<Position>,
    /// Positions whose formulas read this cell (this cell's dependents).
    pub(crate) refs_in: FxHashSet<Position>,
}

impl Cell {
    /// An empty cell with no edges, as created by auto-vivification.
    pub(crate) fn placeholder() -> Self {
        Cell {
            content: CellContent::Empty,
            cache: RefCell::new(None),
            refs_out: FxHashSet::default(),
            refs_in: FxHashSet::default(),
        }
    }

    /// The cell's value as a reader sees it.
    ///
    /// Text answers with exactly one leading `'` stripped; a formula answers
    /// from its cache, evaluating against `resolver` (the owning sheet) on
    /// the first read after an invalidation. Evaluation never mutates the
    /// graph; the cache is the only interior-mutable state.
    pub fn value(&self, resolver: &dyn ValueResolver) -> CellValue {
        match &self.content {
            CellContent::Empty => CellValue::Empty,
            CellContent::Text(text) => {
                CellValue::Text(text.strip_prefix(ESCAPE_SIGN).unwrap_or(text).to_string())
            }
            CellContent::Formula(formula) => {
                if let Some(cached) = self.cache.borrow().as_ref() {
                    return cached.clone();
                }
                let value = match formula.evaluate(resolver) {
                    Ok(n) => CellValue::Number(n),
                    Err(e) => CellValue::Error(e),
                };
                *self.cache.borrow_mut() = Some(value.clone());
                value
            }
        }
    }

    /// The cell's text as an editor sees it: stored text verbatim (escape
    /// included), or `=` plus the canonical expression for a formula.
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(text) => text.clone(),
            CellContent::Formula(formula) => format!("{}{}", FORMULA_SIGN, formula.expression()),
        }
    }

    /// Positions the current content declares, in the formula's stable
    /// order. Empty for non-formula content.
    pub fn referenced_cells(&self) -> &[Position] {
        match &self.content {
            CellContent::Formula(formula) => formula.referenced_cells(),
            _ => &[],
        }
    }

    /// True iff some formula cell reads this cell.
    pub fn is_referenced(&self) -> bool {
        !self.refs_in.is_empty()
    }

    pub(crate) fn is_empty_content(&self) -> bool {
        self.content.is_empty()
    }

    pub(crate) fn is_formula(&self) -> bool {
        matches!(self.content, CellContent::Formula(_))
    }

    pub(crate) fn is_cache_valid(&self) -> bool {
        self.cache.borrow().is_some()
    }

    pub(crate) fn invalidate_cache(&self) {
        self.cache.borrow_mut().take();
    }

    /// Swap in new content: the cache resets and the forward edges clear
    /// (the sheet rewires them from the new content's declarations).
    pub(crate) fn replace_content(&mut self, content: CellContent) {
        self.content = content;
        self.cache = RefCell::new(None);
        self.refs_out.clear();
    }
}
