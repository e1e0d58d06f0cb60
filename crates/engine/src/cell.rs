//! A single sheet entry: empty, literal text, or a formula with a cached
//! evaluated value.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FormulaError, ParseError};
use crate::formula::Formula;
use crate::position::Position;
use crate::sheet::Sheet;

/// Discriminant for the three cell states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    Empty,
    Text,
    Formula,
}

/// The value a cell presents to readers.
///
/// An empty cell reads as `Text("")`. Formula cells read as `Number` or,
/// when evaluation fails, as `Error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum CellState {
    Empty,
    Text(String),
    Formula {
        formula: Formula,
        // Memoized evaluation result; None means recompute on next read.
        cache: RefCell<Option<CellValue>>,
    },
}

impl CellState {
    pub(crate) fn referenced_cells(&self) -> &[Position] {
        match self {
            CellState::Formula { formula, .. } => formula.referenced_cells(),
            _ => &[],
        }
    }
}

/// One entry of a sheet.
///
/// Cells are owned by their sheet and do not store a back-reference to it;
/// reads that may evaluate a formula take the owning sheet as an argument.
#[derive(Clone, Debug)]
pub struct Cell {
    pub(crate) state: CellState,
}

impl Cell {
    /// Parse cell source text into a cell.
    ///
    /// Empty text makes an empty cell. Text not starting with `=` - or the
    /// bare `"="` - is literal text. Anything else parses as a formula; a
    /// malformed formula is an error and produces no cell.
    pub(crate) fn parse(text: &str) -> Result<Self, ParseError> {
        let state = if text.is_empty() {
            CellState::Empty
        } else if !text.starts_with('=') || text == "=" {
            CellState::Text(text.to_string())
        } else {
            CellState::Formula {
                formula: Formula::parse(&text[1..])?,
                cache: RefCell::new(None),
            }
        };
        Ok(Self { state })
    }

    pub(crate) fn new_empty() -> Self {
        Self {
            state: CellState::Empty,
        }
    }

    pub fn kind(&self) -> CellKind {
        match &self.state {
            CellState::Empty => CellKind::Empty,
            CellState::Text(_) => CellKind::Text,
            CellState::Formula { .. } => CellKind::Formula,
        }
    }

    /// The cell's value. `sheet` must be the sheet owning this cell; formula
    /// cells evaluate through it and memoize the result.
    pub fn value(&self, sheet: &Sheet) -> CellValue {
        match &self.state {
            CellState::Empty => CellValue::Text(String::new()),
            CellState::Text(s) => match s.strip_prefix('\'') {
                Some(escaped) => CellValue::Text(escaped.to_string()),
                None => CellValue::Text(s.clone()),
            },
            CellState::Formula { formula, cache } => {
                if let Some(cached) = cache.borrow().clone() {
                    return cached;
                }
                let value = match formula.evaluate(sheet) {
                    Ok(n) => CellValue::Number(n),
                    Err(e) => CellValue::Error(e),
                };
                *cache.borrow_mut() = Some(value.clone());
                value
            }
        }
    }

    /// The cell's source text: `""` for empty cells, the raw text (leading
    /// apostrophe preserved) for text cells, `=` plus the canonical
    /// expression for formula cells.
    pub fn text(&self) -> String {
        match &self.state {
            CellState::Empty => String::new(),
            CellState::Text(s) => s.clone(),
            CellState::Formula { formula, .. } => format!("={}", formula.expression()),
        }
    }

    /// Cells this cell's formula references: sorted, duplicate-free.
    /// Empty for non-formula cells.
    pub fn referenced_cells(&self) -> &[Position] {
        self.state.referenced_cells()
    }

    /// Drop the memoized value so the next read recomputes. No-op for
    /// non-formula cells.
    pub(crate) fn invalidate_cache(&self) {
        if let CellState::Formula { cache, .. } = &self.state {
            *cache.borrow_mut() = None;
        }
    }

    /// True when a formula cell holds a memoized value.
    pub fn is_cache_valid(&self) -> bool {
        match &self.state {
            CellState::Formula { cache, .. } => cache.borrow().is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cell() {
        let sheet = Sheet::new();
        let cell = Cell::parse("").unwrap();
        assert_eq!(cell.kind(), CellKind::Empty);
        assert_eq!(cell.value(&sheet), CellValue::Text(String::new()));
        assert_eq!(cell.text(), "");
        assert!(cell.referenced_cells().is_empty());
    }

    #[test]
    fn test_text_cell() {
        let sheet = Sheet::new();
        let cell = Cell::parse("hello").unwrap();
        assert_eq!(cell.kind(), CellKind::Text);
        assert_eq!(cell.value(&sheet), CellValue::Text("hello".to_string()));
        assert_eq!(cell.text(), "hello");
    }

    #[test]
    fn test_apostrophe_escape() {
        let sheet = Sheet::new();
        let cell = Cell::parse("'=hi").unwrap();
        assert_eq!(cell.kind(), CellKind::Text);
        assert_eq!(cell.text(), "'=hi");
        assert_eq!(cell.value(&sheet), CellValue::Text("=hi".to_string()));
    }

    #[test]
    fn test_bare_equals_is_text() {
        let sheet = Sheet::new();
        let cell = Cell::parse("=").unwrap();
        assert_eq!(cell.kind(), CellKind::Text);
        assert_eq!(cell.text(), "=");
        assert_eq!(cell.value(&sheet), CellValue::Text("=".to_string()));
    }

    #[test]
    fn test_formula_cell() {
        let sheet = Sheet::new();
        let cell = Cell::parse("=1+2*3").unwrap();
        assert_eq!(cell.kind(), CellKind::Formula);
        assert_eq!(cell.text(), "=1+2*3");
        assert_eq!(cell.value(&sheet), CellValue::Number(7.0));
    }

    #[test]
    fn test_formula_text_is_canonical() {
        let cell = Cell::parse("= (1 + 2) * A1 ").unwrap();
        assert_eq!(cell.text(), "=(1+2)*A1");
    }

    #[test]
    fn test_malformed_formula_is_error() {
        assert!(Cell::parse("=1+").is_err());
        assert!(Cell::parse("=)").is_err());
    }

    #[test]
    fn test_value_is_memoized() {
        let sheet = Sheet::new();
        let cell = Cell::parse("=2*21").unwrap();
        assert!(!cell.is_cache_valid());

        assert_eq!(cell.value(&sheet), CellValue::Number(42.0));
        assert!(cell.is_cache_valid());

        cell.invalidate_cache();
        assert!(!cell.is_cache_valid());
        assert_eq!(cell.value(&sheet), CellValue::Number(42.0));
    }

    #[test]
    fn test_errors_are_cached_too() {
        let sheet = Sheet::new();
        let cell = Cell::parse("=1/0").unwrap();
        assert_eq!(cell.value(&sheet), CellValue::Error(FormulaError::Arithmetic));
        assert!(cell.is_cache_valid());
    }

    #[test]
    fn test_invalidate_is_noop_for_non_formula() {
        let cell = Cell::parse("plain").unwrap();
        cell.invalidate_cache();
        assert!(!cell.is_cache_valid());
    }

    #[test]
    fn test_cell_value_display() {
        assert_eq!(CellValue::Text("x".to_string()).to_string(), "x");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Number(3.0).to_string(), "3");
        assert_eq!(
            CellValue::Error(FormulaError::Ref).to_string(),
            "#REF!"
        );
    }
}
