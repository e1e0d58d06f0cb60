// Formula parsing and evaluation.

pub mod ast;
pub mod parser;

use crate::cell::CellValue;
use crate::error::{FormulaError, ParseError};
use crate::position::Position;
use crate::sheet::Sheet;

use self::ast::Expr;

/// A parsed formula: the expression tree plus the cells it depends on.
#[derive(Clone, Debug)]
pub struct Formula {
    expr: Expr,
    referenced: Vec<Position>,
}

impl Formula {
    /// Parse the expression source - the text after a cell's leading `=`.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let expr = parser::parse(source)?;
        let mut referenced = expr.positions();
        referenced.sort_unstable();
        referenced.dedup();
        Ok(Self { expr, referenced })
    }

    /// Evaluate against the sheet the owning cell belongs to.
    ///
    /// A referenced position resolves to: `0.0` when the cell is absent or
    /// its value is the empty string; the number itself for numeric values;
    /// the fully parsed number for text that reads as one; `#VALUE!` for any
    /// other text; and a stored error propagates as-is.
    pub fn evaluate(&self, sheet: &Sheet) -> Result<f64, FormulaError> {
        self.expr.evaluate(&|pos| cell_value_as_number(sheet, pos))
    }

    /// Canonical printed form of the expression, without the leading `=`.
    pub fn expression(&self) -> String {
        self.expr.to_string()
    }

    /// Referenced cells: sorted, duplicate-free.
    pub fn referenced_cells(&self) -> &[Position] {
        &self.referenced
    }
}

fn cell_value_as_number(sheet: &Sheet, pos: Position) -> Result<f64, FormulaError> {
    let Some(cell) = sheet.cell_at(pos) else {
        return Ok(0.0);
    };
    match cell.value(sheet) {
        CellValue::Number(n) => Ok(n),
        CellValue::Error(e) => Err(e),
        CellValue::Text(s) if s.is_empty() => Ok(0.0),
        CellValue::Text(s) => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(FormulaError::Value),
        },
    }
}
