//! Error types: evaluation failure values, formula syntax errors, and the
//! errors surfaced by sheet operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::Position;

/// Evaluation failure category.
///
/// Not an error at the sheet boundary: a `FormulaError` is a first-class cell
/// *value*. It is produced by evaluating a formula and propagates upward when
/// another formula reads a cell holding one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum FormulaError {
    /// Reference to a cell address outside the sheet bounds.
    #[error("#REF!")]
    Ref,
    /// A referenced cell holds text that is not a number.
    #[error("#VALUE!")]
    Value,
    /// Division by zero, or an operation leaving the finite `f64` range.
    #[error("#ARITHM!")]
    Arithmetic,
}

/// A formula expression that fails to parse.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty formula expression")]
    EmptyExpression,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
    #[error("malformed cell reference {0:?}")]
    InvalidReference(String),
    #[error("missing closing parenthesis")]
    UnclosedParen,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("trailing input after expression")]
    TrailingInput,
}

/// Errors raised by `Sheet` operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SheetError {
    /// A position argument fails bounds validation.
    #[error("position out of bounds: row {}, col {}", .0.row, .0.col)]
    InvalidPosition(Position),
    /// Cell text starting with `=` that does not parse as a formula.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The edit would introduce a cycle in the reference graph. The sheet is
    /// left as it was before the call.
    #[error("circular dependency through {0}")]
    CircularDependency(Position),
}
