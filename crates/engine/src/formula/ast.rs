//! Expression tree for cell formulas: evaluation and canonical printing.

use std::fmt;

use crate::error::FormulaError;
use crate::position::Position;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl UnaryOp {
    fn symbol(self) -> char {
        match self {
            UnaryOp::Plus => '+',
            UnaryOp::Minus => '-',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

/// A cell reference as spelled in the formula source.
///
/// A lexeme shaped like a cell address that names no valid position (row 0,
/// out-of-bounds coordinates) still parses; it keeps its spelling for
/// printing and evaluates to `#REF!`.
#[derive(Clone, Debug, PartialEq)]
pub enum CellRef {
    Valid(Position),
    OutOfBounds(String),
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellRef::Valid(pos) => write!(f, "{}", pos),
            CellRef::OutOfBounds(text) => f.write_str(text),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Ref(CellRef),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Evaluate against a resolver for referenced cells.
    ///
    /// Any error returned by `lookup` propagates unchanged. Division by zero
    /// and every other operation leaving the finite `f64` range yield
    /// `FormulaError::Arithmetic`; an out-of-bounds reference yields
    /// `FormulaError::Ref`.
    pub fn evaluate<F>(&self, lookup: &F) -> Result<f64, FormulaError>
    where
        F: Fn(Position) -> Result<f64, FormulaError>,
    {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Ref(CellRef::Valid(pos)) => lookup(*pos),
            Expr::Ref(CellRef::OutOfBounds(_)) => Err(FormulaError::Ref),
            Expr::Unary { op, operand } => {
                let value = operand.evaluate(lookup)?;
                Ok(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Minus => -value,
                })
            }
            Expr::Binary { op, left, right } => {
                let lhs = left.evaluate(lookup)?;
                let rhs = right.evaluate(lookup)?;
                let result = match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                };
                if result.is_finite() {
                    Ok(result)
                } else {
                    Err(FormulaError::Arithmetic)
                }
            }
        }
    }

    /// Valid positions referenced by this expression, in source order.
    /// May contain duplicates.
    pub fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        self.collect_positions(&mut out);
        out
    }

    fn collect_positions(&self, out: &mut Vec<Position>) {
        match self {
            Expr::Number(_) | Expr::Ref(CellRef::OutOfBounds(_)) => {}
            Expr::Ref(CellRef::Valid(pos)) => out.push(*pos),
            Expr::Unary { operand, .. } => operand.collect_positions(out),
            Expr::Binary { left, right, .. } => {
                left.collect_positions(out);
                right.collect_positions(out);
            }
        }
    }

    fn is_add_sub(&self) -> bool {
        matches!(
            self,
            Expr::Binary {
                op: BinaryOp::Add | BinaryOp::Sub,
                ..
            }
        )
    }

    fn is_mul_div(&self) -> bool {
        matches!(
            self,
            Expr::Binary {
                op: BinaryOp::Mul | BinaryOp::Div,
                ..
            }
        )
    }
}

impl fmt::Display for Expr {
    /// Canonical form: infix with no spaces, parentheses only where dropping
    /// them would regroup the expression.
    ///
    /// Per parent operator: `+` never parenthesizes a child; `-` wraps a
    /// right child that is itself `+`/`-`; `*` wraps `+`/`-` children on
    /// either side; `/` additionally wraps a right child that is `*` or `/`;
    /// a unary operator wraps a `+`/`-` child.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Ref(cell_ref) => write!(f, "{}", cell_ref),
            Expr::Unary { op, operand } => {
                write!(f, "{}", op.symbol())?;
                write_operand(f, operand, operand.is_add_sub())
            }
            Expr::Binary { op, left, right } => {
                let (wrap_left, wrap_right) = match op {
                    BinaryOp::Add => (false, false),
                    BinaryOp::Sub => (false, right.is_add_sub()),
                    BinaryOp::Mul => (left.is_add_sub(), right.is_add_sub()),
                    BinaryOp::Div => (
                        left.is_add_sub(),
                        right.is_add_sub() || right.is_mul_div(),
                    ),
                };
                write_operand(f, left, wrap_left)?;
                write!(f, "{}", op.symbol())?;
                write_operand(f, right, wrap_right)
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}
