// Formula parser - converts an expression string (the text after the leading
// '=') into an AST. Supports: numbers, cell refs (A1), parentheses, unary +/-
// and the four arithmetic operators with the usual precedence.

use std::fmt;

use crate::error::ParseError;
use crate::position::Position;

use super::ast::{BinaryOp, CellRef, Expr, UnaryOp};

/// Parse an expression into an AST.
///
/// The whole input must be consumed; trailing tokens are an error, as is an
/// empty or all-whitespace expression.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::EmptyExpression);
    }
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos != tokens.len() {
        return Err(ParseError::TrailingInput);
    }
    Ok(expr)
}

#[derive(Debug, Clone)]
enum Token {
    Number(f64),
    Ref(CellRef),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ref(r) => write!(f, "{}", r),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_ascii_whitespace() => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            'A'..='Z' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_uppercase() || ch.is_ascii_digit() {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(cell_ref_token(ident)?);
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Optional exponent: e/E, optional sign, then digits.
                if let Some(&e) = chars.peek() {
                    if e == 'e' || e == 'E' {
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        let mut exp = String::from(e);
                        if let Some(&sign) = lookahead.peek() {
                            if sign == '+' || sign == '-' {
                                exp.push(sign);
                                lookahead.next();
                            }
                        }
                        if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                            chars = lookahead;
                            while let Some(&d) = chars.peek() {
                                if d.is_ascii_digit() {
                                    exp.push(d);
                                    chars.next();
                                } else {
                                    break;
                                }
                            }
                            num_str.push_str(&exp);
                        }
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| ParseError::InvalidNumber(num_str.clone()))?;
                if !num.is_finite() {
                    return Err(ParseError::InvalidNumber(num_str));
                }
                tokens.push(Token::Number(num));
            }
            _ => return Err(ParseError::UnexpectedChar(c)),
        }
    }

    Ok(tokens)
}

/// Classify a `[A-Z0-9]+` lexeme starting with a letter. Letters followed by
/// digits form a cell reference; a reference whose coordinates are not a
/// valid position is kept as-is and resolves to `#REF!` at evaluation time.
fn cell_ref_token(ident: String) -> Result<Token, ParseError> {
    let digits_at = ident
        .bytes()
        .position(|b| b.is_ascii_digit())
        .ok_or_else(|| ParseError::InvalidReference(ident.clone()))?;
    if !ident.bytes().skip(digits_at).all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidReference(ident));
    }
    let cell_ref = match ident.parse::<Position>() {
        Ok(pos) => CellRef::Valid(pos),
        Err(_) => CellRef::OutOfBounds(ident),
    };
    Ok(Token::Ref(cell_ref))
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

// Unary +/- bind tighter than * and / and may stack.
fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    if pos >= tokens.len() {
        return Err(ParseError::UnexpectedEnd);
    }

    let op = match &tokens[pos] {
        Token::Plus => UnaryOp::Plus,
        Token::Minus => UnaryOp::Minus,
        _ => return parse_primary(tokens, pos),
    };
    let (operand, new_pos) = parse_unary(tokens, pos + 1)?;
    Ok((
        Expr::Unary {
            op,
            operand: Box::new(operand),
        },
        new_pos,
    ))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::Ref(cell_ref) => Ok((Expr::Ref(cell_ref.clone()), pos + 1)),
        Token::LParen => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1)?;
            if pos >= tokens.len() {
                return Err(ParseError::UnclosedParen);
            }
            match &tokens[pos] {
                Token::RParen => Ok((expr, pos + 1)),
                _ => Err(ParseError::UnclosedParen),
            }
        }
        token => Err(ParseError::UnexpectedToken(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_to(address: &str) -> Expr {
        Expr::Ref(CellRef::Valid(address.parse().unwrap()))
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(parse("42").unwrap(), Expr::Number(42.0));
        assert_eq!(parse("3.25").unwrap(), Expr::Number(3.25));
        assert_eq!(parse(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse("1e3").unwrap(), Expr::Number(1000.0));
        assert_eq!(parse("2E-2").unwrap(), Expr::Number(0.02));
        assert_eq!(parse("1e+2").unwrap(), Expr::Number(100.0));
    }

    #[test]
    fn test_cell_references() {
        assert_eq!(parse("A1").unwrap(), ref_to("A1"));
        assert_eq!(parse("XFD16384").unwrap(), ref_to("XFD16384"));
        assert_eq!(
            parse("ZZZZ1").unwrap(),
            Expr::Ref(CellRef::OutOfBounds("ZZZZ1".to_string()))
        );
        assert_eq!(
            parse("A0").unwrap(),
            Expr::Ref(CellRef::OutOfBounds("A0".to_string()))
        );
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(parse("1+2*3").unwrap().to_string(), "1+2*3");
        assert_eq!(
            parse("1-2-3").unwrap(),
            Expr::Binary {
                op: BinaryOp::Sub,
                left: Box::new(Expr::Binary {
                    op: BinaryOp::Sub,
                    left: Box::new(Expr::Number(1.0)),
                    right: Box::new(Expr::Number(2.0)),
                }),
                right: Box::new(Expr::Number(3.0)),
            }
        );
    }

    #[test]
    fn test_unary_binds_tighter_than_mul() {
        assert_eq!(
            parse("-2*3").unwrap(),
            Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(Expr::Unary {
                    op: UnaryOp::Minus,
                    operand: Box::new(Expr::Number(2.0)),
                }),
                right: Box::new(Expr::Number(3.0)),
            }
        );
    }

    #[test]
    fn test_whitespace_ignored() {
        assert_eq!(parse(" 1 +\tA1 ").unwrap().to_string(), "1+A1");
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(parse(""), Err(ParseError::EmptyExpression));
        assert_eq!(parse("   "), Err(ParseError::EmptyExpression));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse("1+"), Err(ParseError::UnexpectedEnd));
        assert_eq!(parse("(1+2"), Err(ParseError::UnclosedParen));
        assert_eq!(
            parse("*1"),
            Err(ParseError::UnexpectedToken("*".to_string()))
        );
        assert_eq!(parse("1 2"), Err(ParseError::TrailingInput));
        assert_eq!(parse("1+2)"), Err(ParseError::TrailingInput));
        assert_eq!(parse("a1"), Err(ParseError::UnexpectedChar('a')));
        assert_eq!(parse("1,2"), Err(ParseError::UnexpectedChar(',')));
        assert_eq!(
            parse("ABC"),
            Err(ParseError::InvalidReference("ABC".to_string()))
        );
        assert_eq!(
            parse("A1B"),
            Err(ParseError::InvalidReference("A1B".to_string()))
        );
        assert_eq!(
            parse("1.2.3"),
            Err(ParseError::InvalidNumber("1.2.3".to_string()))
        );
    }

    #[test]
    fn test_overlarge_literal_rejected() {
        assert_eq!(
            parse("1e999"),
            Err(ParseError::InvalidNumber("1e999".to_string()))
        );
    }

    #[test]
    fn test_exponent_needs_digits() {
        // Without following digits the 'E' is not an exponent marker; it
        // lexes as a (malformed) reference instead.
        assert_eq!(
            parse("1E"),
            Err(ParseError::InvalidReference("E".to_string()))
        );
        assert_eq!(parse("1E2"), Ok(Expr::Number(100.0)));
    }
}
