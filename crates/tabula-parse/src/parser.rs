//! Precedence-climbing parser producing the formula AST.

use std::error::Error;
use std::fmt::{self, Display};

use smallvec::SmallVec;
use tabula_common::Position;

use crate::tokenizer::{Token, TokenKind, Tokenizer, TokenizerError};

/// Precedence of a unary operator; binds tighter than any binary operator.
pub(crate) const UNARY_PRECEDENCE: u8 = 3;
/// Precedence of an atom (literal, reference, parenthesized group).
pub(crate) const ATOM_PRECEDENCE: u8 = 4;

/// A custom error type for the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: Option<usize>,
}

impl ParseError {
    fn at(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position: Some(position),
        }
    }

    fn eof(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            position: None,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParseError at position {}: {}", pos, self.message)
        } else {
            write!(f, "ParseError: {}", self.message)
        }
    }
}

impl Error for ParseError {}

impl From<TokenizerError> for ParseError {
    fn from(err: TokenizerError) -> Self {
        ParseError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl UnaryOp {
    pub const fn symbol(self) -> char {
        match self {
            UnaryOp::Plus => '+',
            UnaryOp::Minus => '-',
        }
    }
}

/// Binary operators, all left-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub const fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }

    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(BinaryOp::Add),
            "-" => Some(BinaryOp::Sub),
            "*" => Some(BinaryOp::Mul),
            "/" => Some(BinaryOp::Div),
            _ => None,
        }
    }
}

/// A node of the formula AST.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Number(f64),
    Reference(Position),
    Unary {
        op: UnaryOp,
        operand: Box<AstNode>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<AstNode>,
        rhs: Box<AstNode>,
    },
}

impl AstNode {
    /// Declared cell references in left-to-right order, first occurrence
    /// only. The order is a property of the AST and therefore stable.
    pub fn collect_references(&self) -> SmallVec<[Position; 4]> {
        let mut out = SmallVec::new();
        self.walk_references(&mut out);
        out
    }

    fn walk_references(&self, out: &mut SmallVec<[Position; 4]>) {
        match self {
            AstNode::Number(_) => {}
            AstNode::Reference(pos) => {
                if !out.contains(pos) {
                    out.push(*pos);
                }
            }
            AstNode::Unary { operand, .. } => operand.walk_references(out),
            AstNode::Binary { lhs, rhs, .. } => {
                lhs.walk_references(out);
                rhs.walk_references(out);
            }
        }
    }
}

/// Parse a formula expression (the text after the leading `=`).
pub fn parse(expr: &str) -> Result<AstNode, ParseError> {
    let tokens = Tokenizer::new(expr)?.items;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.expression(0)?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::at(
            format!("unexpected token '{}'", token.value),
            token.start,
        ));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self, min_precedence: u8) -> Result<AstNode, ParseError> {
        let mut lhs = self.operand()?;

        while let Some(op) = self.peek_binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            // Left-associative: the right side only takes tighter operators.
            let rhs = self.expression(precedence + 1)?;
            lhs = AstNode::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        let token = self.peek()?;
        if token.kind != TokenKind::Op {
            return None;
        }
        BinaryOp::from_symbol(&token.value)
    }

    fn operand(&mut self) -> Result<AstNode, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::eof("unexpected end of expression"));
        };
        let (kind, value, start) = (token.kind, token.value.clone(), token.start);

        match kind {
            TokenKind::Number => {
                // The tokenizer already validated the literal.
                let n = value
                    .parse::<f64>()
                    .map_err(|_| ParseError::at(format!("malformed number '{value}'"), start))?;
                Ok(AstNode::Number(n))
            }
            TokenKind::Reference => {
                let pos = Position::parse_a1(&value).ok_or_else(|| {
                    ParseError::at(format!("invalid cell reference '{value}'"), start)
                })?;
                Ok(AstNode::Reference(pos))
            }
            TokenKind::Op => {
                let op = match value.as_str() {
                    "+" => UnaryOp::Plus,
                    "-" => UnaryOp::Minus,
                    other => {
                        return Err(ParseError::at(format!("unexpected operator '{other}'"), start))
                    }
                };
                let operand = self.expression(UNARY_PRECEDENCE)?;
                Ok(AstNode::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            TokenKind::OpenParen => {
                let inner = self.expression(0)?;
                match self.advance() {
                    Some(token) if token.kind == TokenKind::CloseParen => Ok(inner),
                    Some(token) => Err(ParseError::at(
                        format!("expected ')', found '{}'", token.value),
                        token.start,
                    )),
                    None => Err(ParseError::eof("unbalanced parenthesis")),
                }
            }
            TokenKind::CloseParen => Err(ParseError::at("unexpected ')'", start)),
        }
    }
}
