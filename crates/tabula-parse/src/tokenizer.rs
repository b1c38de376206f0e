//! Byte-dispatch tokenizer for formula expressions.

use std::error::Error;
use std::fmt::{self, Display};

const OPERATORS: &str = "+-*/";

const fn build_operator_table() -> [bool; 256] {
    let mut tbl = [false; 256];
    let bytes = OPERATORS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        tbl[bytes[i] as usize] = true;
        i += 1;
    }
    tbl
}
static OPERATOR_TABLE: [bool; 256] = build_operator_table();

#[inline(always)]
fn is_operator(c: u8) -> bool {
    OPERATOR_TABLE[c as usize]
}

/// A custom error type for the tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError at position {}: {}", self.pos, self.message)
    }
}

impl Error for TokenizerError {}

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    Reference,
    Op,
    OpenParen,
    CloseParen,
}

/// A token in a formula expression, with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub value: String,
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn from_slice(source: &str, kind: TokenKind, start: usize, end: usize) -> Self {
        Token {
            value: source[start..end].to_string(),
            kind,
            start,
            end,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?} value: {}>", self.kind, self.value)
    }
}

/// A tokenizer for formula expressions (the text after the leading `=`).
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    offset: usize,
}

impl Tokenizer {
    /// Create a new tokenizer and immediately tokenize the expression.
    pub fn new(formula: &str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::with_capacity(formula.len() / 2),
            offset: 0,
        };
        tokenizer.tokenize()?;
        Ok(tokenizer)
    }

    #[inline]
    fn current_byte(&self) -> Option<u8> {
        self.formula.as_bytes().get(self.offset).copied()
    }

    #[inline]
    fn bump_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.current_byte().is_some_and(&pred) {
            self.offset += 1;
        }
    }

    fn tokenize(&mut self) -> Result<(), TokenizerError> {
        while let Some(curr_byte) = self.current_byte() {
            match curr_byte {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                }
                b'0'..=b'9' | b'.' => self.scan_number()?,
                b'A'..=b'Z' | b'a'..=b'z' => self.scan_reference()?,
                b'(' => self.push_single(TokenKind::OpenParen),
                b')' => self.push_single(TokenKind::CloseParen),
                c if is_operator(c) => self.push_single(TokenKind::Op),
                c => {
                    return Err(TokenizerError {
                        message: format!("unexpected character '{}'", c as char),
                        pos: self.offset,
                    });
                }
            }
        }
        Ok(())
    }

    fn push_single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.offset += 1;
        self.items
            .push(Token::from_slice(&self.formula, kind, start, self.offset));
    }

    /// Scan a numeric literal, including scientific notation. The `+`/`-`
    /// after an exponent marker belongs to the number, not to the operator
    /// table.
    fn scan_number(&mut self) -> Result<(), TokenizerError> {
        let start = self.offset;
        self.bump_while(|c| c.is_ascii_digit() || c == b'.');

        if self.current_byte().is_some_and(|c| c == b'e' || c == b'E') {
            let mark = self.offset;
            self.offset += 1;
            if self.current_byte().is_some_and(|c| c == b'+' || c == b'-') {
                self.offset += 1;
            }
            if self.current_byte().is_some_and(|c| c.is_ascii_digit()) {
                self.bump_while(|c| c.is_ascii_digit());
            } else {
                // Not an exponent after all; leave the 'e' for the caller,
                // which will reject it as a malformed reference.
                self.offset = mark;
            }
        }

        let text = &self.formula[start..self.offset];
        if text.parse::<f64>().is_err() {
            return Err(TokenizerError {
                message: format!("malformed number '{text}'"),
                pos: start,
            });
        }
        self.items.push(Token::from_slice(
            &self.formula,
            TokenKind::Number,
            start,
            self.offset,
        ));
        Ok(())
    }

    /// Scan a cell reference: column letters followed by a row number.
    fn scan_reference(&mut self) -> Result<(), TokenizerError> {
        let start = self.offset;
        self.bump_while(|c| c.is_ascii_alphabetic());

        if !self.current_byte().is_some_and(|c| c.is_ascii_digit()) {
            return Err(TokenizerError {
                message: format!(
                    "malformed cell reference '{}'",
                    &self.formula[start..self.offset]
                ),
                pos: start,
            });
        }
        self.bump_while(|c| c.is_ascii_digit());

        self.items.push(Token::from_slice(
            &self.formula,
            TokenKind::Reference,
            start,
            self.offset,
        ));
        Ok(())
    }
}
