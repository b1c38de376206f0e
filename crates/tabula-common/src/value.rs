//! The value a cell presents to readers, and formula error codes.

use std::fmt::{self, Display};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error codes a formula evaluation can surface.
///
/// Names are CamelCase (idiomatic Rust) while `Display` renders the
/// canonical spreadsheet spellings (`#REF!`, …).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaError {
    /// Reference to an invalid position.
    Ref,
    /// Non-numeric operand.
    Value,
    /// Division by zero or a non-finite arithmetic result.
    Div,
}

impl FormulaError {
    /// The canonical spelling for the error (including punctuation).
    pub const fn as_str(self) -> &'static str {
        match self {
            FormulaError::Ref => "#REF!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Div => "#DIV/0!",
        }
    }
}

impl Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormulaError {
    type Err = ParseFormulaErrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "#REF!" => Ok(FormulaError::Ref),
            "#VALUE!" => Ok(FormulaError::Value),
            "#DIV/0!" => Ok(FormulaError::Div),
            _ => Err(ParseFormulaErrorError),
        }
    }
}

/// Failed to parse a [`FormulaError`] from its canonical spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseFormulaErrorError;

impl Display for ParseFormulaErrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid formula error code")
    }
}

impl std::error::Error for ParseFormulaErrorError {}

/// What a cell is worth to a reader.
///
/// This is distinct from what the cell *stores*: a formula cell stores an
/// expression but is worth a number (or an error), and a text cell worth is
/// its text with the leading escape stripped.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Error(e) => e.fmt(f),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<FormulaError> for CellValue {
    fn from(e: FormulaError) -> Self {
        CellValue::Error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_spellings_round_trip() {
        for kind in [FormulaError::Ref, FormulaError::Value, FormulaError::Div] {
            assert_eq!(kind.as_str().parse::<FormulaError>(), Ok(kind));
        }
        assert_eq!("#div/0!".parse::<FormulaError>(), Ok(FormulaError::Div));
        assert!("#NAME?".parse::<FormulaError>().is_err());
    }

    #[test]
    fn display_matches_sink_expectations() {
        assert_eq!(CellValue::Empty.to_string(), "");
        assert_eq!(CellValue::Text("hi".into()).to_string(), "hi");
        assert_eq!(CellValue::Number(5.0).to_string(), "5");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(
            CellValue::Error(FormulaError::Div).to_string(),
            "#DIV/0!"
        );
    }
}
