//! Errors raised by the public sheet operations.
//!
//! These are the call-aborting failures; formula *evaluation* errors are
//! never raised, they travel inside `CellValue::Error`.

use std::error::Error;
use std::fmt::{self, Display};

use tabula_common::Position;
use tabula_parse::ParseError;

/// Why a sheet operation was rejected.
///
/// Every variant is transparent to state: the sheet and all cells are
/// unchanged from the pre-call state when one of these comes back.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetError {
    /// The position is outside the sheet's bounds.
    InvalidPosition(Position),
    /// Installing the formula would close a dependency cycle.
    CircularDependency(Position),
    /// The formula text did not parse.
    Parse(ParseError),
}

impl Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::InvalidPosition(pos) => {
                write!(f, "position ({}, {}) is outside the sheet", pos.row, pos.col)
            }
            SheetError::CircularDependency(pos) => {
                write!(f, "formula at {pos} would create a circular dependency")
            }
            SheetError::Parse(err) => write!(f, "formula does not parse: {err}"),
        }
    }
}

impl Error for SheetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SheetError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for SheetError {
    fn from(err: ParseError) -> Self {
        SheetError::Parse(err)
    }
}
