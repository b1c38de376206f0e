//! The parsed-formula object the evaluation core installs into cells.

use smallvec::SmallVec;
use tabula_common::{FormulaError, Position};

use crate::interpreter::{Interpreter, ValueResolver};
use crate::parser::{parse, AstNode, ParseError};

/// A parsed formula: the AST plus its declared references.
///
/// Construction is the only fallible step. After that the three operations
/// the core needs are infallible lookups or pure passes over the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: AstNode,
    references: SmallVec<[Position; 4]>,
}

/// Parse a formula expression (the text after the leading `=`).
pub fn parse_formula(expr: &str) -> Result<Formula, ParseError> {
    let ast = parse(expr)?;
    let references = ast.collect_references();
    Ok(Formula { ast, references })
}

impl Formula {
    /// Compute the formula's value against a read-only value source.
    ///
    /// Never mutates anything; errors are data for the caller to store.
    pub fn evaluate(&self, resolver: &dyn ValueResolver) -> Result<f64, FormulaError> {
        Interpreter::new(resolver).evaluate(&self.ast)
    }

    /// Declared cell references in left-to-right order, first occurrence
    /// only. Stable across calls.
    pub fn referenced_cells(&self) -> &[Position] {
        &self.references
    }

    /// The canonical rendering, without the leading `=`.
    pub fn expression(&self) -> String {
        self.ast.to_string()
    }
}
