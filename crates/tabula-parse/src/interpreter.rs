//! AST evaluation against a read-only cell value source.

use tabula_common::{CellValue, FormulaError, Position};

use crate::parser::{AstNode, BinaryOp, UnaryOp};

/// Read-only view of cell values, the only thing evaluation may see.
///
/// The resolver answers for *every* position it is handed: positions outside
/// the sheet's bounds come back as `CellValue::Error(FormulaError::Ref)`,
/// positions with no cell as `CellValue::Empty`.
pub trait ValueResolver {
    fn cell_value(&self, pos: Position) -> CellValue;
}

/// Evaluates an AST against a [`ValueResolver`].
///
/// Evaluation is pure with respect to the resolver: it reads values, never
/// writes. Errors do not abort evaluation at this layer's boundary; they are
/// ordinary `Result` values the caller stores as cell values.
pub struct Interpreter<'a> {
    resolver: &'a dyn ValueResolver,
}

impl<'a> Interpreter<'a> {
    pub fn new(resolver: &'a dyn ValueResolver) -> Self {
        Interpreter { resolver }
    }

    pub fn evaluate(&self, node: &AstNode) -> Result<f64, FormulaError> {
        match node {
            AstNode::Number(n) => Ok(*n),
            AstNode::Reference(pos) => self.operand_value(*pos),
            AstNode::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                Ok(match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Minus => -value,
                })
            }
            AstNode::Binary { op, lhs, rhs } => {
                let lhs = self.evaluate(lhs)?;
                let rhs = self.evaluate(rhs)?;
                self.apply(*op, lhs, rhs)
            }
        }
    }

    fn apply(&self, op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64, FormulaError> {
        let result = match op {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => {
                if rhs == 0.0 {
                    return Err(FormulaError::Div);
                }
                lhs / rhs
            }
        };
        // Overflow to infinity is an arithmetic failure, not a value.
        if result.is_finite() {
            Ok(result)
        } else {
            Err(FormulaError::Div)
        }
    }

    /// Coerce a referenced cell's value to a number.
    fn operand_value(&self, pos: Position) -> Result<f64, FormulaError> {
        match self.resolver.cell_value(pos) {
            CellValue::Empty => Ok(0.0),
            CellValue::Number(n) => Ok(n),
            CellValue::Text(s) => match s.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                _ => Err(FormulaError::Value),
            },
            CellValue::Error(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::HashMap;

    struct MapResolver {
        values: HashMap<Position, CellValue>,
    }

    impl MapResolver {
        fn new(entries: &[(&str, CellValue)]) -> Self {
            MapResolver {
                values: entries
                    .iter()
                    .map(|(a1, v)| (Position::parse_a1(a1).unwrap(), v.clone()))
                    .collect(),
            }
        }
    }

    impl ValueResolver for MapResolver {
        fn cell_value(&self, pos: Position) -> CellValue {
            if !pos.is_valid() {
                return CellValue::Error(FormulaError::Ref);
            }
            self.values.get(&pos).cloned().unwrap_or(CellValue::Empty)
        }
    }

    fn eval(expr: &str, resolver: &MapResolver) -> Result<f64, FormulaError> {
        let ast = parse(expr).unwrap();
        Interpreter::new(resolver).evaluate(&ast)
    }

    #[test]
    fn arithmetic() {
        let empty = MapResolver::new(&[]);
        assert_eq!(eval("1+2*3", &empty), Ok(7.0));
        assert_eq!(eval("(1+2)*3", &empty), Ok(9.0));
        assert_eq!(eval("-3-4", &empty), Ok(-7.0));
        assert_eq!(eval("7/2", &empty), Ok(3.5));
    }

    #[test]
    fn references_resolve_through_the_resolver() {
        let resolver = MapResolver::new(&[
            ("A1", CellValue::Number(2.0)),
            ("B1", CellValue::Text("3.5".into())),
        ]);
        assert_eq!(eval("A1+B1", &resolver), Ok(5.5));
    }

    #[test]
    fn empty_and_missing_cells_coerce_to_zero() {
        let resolver = MapResolver::new(&[("A1", CellValue::Empty)]);
        assert_eq!(eval("A1+5", &resolver), Ok(5.0));
        assert_eq!(eval("Z99+5", &resolver), Ok(5.0));
    }

    #[test]
    fn non_numeric_text_is_a_value_error() {
        let resolver = MapResolver::new(&[
            ("A1", CellValue::Text("pears".into())),
            ("B1", CellValue::Text(" 2".into())),
        ]);
        assert_eq!(eval("A1+1", &resolver), Err(FormulaError::Value));
        // Coercion is strict: no whitespace trimming.
        assert_eq!(eval("B1+1", &resolver), Err(FormulaError::Value));
    }

    #[test]
    fn division_by_zero() {
        let empty = MapResolver::new(&[]);
        assert_eq!(eval("1/0", &empty), Err(FormulaError::Div));
        assert_eq!(eval("0/0", &empty), Err(FormulaError::Div));
        // An empty referenced cell is a zero divisor.
        assert_eq!(eval("1/A1", &empty), Err(FormulaError::Div));
    }

    #[test]
    fn overflow_is_an_arithmetic_error() {
        let empty = MapResolver::new(&[]);
        assert_eq!(eval("1e308*10", &empty), Err(FormulaError::Div));
    }

    #[test]
    fn out_of_bounds_reference_is_a_ref_error() {
        let empty = MapResolver::new(&[]);
        assert_eq!(eval("ZZZ99999+1", &empty), Err(FormulaError::Ref));
    }

    #[test]
    fn input_errors_propagate_unchanged() {
        let resolver = MapResolver::new(&[("A1", CellValue::Error(FormulaError::Div))]);
        assert_eq!(eval("A1+1", &resolver), Err(FormulaError::Div));
    }
}
