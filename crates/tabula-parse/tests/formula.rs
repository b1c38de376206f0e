//! Integration tests for the parsed-formula surface the evaluation core
//! consumes: parse, canonical rendering, declared references, evaluation.

use std::collections::HashMap;

use tabula_parse::{
    parse_formula, CellValue, FormulaError, Position, ValueResolver,
};

#[derive(Default)]
struct FixedValues(HashMap<Position, CellValue>);

impl FixedValues {
    fn with(mut self, a1: &str, value: CellValue) -> Self {
        self.0.insert(Position::parse_a1(a1).unwrap(), value);
        self
    }
}

impl ValueResolver for FixedValues {
    fn cell_value(&self, pos: Position) -> CellValue {
        if !pos.is_valid() {
            return CellValue::Error(FormulaError::Ref);
        }
        self.0.get(&pos).cloned().unwrap_or(CellValue::Empty)
    }
}

#[test]
fn expression_is_canonical_not_verbatim() {
    let formula = parse_formula(" ( A1 +  2 ) * 3 ").unwrap();
    assert_eq!(formula.expression(), "(A1+2)*3");

    let formula = parse_formula("((B2))").unwrap();
    assert_eq!(formula.expression(), "B2");
}

#[test]
fn referenced_cells_are_ordered_and_stable() {
    let formula = parse_formula("C1+A1*C1-B1").unwrap();
    let expected = [
        Position::parse_a1("C1").unwrap(),
        Position::parse_a1("A1").unwrap(),
        Position::parse_a1("B1").unwrap(),
    ];
    assert_eq!(formula.referenced_cells(), &expected);
    // Stable: a second call sees the identical sequence.
    assert_eq!(formula.referenced_cells(), &expected);
}

#[test]
fn literal_formula_has_no_references() {
    let formula = parse_formula("1+2*3").unwrap();
    assert!(formula.referenced_cells().is_empty());
    assert_eq!(formula.evaluate(&FixedValues::default()), Ok(7.0));
}

#[test]
fn evaluation_reads_through_the_resolver() {
    let values = FixedValues::default()
        .with("A1", CellValue::Text("2".into()))
        .with("B1", CellValue::Number(4.0));
    let formula = parse_formula("A1+B1/2").unwrap();
    assert_eq!(formula.evaluate(&values), Ok(4.0));
}

#[test]
fn parse_errors_carry_a_message() {
    let err = parse_formula("1++").unwrap_err();
    assert!(!err.message.is_empty());

    assert!(parse_formula("").is_err());
    assert!(parse_formula("SUM(A1)").is_err());
    assert!(parse_formula("A1:B2").is_err());
}

#[test]
fn error_values_surface_as_data() {
    let values = FixedValues::default().with("A1", CellValue::Text("x".into()));
    let formula = parse_formula("A1*2").unwrap();
    assert_eq!(formula.evaluate(&values), Err(FormulaError::Value));

    let formula = parse_formula("1/0").unwrap();
    assert_eq!(formula.evaluate(&FixedValues::default()), Err(FormulaError::Div));
}
