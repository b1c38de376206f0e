//! Canonical rendering of formula ASTs.
//!
//! `Display` for [`AstNode`] prints the expression with no whitespace and
//! parentheses only where precedence demands them, so the rendering of a
//! parsed formula need not equal the text it was parsed from:
//! `= (1 + 2) * 3` renders as `(1+2)*3`, while `=(1)+(2)` renders as `1+2`.

use std::fmt::{self, Display};

use crate::parser::{AstNode, BinaryOp, ATOM_PRECEDENCE, UNARY_PRECEDENCE};

fn precedence(node: &AstNode) -> u8 {
    match node {
        AstNode::Number(_) | AstNode::Reference(_) => ATOM_PRECEDENCE,
        AstNode::Unary { .. } => UNARY_PRECEDENCE,
        AstNode::Binary { op, .. } => op.precedence(),
    }
}

fn write_node(node: &AstNode, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match node {
        AstNode::Number(n) => write!(f, "{n}"),
        AstNode::Reference(pos) => write!(f, "{pos}"),
        AstNode::Unary { op, operand } => {
            f.write_fmt(format_args!("{}", op.symbol()))?;
            write_child(operand, UNARY_PRECEDENCE, false, f)
        }
        AstNode::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            write_child(lhs, prec, false, f)?;
            f.write_fmt(format_args!("{}", op.symbol()))?;
            // `-` and `/` do not associate: a-(b-c) keeps its parentheses.
            let guard_equal = matches!(op, BinaryOp::Sub | BinaryOp::Div);
            write_child(rhs, prec, guard_equal, f)
        }
    }
}

fn write_child(
    child: &AstNode,
    parent_precedence: u8,
    parenthesize_equal: bool,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let child_precedence = precedence(child);
    let needs_parens = child_precedence < parent_precedence
        || (parenthesize_equal && child_precedence == parent_precedence);
    if needs_parens {
        f.write_str("(")?;
        write_node(child, f)?;
        f.write_str(")")
    } else {
        write_node(child, f)
    }
}

impl Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(self, f)
    }
}
