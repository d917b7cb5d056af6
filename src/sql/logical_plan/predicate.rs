use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::ops::ControlFlow;

use sqlparser::ast::{BinaryOperator, Expr, visit_expressions};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{Error, Result};
use crate::sql::logical_plan::attribute_alias;

/// A filter expression together with the attributes it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    expr: Expr,
    attrs: Vec<String>,
}

impl Predicate {
    pub fn new(expr: Expr) -> Self {
        let attrs = referenced_attributes(&expr);
        Self { expr, attrs }
    }

    /// Parses a standalone expression such as `a.x > 5`.
    pub fn parse(text: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let expr = Parser::new(&dialect)
            .try_with_sql(text)
            .and_then(|mut parser| parser.parse_expr())
            .map_err(|error| Error::SqlToAstConversion(error.to_string()))?;

        Ok(Self::new(expr))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn attrs(&self) -> &[String] {
        &self.attrs
    }

    /// Canonical text of the predicate, used for equality checks across the tree.
    pub fn text(&self) -> String {
        self.expr.to_string()
    }

    pub fn is_conjunction(&self) -> bool {
        matches!(
            strip_nesting(&self.expr),
            Expr::BinaryOp {
                op: BinaryOperator::And,
                ..
            }
        )
    }

    /// Splits a top-level `AND` into its operands, left to right.
    pub fn conjuncts(self) -> Vec<Predicate> {
        let mut exprs = Vec::new();
        split_conjunction(self.expr, &mut exprs);
        exprs.into_iter().map(Self::new).collect()
    }

    /// Aliases touched by the predicate.
    ///
    /// `None` when an attribute has no alias qualifier or when nothing is referenced, i.e. the
    /// predicate cannot be attributed to one side of a join.
    pub fn involved_aliases(&self) -> Option<BTreeSet<String>> {
        if self.attrs.is_empty() {
            return None;
        }

        self.attrs
            .iter()
            .map(|attr| attribute_alias(attr).map(str::to_string))
            .collect()
    }

    /// Returns both operands of `alias1.col1 = alias2.col2`.
    pub fn as_equi_join(&self) -> Option<(String, String)> {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = strip_nesting(&self.expr)
        else {
            return None;
        };

        Some((qualified_column(left)?, qualified_column(right)?))
    }

    /// Whether any function call in the predicate is one of `aggregate_functions`.
    pub fn references_aggregate(&self, aggregate_functions: &[String]) -> bool {
        contains_aggregate(&self.expr, aggregate_functions)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// Joins predicates with `AND`, keeping their order.
///
/// Operands that bind looser than `AND` are parenthesized so the text reads back the same.
pub fn conjunction(predicates: Vec<Predicate>) -> Option<Predicate> {
    predicates
        .into_iter()
        .map(|predicate| predicate.expr)
        .reduce(|result, expr| Expr::BinaryOp {
            left: Box::new(conjunct_operand(result)),
            op: BinaryOperator::And,
            right: Box::new(conjunct_operand(expr)),
        })
        .map(Predicate::new)
}

/// Attributes mentioned anywhere in `expr`, first occurrence first.
///
/// `alias.col` keeps its qualifier, longer paths such as `db.t.col` are cut to their last two
/// parts.
pub fn referenced_attributes(expr: &Expr) -> Vec<String> {
    let mut attrs: Vec<String> = Vec::new();

    let ControlFlow::Continue(()) = visit_expressions(expr, |expr| {
        let attr = match expr {
            Expr::Identifier(ident) => Some(ident.value.clone()),
            Expr::CompoundIdentifier(idents) => match idents.as_slice() {
                [] => None,
                [ident] => Some(ident.value.clone()),
                [.., alias, column] => Some(format!("{}.{}", alias.value, column.value)),
            },
            _ => None,
        };

        if let Some(attr) = attr {
            if !attrs.contains(&attr) {
                attrs.push(attr);
            }
        }
        ControlFlow::<Infallible>::Continue(())
    });

    attrs
}

pub fn contains_aggregate(expr: &Expr, aggregate_functions: &[String]) -> bool {
    visit_expressions(expr, |expr| {
        if is_aggregate_call(expr, aggregate_functions) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .is_break()
}

pub fn is_aggregate_call(expr: &Expr, aggregate_functions: &[String]) -> bool {
    let Expr::Function(function) = expr else {
        return false;
    };
    let name = function.name.to_string();

    aggregate_functions
        .iter()
        .any(|aggregate| aggregate.eq_ignore_ascii_case(&name))
}

fn split_conjunction(expr: Expr, exprs: &mut Vec<Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_conjunction(*left, exprs);
            split_conjunction(*right, exprs);
        }
        Expr::Nested(inner)
            if matches!(
                strip_nesting(&inner),
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            ) =>
        {
            split_conjunction(*inner, exprs)
        }
        expr => exprs.push(expr),
    }
}

fn conjunct_operand(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOperator::Or | BinaryOperator::Xor,
            ..
        } => Expr::Nested(Box::new(expr)),
        expr => expr,
    }
}

fn strip_nesting(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => strip_nesting(inner),
        expr => expr,
    }
}

fn qualified_column(expr: &Expr) -> Option<String> {
    let Expr::CompoundIdentifier(idents) = strip_nesting(expr) else {
        return None;
    };

    match idents.as_slice() {
        [.., alias, column] => Some(format!("{}.{}", alias.value, column.value)),
        _ => None,
    }
}
