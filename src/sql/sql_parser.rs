use sqlparser::ast::{Expr, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::config::DEFAULT_AGGREGATE_FUNCTIONS;
use crate::error::{Error, Result};
use crate::sql::logical_plan::Predicate;

/// Canonical relational algebra.
///
/// A tree produced by [`LogicalPlan::parse_sql`] has the shape
/// `Order? -> Project -> Having? -> Group? -> Select* -> Cross chain of Scans`.
/// Attribute names are `col` or `alias.col`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalPlan {
    Scan {
        relation: String,
        alias: String,
    },
    Select {
        predicate: Predicate,
        plan: Box<LogicalPlan>,
    },
    /// Empty `attrs` or a `*` entry means every column.
    Project {
        attrs: Vec<String>,
        plan: Box<LogicalPlan>,
    },
    /// `left_keys[i]` is joined with `right_keys[i]`.
    Join {
        on: Option<Predicate>,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Cross {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Group {
        group_by: Vec<String>,
        aggregates: Vec<Aggregate>,
        plan: Box<LogicalPlan>,
    },
    Having {
        predicate: Predicate,
        plan: Box<LogicalPlan>,
    },
    Order {
        order_by: Vec<String>,
        plan: Box<LogicalPlan>,
    },
}

/// One aggregate output column of a `Group`, e.g. `total` -> `SUM(o.amount)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub alias: String,
    pub expr: Expr,
}

impl TryFrom<&str> for LogicalPlan {
    type Error = Error;

    fn try_from(sql: &str) -> Result<Self> {
        let aggregate_functions: Vec<String> = DEFAULT_AGGREGATE_FUNCTIONS
            .iter()
            .map(|name| name.to_string())
            .collect();

        Self::parse_sql(sql, &aggregate_functions)
    }
}

impl LogicalPlan {
    /// Parses a single SELECT statement into a canonical tree.
    ///
    /// Returns:
    ///   * Ok: canonical `LogicalPlan`.
    ///   * Error when:
    ///     1. Text is not valid SQL: `SqlToAstConversion`.
    ///     2. Text holds no statement: `EmptyStatement`.
    ///     3. Several statements, DML, set operations or VALUES: `UnsupportedQueryShape`.
    ///     4. SELECT without FROM: `MissingFromClause`.
    ///     5. FROM term is not a table or an aliased subquery: `UnsupportedFromTerm`.
    pub fn parse_sql(sql: &str, aggregate_functions: &[String]) -> Result<Self> {
        let dialect = GenericDialect {};
        let ast = Parser::parse_sql(&dialect, sql)
            .map_err(|error| Error::SqlToAstConversion(error.to_string()))?;

        if ast.len() > 1 {
            return Err(Error::UnsupportedQueryShape(format!(
                "expected a single statement, got {}",
                ast.len()
            )));
        }
        let statement = ast.first().ok_or(Error::EmptyStatement)?;

        match statement {
            Statement::Query(query) => Self::from_query_body(&query.body, query, aggregate_functions),
            _ => Err(Error::UnsupportedQueryShape(statement.to_string())),
        }
    }

    fn from_query_body(
        body: &SetExpr,
        query: &sqlparser::ast::Query,
        aggregate_functions: &[String],
    ) -> Result<Self> {
        if query.with.is_some() {
            return Err(Error::UnsupportedQueryShape("WITH clauses".to_string()));
        }
        if query.limit_clause.is_some() || query.fetch.is_some() {
            return Err(Error::UnsupportedQueryShape(
                "LIMIT, OFFSET and FETCH are not supported".to_string(),
            ));
        }

        match body {
            SetExpr::Select(select) => Self::from_select(select, query, aggregate_functions),
            SetExpr::Query(_) if query.order_by.is_some() => Err(Error::UnsupportedQueryShape(
                "ORDER BY around a parenthesized query".to_string(),
            )),
            SetExpr::Query(inner) => {
                Self::from_query_body(&inner.body, inner, aggregate_functions)
            }
            SetExpr::SetOperation { .. } => Err(Error::UnsupportedQueryShape(
                "set operations are not supported".to_string(),
            )),
            other => Err(Error::UnsupportedQueryShape(other.to_string())),
        }
    }
}
