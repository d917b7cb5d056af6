use sqlparser::ast::{
    Expr, GroupByExpr, Join, JoinConstraint, JoinOperator, ObjectNamePart, OrderByKind, Query,
    Select, SelectItem, TableFactor,
};

use crate::error::{Error, Result};
use crate::sql::logical_plan::{Predicate, is_aggregate_call, referenced_attributes};
use crate::sql::sql_parser::{Aggregate, LogicalPlan};

impl LogicalPlan {
    /// Builds the canonical tree of one SELECT block.
    ///
    /// FROM items become a left-leaning Cross chain, WHERE conjuncts a chain of Selects with
    /// JOIN ... ON conditions stacked above them, then Group, Having, Project and Order.
    pub(crate) fn from_select(
        select: &Select,
        query: &Query,
        aggregate_functions: &[String],
    ) -> Result<Self> {
        if select.distinct.is_some() || select.top.is_some() {
            return Err(Error::UnsupportedQueryShape(
                "DISTINCT and TOP are not supported".to_string(),
            ));
        }

        let mut relations = Vec::new();
        let mut join_predicates = Vec::new();

        for table_with_joins in &select.from {
            relations.push(Self::scan_of(&table_with_joins.relation)?);
            for join in &table_with_joins.joins {
                relations.push(Self::scan_of(&join.relation)?);
                if let Some(predicate) = join_predicate(join)? {
                    join_predicates.push(predicate);
                }
            }
        }

        let mut relations = relations.into_iter();
        let first = relations.next().ok_or(Error::MissingFromClause)?;
        let mut plan = relations.fold(first, LogicalPlan::cross);

        if let Some(selection) = &select.selection {
            for predicate in Predicate::new(selection.clone()).conjuncts() {
                plan = LogicalPlan::select(predicate, plan);
            }
        }
        for predicate in join_predicates {
            plan = LogicalPlan::select(predicate, plan);
        }

        let mut attrs = Vec::new();
        let mut aggregates = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) if is_aggregate_call(expr, aggregate_functions) => {
                    aggregates.push(Aggregate {
                        alias: expr.to_string(),
                        expr: expr.clone(),
                    });
                }
                SelectItem::ExprWithAlias { expr, alias }
                    if is_aggregate_call(expr, aggregate_functions) =>
                {
                    aggregates.push(Aggregate {
                        alias: alias.value.clone(),
                        expr: expr.clone(),
                    });
                }
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    attrs.extend(attributes_or_text(expr));
                }
                SelectItem::Wildcard(_) => attrs.push("*".to_string()),
                SelectItem::QualifiedWildcard(..) => attrs.push(item.to_string()),
            }
        }

        let group_by: Vec<String> = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => {
                exprs.iter().flat_map(attributes_or_text).collect()
            }
            GroupByExpr::All(_) => {
                return Err(Error::UnsupportedExpression("GROUP BY ALL".to_string()));
            }
        };

        if !group_by.is_empty() || !aggregates.is_empty() {
            plan = LogicalPlan::group(group_by, aggregates, plan);
            if let Some(having) = &select.having {
                plan = LogicalPlan::having(Predicate::new(having.clone()), plan);
            }
        } else if select.having.is_some() {
            return Err(Error::UnsupportedQueryShape(
                "HAVING without GROUP BY or aggregates".to_string(),
            ));
        }

        plan = LogicalPlan::project(attrs, plan);

        let order_by: Vec<String> = match query.order_by.as_ref().map(|order_by| &order_by.kind) {
            None => Vec::new(),
            Some(OrderByKind::Expressions(exprs)) => {
                let mut order_by = Vec::new();
                for order_by_expr in exprs {
                    // only the default ascending order survives emission
                    let options = &order_by_expr.options;
                    if options.asc == Some(false)
                        || options.nulls_first.is_some()
                        || order_by_expr.with_fill.is_some()
                    {
                        return Err(Error::UnsupportedExpression(order_by_expr.to_string()));
                    }
                    order_by.extend(attributes_or_text(&order_by_expr.expr));
                }
                order_by
            }
            Some(OrderByKind::All(_)) => {
                return Err(Error::UnsupportedExpression("ORDER BY ALL".to_string()));
            }
        };
        if !order_by.is_empty() {
            plan = LogicalPlan::order(order_by, plan);
        }

        Ok(plan)
    }

    /// Base tables and aliased derived tables become scans.
    fn scan_of(relation: &TableFactor) -> Result<Self> {
        match relation {
            TableFactor::Table { name, alias, .. } => {
                let default_alias = match name.0.last() {
                    Some(ObjectNamePart::Identifier(ident)) => ident.value.clone(),
                    _ => name.to_string(),
                };
                let alias = alias
                    .as_ref()
                    .map_or(default_alias, |alias| alias.name.value.clone());

                Ok(Self::Scan {
                    relation: name.to_string(),
                    alias,
                })
            }
            TableFactor::Derived {
                alias: Some(alias), ..
            } => Ok(Self::scan(alias.name.value.clone(), None)),
            other => Err(Error::UnsupportedFromTerm(other.to_string())),
        }
    }
}

fn join_predicate(join: &Join) -> Result<Option<Predicate>> {
    let constraint = match &join.join_operator {
        JoinOperator::Join(constraint) | JoinOperator::Inner(constraint) => constraint,
        JoinOperator::CrossJoin { .. } => return Ok(None),
        _ => return Err(Error::UnsupportedFromTerm(join.to_string())),
    };

    match constraint {
        JoinConstraint::On(expr) => Ok(Some(Predicate::new(expr.clone()))),
        JoinConstraint::None => Ok(None),
        _ => Err(Error::UnsupportedFromTerm(join.to_string())),
    }
}

/// Columns referenced by `expr`, or its text when it references none (e.g. a literal).
fn attributes_or_text(expr: &Expr) -> Vec<String> {
    let attrs = referenced_attributes(expr);
    if attrs.is_empty() {
        vec![expr.to_string()]
    } else {
        attrs
    }
}
