use crate::error::{Error, Result};
use crate::sql::logical_plan::{Predicate, conjunction};
use crate::sql::sql_parser::{Aggregate, LogicalPlan};

/// Renders an optimized plan back to a single SELECT statement.
///
/// Expects `Order? -> Project -> Having? -> Group? -> FROM tree`. Every Select in the FROM tree
/// is gathered into one WHERE conjunction, in pre-order.
pub fn sql_from_plan(plan: &LogicalPlan) -> Result<String> {
    plan.check_output_shape()?;

    let (order_by, plan) = match plan {
        LogicalPlan::Order { order_by, plan } => (Some(order_by), plan.as_ref()),
        plan => (None, plan),
    };
    let LogicalPlan::Project { attrs, plan } = plan else {
        return Err(Error::InvalidPlanShape(format!(
            "expected Project, found {}",
            plan.name()
        )));
    };

    let mut plan = plan.as_ref();
    let mut having = None;
    if let LogicalPlan::Having { predicate, plan: inner } = plan {
        having = Some(predicate);
        plan = inner.as_ref();
    }
    let mut group = None;
    if let LogicalPlan::Group {
        group_by,
        aggregates,
        plan: inner,
    } = plan
    {
        group = Some((group_by, aggregates));
        plan = inner.as_ref();
    }

    let mut filters = Vec::new();
    let from = emit_from(plan, &mut filters)?;

    let aggregates = group.map_or(&[][..], |(_, aggregates)| aggregates.as_slice());
    let mut sql = format!("SELECT {}\nFROM {from}", select_list(attrs, aggregates));
    if let Some(filter) = conjunction(filters.into_iter().cloned().collect()) {
        sql.push_str(&format!("\nWHERE {filter}"));
    }
    if let Some((group_by, _)) = group {
        if !group_by.is_empty() {
            sql.push_str(&format!("\nGROUP BY {}", group_by.join(", ")));
        }
    }
    if let Some(having) = having {
        sql.push_str(&format!("\nHAVING {having}"));
    }
    if let Some(order_by) = order_by {
        sql.push_str(&format!("\nORDER BY {}", order_by.join(", ")));
    }
    sql.push(';');

    Ok(sql)
}

fn select_list(attrs: &[String], aggregates: &[Aggregate]) -> String {
    let mut items: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.as_str() != "*")
        .cloned()
        .collect();
    let wildcard = items.len() < attrs.len() || attrs.is_empty();

    items.extend(aggregates.iter().map(|aggregate| {
        let expr = aggregate.expr.to_string();
        if expr == aggregate.alias {
            expr
        } else {
            format!("{expr} AS {}", aggregate.alias)
        }
    }));

    if items.is_empty() || (wildcard && aggregates.is_empty()) {
        "*".to_string()
    } else {
        items.join(", ")
    }
}

fn emit_from<'a>(plan: &'a LogicalPlan, filters: &mut Vec<&'a Predicate>) -> Result<String> {
    match plan {
        LogicalPlan::Scan { relation, alias } if relation == alias => Ok(relation.clone()),
        LogicalPlan::Scan { relation, alias } => Ok(format!("{relation} {alias}")),
        LogicalPlan::Select { predicate, plan } => {
            filters.push(predicate);
            emit_from(plan, filters)
        }
        LogicalPlan::Project { plan, .. } if matches!(plan.as_ref(), LogicalPlan::Scan { .. }) => {
            emit_from(plan, filters)
        }
        LogicalPlan::Join {
            on: Some(on),
            left,
            right,
            ..
        } => {
            let left = emit_from(left, filters)?;
            let right = emit_join_operand(right, filters)?;
            Ok(format!("{left} JOIN {right} ON {on}"))
        }
        LogicalPlan::Join { left, right, .. } | LogicalPlan::Cross { left, right } => {
            let left = emit_from(left, filters)?;
            let right = emit_join_operand(right, filters)?;
            Ok(format!("{left} CROSS JOIN {right}"))
        }
        plan => Err(Error::InvalidPlanShape(format!(
            "{} cannot appear in FROM",
            plan.name()
        ))),
    }
}

/// Right operands that are joins themselves need parentheses.
fn emit_join_operand<'a>(
    plan: &'a LogicalPlan,
    filters: &mut Vec<&'a Predicate>,
) -> Result<String> {
    let from = emit_from(plan, filters)?;
    if contains_join(plan) {
        Ok(format!("({from})"))
    } else {
        Ok(from)
    }
}

fn contains_join(plan: &LogicalPlan) -> bool {
    match plan {
        LogicalPlan::Select { plan, .. } => contains_join(plan),
        plan => plan.is_join(),
    }
}
