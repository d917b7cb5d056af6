use std::cmp::Reverse;
use std::collections::BTreeSet;

use log::debug;

use crate::sql::logical_plan::{Predicate, attribute_alias, conjunction};
use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::LogicalPlan;

/// Puts the most filtered inputs of every join chain first.
///
/// A chain is a maximal run of `Join`/`Cross` nodes; anything else below it is a factor. Factors
/// are stable-sorted by the number of Selects they contain, descending, and rebuilt as a
/// left-deep chain. Join conditions of the old chain are attached to the first new join that
/// sees all their aliases; the rest are kept as Selects above the chain.
pub struct ReorderJoins;

impl OptimizationRule for ReorderJoins {
    fn name(&self) -> &'static str {
        "ReorderJoins"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        self.transform(plan)
    }
}

impl ReorderJoins {
    fn transform(&self, plan: LogicalPlan) -> LogicalPlan {
        if !plan.is_join() {
            return plan.map_inputs(|input| self.transform(input));
        }

        let mut conditions = Vec::new();
        let (head, tail) = flatten_chain(plan, &mut conditions);

        // nested chains are reordered before they are ranked here
        let head = self.ranked(head);
        let mut tail: Vec<(usize, LogicalPlan)> =
            tail.into_iter().map(|factor| self.ranked(factor)).collect();
        tail.sort_by_key(|(score, _)| Reverse(*score));

        // a stable sort keeps the leftmost factor ahead of every factor it is not outranked by
        let outranking = tail.partition_point(|(score, _)| *score > head.0);
        let (first, rest) = if outranking == 0 {
            (head, tail)
        } else {
            let first = tail.remove(0);
            tail.insert(outranking - 1, head);
            (first, tail)
        };

        debug!(
            "Join order: {:?}",
            std::iter::once(&first)
                .chain(&rest)
                .map(|(score, factor)| (factor.aliases(), *score))
                .collect::<Vec<_>>()
        );

        rebuild(first.1, rest.into_iter().map(|(_, factor)| factor), conditions)
    }

    fn ranked(&self, factor: LogicalPlan) -> (usize, LogicalPlan) {
        let factor = self.transform(factor);
        (count_selections(&factor), factor)
    }
}

/// Splits a chain into its leftmost factor and the remaining factors, left to right, collecting
/// the conjuncts of every join condition on the way.
fn flatten_chain(
    plan: LogicalPlan,
    conditions: &mut Vec<Predicate>,
) -> (LogicalPlan, Vec<LogicalPlan>) {
    let (left, right, on) = match plan {
        LogicalPlan::Join {
            on, left, right, ..
        } => (left, right, on),
        LogicalPlan::Cross { left, right } => (left, right, None),
        factor => return (factor, Vec::new()),
    };

    let (head, mut tail) = flatten_chain(*left, conditions);
    let (right_head, right_tail) = flatten_chain(*right, conditions);
    tail.push(right_head);
    tail.extend(right_tail);
    if let Some(on) = on {
        conditions.extend(on.conjuncts());
    }

    (head, tail)
}

fn count_selections(plan: &LogicalPlan) -> usize {
    let own = usize::from(matches!(plan, LogicalPlan::Select { .. }));
    own + plan.inputs().into_iter().map(count_selections).sum::<usize>()
}

fn rebuild<I>(first: LogicalPlan, factors: I, mut conditions: Vec<Predicate>) -> LogicalPlan
where
    I: IntoIterator<Item = LogicalPlan>,
{
    let mut plan = first;
    let mut covered = plan.aliases();

    for factor in factors {
        let right_aliases = factor.aliases();
        covered.extend(right_aliases.iter().cloned());

        let (attached, rest): (Vec<Predicate>, Vec<Predicate>) =
            conditions.into_iter().partition(|condition| {
                condition
                    .involved_aliases()
                    .is_some_and(|involved| involved.is_subset(&covered))
            });
        conditions = rest;

        let mut left_keys = Vec::new();
        let mut right_keys = Vec::new();
        for condition in &attached {
            if let Some((left_key, right_key)) = oriented_keys(condition, &right_aliases) {
                left_keys.push(left_key);
                right_keys.push(right_key);
            }
        }

        plan = match conjunction(attached) {
            Some(on) => LogicalPlan::Join {
                on: Some(on),
                left_keys,
                right_keys,
                left: Box::new(plan),
                right: Box::new(factor),
            },
            None => LogicalPlan::join(plan, factor),
        };
    }

    for condition in conditions {
        debug!("Keeping join condition {condition} above the chain");
        plan = LogicalPlan::select(condition, plan);
    }
    plan
}

/// Equi-join keys as (already joined side, newly joined side).
fn oriented_keys(
    condition: &Predicate,
    right_aliases: &BTreeSet<String>,
) -> Option<(String, String)> {
    let (first, second) = condition.as_equi_join()?;
    let first_right = right_aliases.contains(attribute_alias(&first)?);
    let second_right = right_aliases.contains(attribute_alias(&second)?);

    match (first_right, second_right) {
        (false, true) => Some((first, second)),
        (true, false) => Some((second, first)),
        _ => None,
    }
}
