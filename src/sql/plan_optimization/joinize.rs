use log::debug;

use crate::sql::logical_plan::{Predicate, attribute_alias};
use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::LogicalPlan;

/// Turns `Select(l.k = r.k)` directly above a `Cross` into an equi-`Join`.
pub struct Joinize;

impl OptimizationRule for Joinize {
    fn name(&self) -> &'static str {
        "Joinize"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        self.transform(plan)
    }
}

impl Joinize {
    fn transform(&self, plan: LogicalPlan) -> LogicalPlan {
        match plan.map_inputs(|input| self.transform(input)) {
            LogicalPlan::Select { predicate, plan } => match *plan {
                LogicalPlan::Cross { left, right } => {
                    match join_keys(&predicate, &left, &right) {
                        Some((left_key, right_key)) => {
                            debug!("Converting cross product with {predicate} into join");
                            LogicalPlan::join_on(predicate, left_key, right_key, *left, *right)
                        }
                        None => LogicalPlan::select(predicate, LogicalPlan::Cross { left, right }),
                    }
                }
                plan => LogicalPlan::select(predicate, plan),
            },
            plan => plan,
        }
    }
}

/// Equi-join keys oriented as (left side, right side), if the predicate joins the two inputs.
pub(super) fn join_keys(
    predicate: &Predicate,
    left: &LogicalPlan,
    right: &LogicalPlan,
) -> Option<(String, String)> {
    let (first, second) = predicate.as_equi_join()?;
    let left_aliases = left.aliases();
    let right_aliases = right.aliases();

    let first_alias = attribute_alias(&first)?;
    let second_alias = attribute_alias(&second)?;

    if left_aliases.contains(first_alias) && right_aliases.contains(second_alias) {
        Some((first, second))
    } else if left_aliases.contains(second_alias) && right_aliases.contains(first_alias) {
        Some((second, first))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn predicate(text: &str) -> Predicate {
        Predicate::parse(text).unwrap()
    }

    fn scan(alias: &str) -> LogicalPlan {
        LogicalPlan::scan(alias.to_uppercase(), Some(alias.to_string()))
    }

    #[test]
    fn test_equality_becomes_join() {
        // Select: a.id = b.aid
        //   Cross
        //     Scan: A AS a
        //     Scan: B AS b
        //
        // INTO
        //
        // Join: ON a.id = b.aid keys [a.id] = [b.aid]
        //   Scan: A AS a
        //   Scan: B AS b
        let plan = LogicalPlan::select(
            predicate("a.id = b.aid"),
            LogicalPlan::cross(scan("a"), scan("b")),
        );

        let expected = LogicalPlan::join_on(
            predicate("a.id = b.aid"),
            "a.id".to_string(),
            "b.aid".to_string(),
            scan("a"),
            scan("b"),
        );

        assert_eq!(Joinize.apply(plan), expected);
    }

    #[test]
    fn test_reversed_operands_are_oriented() {
        let plan = LogicalPlan::select(
            predicate("b.aid = a.id"),
            LogicalPlan::cross(scan("a"), scan("b")),
        );

        let LogicalPlan::Join {
            left_keys,
            right_keys,
            ..
        } = Joinize.apply(plan)
        else {
            panic!("expected a join");
        };
        assert_eq!(left_keys, vec!["a.id".to_string()]);
        assert_eq!(right_keys, vec!["b.aid".to_string()]);
    }

    #[test]
    fn test_other_shapes_stay_residual() {
        for text in [
            "a.id < b.aid",
            "a.id = 5",
            "id = b.aid",
            "a.id = a.x",
            "a.id = b.aid OR a.x = b.y",
        ] {
            let plan = LogicalPlan::select(predicate(text), LogicalPlan::cross(scan("a"), scan("b")));
            assert_eq!(Joinize.apply(plan.clone()), plan, "{text}");
        }
    }

    #[test]
    fn test_only_direct_parent_is_converted() {
        // Select: a.x = b.x
        //   Select: a.id = b.aid
        //     Cross
        //
        // only the inner layer becomes the join condition
        let plan = LogicalPlan::select(
            predicate("a.x = b.x"),
            LogicalPlan::select(
                predicate("a.id = b.aid"),
                LogicalPlan::cross(scan("a"), scan("b")),
            ),
        );

        let expected = LogicalPlan::select(
            predicate("a.x = b.x"),
            LogicalPlan::join_on(
                predicate("a.id = b.aid"),
                "a.id".to_string(),
                "b.aid".to_string(),
                scan("a"),
                scan("b"),
            ),
        );

        assert_eq!(Joinize.apply(plan), expected);
    }

    #[test]
    fn test_nested_cross_products() {
        let plan = LogicalPlan::select(
            predicate("b.cid = c.id"),
            LogicalPlan::cross(
                LogicalPlan::select(
                    predicate("a.id = b.aid"),
                    LogicalPlan::cross(scan("a"), scan("b")),
                ),
                scan("c"),
            ),
        );

        let expected = LogicalPlan::join_on(
            predicate("b.cid = c.id"),
            "b.cid".to_string(),
            "c.id".to_string(),
            LogicalPlan::join_on(
                predicate("a.id = b.aid"),
                "a.id".to_string(),
                "b.aid".to_string(),
                scan("a"),
                scan("b"),
            ),
            scan("c"),
        );

        assert_eq!(Joinize.apply(plan), expected);
    }
}
