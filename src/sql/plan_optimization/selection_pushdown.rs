use std::collections::BTreeSet;

use log::debug;

use crate::sql::logical_plan::Predicate;
use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::LogicalPlan;

/// Moves each Select below the join boundaries it does not need.
///
/// A Select whose attributes all belong to one side of a `Join`/`Cross` is pushed into that side,
/// as deep as possible. Selects referencing an unqualified attribute, or nothing at all, stay
/// where they are. Selects spanning both sides stay above the join for [`super::Joinize`].
pub struct SelectionPushdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl OptimizationRule for SelectionPushdown {
    fn name(&self) -> &'static str {
        "SelectionPushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        self.transform(plan)
    }
}

impl SelectionPushdown {
    fn transform(&self, plan: LogicalPlan) -> LogicalPlan {
        match plan {
            LogicalPlan::Select { predicate, plan } => {
                // children first, so inner selections already sit as low as they can
                let plan = self.transform(*plan);
                match predicate.involved_aliases() {
                    Some(involved) => push_below(predicate, &involved, plan),
                    None => LogicalPlan::select(predicate, plan),
                }
            }
            plan => plan.map_inputs(|input| self.transform(input)),
        }
    }
}

fn push_below(predicate: Predicate, involved: &BTreeSet<String>, plan: LogicalPlan) -> LogicalPlan {
    match plan {
        LogicalPlan::Cross { left, right } => match side_of(involved, &left, &right) {
            Some(Side::Left) => {
                debug!("Pushing {predicate} into left side of cross product");
                LogicalPlan::Cross {
                    left: Box::new(push_below(predicate, involved, *left)),
                    right,
                }
            }
            Some(Side::Right) => {
                debug!("Pushing {predicate} into right side of cross product");
                LogicalPlan::Cross {
                    left,
                    right: Box::new(push_below(predicate, involved, *right)),
                }
            }
            None => LogicalPlan::select(predicate, LogicalPlan::Cross { left, right }),
        },
        LogicalPlan::Join {
            on,
            left_keys,
            right_keys,
            left,
            right,
        } => match side_of(involved, &left, &right) {
            Some(Side::Left) => {
                debug!("Pushing {predicate} into left side of join");
                LogicalPlan::Join {
                    on,
                    left_keys,
                    right_keys,
                    left: Box::new(push_below(predicate, involved, *left)),
                    right,
                }
            }
            Some(Side::Right) => {
                debug!("Pushing {predicate} into right side of join");
                LogicalPlan::Join {
                    on,
                    left_keys,
                    right_keys,
                    left,
                    right: Box::new(push_below(predicate, involved, *right)),
                }
            }
            None => LogicalPlan::select(
                predicate,
                LogicalPlan::Join {
                    on,
                    left_keys,
                    right_keys,
                    left,
                    right,
                },
            ),
        },
        // selections commute, so step over one when a join we can cross lies below it
        LogicalPlan::Select {
            predicate: inner,
            plan: inner_plan,
        } if can_sink(involved, &inner_plan) => LogicalPlan::Select {
            predicate: inner,
            plan: Box::new(push_below(predicate, involved, *inner_plan)),
        },
        plan => LogicalPlan::select(predicate, plan),
    }
}

fn can_sink(involved: &BTreeSet<String>, plan: &LogicalPlan) -> bool {
    match plan {
        LogicalPlan::Select { plan, .. } => can_sink(involved, plan),
        LogicalPlan::Join { left, right, .. } | LogicalPlan::Cross { left, right } => {
            side_of(involved, left, right).is_some()
        }
        _ => false,
    }
}

fn side_of(involved: &BTreeSet<String>, left: &LogicalPlan, right: &LogicalPlan) -> Option<Side> {
    if involved.is_subset(&left.aliases()) {
        Some(Side::Left)
    } else if involved.is_subset(&right.aliases()) {
        Some(Side::Right)
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

    fn select(text: &str, plan: LogicalPlan) -> LogicalPlan {
        LogicalPlan::select(predicate(text), plan)
    }

    #[test]
    fn test_push_to_both_sides() {
        // Select: a.id = b.aid
        //   Select: b.y < 100
        //     Select: a.x > 5
        //       Cross
        //         Scan: A AS a
        //         Scan: B AS b
        //
        // INTO
        //
        // Select: a.id = b.aid
        //   Cross
        //     Select: a.x > 5
        //       Scan: A AS a
        //     Select: b.y < 100
        //       Scan: B AS b
        let plan = select(
            "a.id = b.aid",
            select(
                "b.y < 100",
                select("a.x > 5", LogicalPlan::cross(scan("a"), scan("b"))),
            ),
        );

        let expected = select(
            "a.id = b.aid",
            LogicalPlan::cross(select("a.x > 5", scan("a")), select("b.y < 100", scan("b"))),
        );

        assert_eq!(SelectionPushdown.apply(plan), expected);
    }

    #[test]
    fn test_crosses_several_boundaries() {
        let plan = select(
            "a.x > 5",
            LogicalPlan::cross(LogicalPlan::cross(scan("a"), scan("b")), scan("c")),
        );

        let expected = LogicalPlan::cross(
            LogicalPlan::cross(select("a.x > 5", scan("a")), scan("b")),
            scan("c"),
        );

        assert_eq!(SelectionPushdown.apply(plan), expected);
    }

    #[test]
    fn test_two_side_predicate_lands_on_matching_join() {
        let plan = select(
            "a.id = b.aid",
            LogicalPlan::cross(LogicalPlan::cross(scan("a"), scan("b")), scan("c")),
        );

        let expected = LogicalPlan::cross(
            select("a.id = b.aid", LogicalPlan::cross(scan("a"), scan("b"))),
            scan("c"),
        );

        assert_eq!(SelectionPushdown.apply(plan), expected);
    }

    #[test]
    fn test_steps_over_residual_selection() {
        let plan = select(
            "a.x > 5",
            select("a.id = b.aid", LogicalPlan::cross(scan("a"), scan("b"))),
        );

        let expected = select(
            "a.id = b.aid",
            LogicalPlan::cross(select("a.x > 5", scan("a")), scan("b")),
        );

        assert_eq!(SelectionPushdown.apply(plan), expected);
    }

    #[test]
    fn test_unqualified_and_constant_predicates_stay() {
        let plan = select(
            "x > 5",
            select("1 = 1", LogicalPlan::cross(scan("a"), scan("b"))),
        );

        assert_eq!(SelectionPushdown.apply(plan.clone()), plan);

        let mixed = select("a.x > y", LogicalPlan::cross(scan("a"), scan("b")));
        assert_eq!(SelectionPushdown.apply(mixed.clone()), mixed);
    }

    #[test]
    fn test_push_through_join() {
        let plan = select(
            "b.y < 3",
            LogicalPlan::join_on(
                predicate("a.id = b.aid"),
                "a.id".to_string(),
                "b.aid".to_string(),
                scan("a"),
                scan("b"),
            ),
        );

        let expected = LogicalPlan::join_on(
            predicate("a.id = b.aid"),
            "a.id".to_string(),
            "b.aid".to_string(),
            scan("a"),
            select("b.y < 3", scan("b")),
        );

        assert_eq!(SelectionPushdown.apply(plan), expected);
    }

    #[test]
    fn test_no_single_side_selection_left_above_join() {
        let plan = LogicalPlan::project(
            vec!["a.x".to_string()],
            select(
                "c.z = 1",
                select(
                    "b.y < 2",
                    select(
                        "a.x > 0",
                        LogicalPlan::cross(LogicalPlan::cross(scan("a"), scan("b")), scan("c")),
                    ),
                ),
            ),
        );

        fn assert_no_pushable(plan: &LogicalPlan) {
            if let LogicalPlan::Select { predicate, plan } = plan {
                if let Some(involved) = predicate.involved_aliases() {
                    assert!(!can_sink(&involved, plan), "{predicate} could go lower");
                }
            }
            for input in plan.inputs() {
                assert_no_pushable(input);
            }
        }

        assert_no_pushable(&SelectionPushdown.apply(plan));
    }
}
