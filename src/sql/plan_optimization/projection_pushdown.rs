use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::sql::logical_plan::{attribute_alias, referenced_attributes};
use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::LogicalPlan;

/// Narrows every Scan to the attributes its ancestors read.
///
/// The need is propagated top-down. A Scan that ends up with a restricting need is wrapped in a
/// `Project` listing that need, sorted. With a catalog entry for the relation, a need that covers
/// every column leaves the Scan bare.
pub struct ProjectionPushdown {
    catalog: BTreeMap<String, Vec<String>>,
}

/// Attributes a subtree has to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Need {
    /// Every column, e.g. below `SELECT *`.
    All,
    Columns(BTreeSet<String>),
}

impl Need {
    fn with<I>(&self, attrs: I) -> Need
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        match self {
            Need::All => Need::All,
            Need::Columns(columns) => {
                let mut columns = columns.clone();
                columns.extend(attrs.into_iter().map(Into::into));
                Need::Columns(columns)
            }
        }
    }

    /// Part of the need `aliases` can satisfy; bare attributes go everywhere.
    fn restricted_to(&self, aliases: &BTreeSet<String>) -> Need {
        match self {
            Need::All => Need::All,
            Need::Columns(columns) => Need::Columns(
                columns
                    .iter()
                    .filter(|attr| attribute_alias(attr).is_none_or(|alias| aliases.contains(alias)))
                    .cloned()
                    .collect(),
            ),
        }
    }
}

impl OptimizationRule for ProjectionPushdown {
    fn name(&self) -> &'static str {
        "ProjectionPushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        self.push(plan, &Need::Columns(BTreeSet::new()))
    }
}

impl ProjectionPushdown {
    pub fn new(catalog: BTreeMap<String, Vec<String>>) -> Self {
        Self { catalog }
    }

    fn push(&self, plan: LogicalPlan, need: &Need) -> LogicalPlan {
        match plan {
            LogicalPlan::Scan { .. } => self.restrict_scan(plan, need),
            LogicalPlan::Project { attrs, plan } => {
                let forward = if attrs.is_empty() || attrs.iter().any(|attr| attr == "*") {
                    Need::All
                } else {
                    need.with(attrs.iter().cloned())
                };
                LogicalPlan::project(attrs, self.push(*plan, &forward))
            }
            LogicalPlan::Order { order_by, plan } => {
                let forward = need.with(order_by.iter().cloned());
                LogicalPlan::order(order_by, self.push(*plan, &forward))
            }
            LogicalPlan::Select { predicate, plan } => {
                let forward = need.with(predicate.attrs().iter().cloned());
                LogicalPlan::select(predicate, self.push(*plan, &forward))
            }
            LogicalPlan::Having { predicate, plan } => {
                let forward = need.with(predicate.attrs().iter().cloned());
                LogicalPlan::having(predicate, self.push(*plan, &forward))
            }
            LogicalPlan::Group {
                group_by,
                aggregates,
                plan,
            } => {
                let forward = match need {
                    Need::All => Need::All,
                    Need::Columns(columns) => {
                        // aggregate outputs are produced here, not below
                        let mut forward: BTreeSet<String> = columns
                            .iter()
                            .filter(|attr| {
                                !aggregates.iter().any(|aggregate| &aggregate.alias == *attr)
                            })
                            .cloned()
                            .collect();
                        forward.extend(group_by.iter().cloned());
                        for aggregate in &aggregates {
                            forward.extend(referenced_attributes(&aggregate.expr));
                        }
                        Need::Columns(forward)
                    }
                };
                LogicalPlan::group(group_by, aggregates, self.push(*plan, &forward))
            }
            LogicalPlan::Join {
                on,
                left_keys,
                right_keys,
                left,
                right,
            } => {
                let need = need.with(left_keys.iter().chain(&right_keys).cloned());
                let left_need = need.restricted_to(&left.aliases());
                let right_need = need.restricted_to(&right.aliases());
                LogicalPlan::Join {
                    on,
                    left_keys,
                    right_keys,
                    left: Box::new(self.push(*left, &left_need)),
                    right: Box::new(self.push(*right, &right_need)),
                }
            }
            LogicalPlan::Cross { left, right } => {
                let left_need = need.restricted_to(&left.aliases());
                let right_need = need.restricted_to(&right.aliases());
                LogicalPlan::cross(self.push(*left, &left_need), self.push(*right, &right_need))
            }
        }
    }

    fn restrict_scan(&self, scan: LogicalPlan, need: &Need) -> LogicalPlan {
        let LogicalPlan::Scan { relation, alias } = &scan else {
            return scan;
        };
        let Need::Columns(columns) = need else {
            return scan;
        };
        // a bare attribute could belong to this relation under any column name
        if columns.iter().any(|attr| attribute_alias(attr).is_none()) {
            return scan;
        }

        let prefix = format!("{alias}.");
        let own: Vec<String> = columns
            .iter()
            .filter(|attr| attr.starts_with(&prefix))
            .cloned()
            .collect();
        if own.is_empty() || own.iter().any(|attr| attr.ends_with(".*")) {
            return scan;
        }

        if let Some(all_columns) = self.catalog.get(relation) {
            let covers_all = all_columns
                .iter()
                .all(|column| own.contains(&format!("{prefix}{column}")));
            if covers_all {
                return scan;
            }
        }

        debug!("Restricting {relation} AS {alias} to {own:?}");
        LogicalPlan::project(own, scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::logical_plan::Predicate;
    use crate::sql::sql_parser::Aggregate;
    use pretty_assertions::assert_eq;

    fn predicate(text: &str) -> Predicate {
        Predicate::parse(text).unwrap()
    }

    fn attrs(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn scan(alias: &str) -> LogicalPlan {
        LogicalPlan::scan(alias.to_uppercase(), Some(alias.to_string()))
    }

    fn pushdown() -> ProjectionPushdown {
        ProjectionPushdown::new(BTreeMap::new())
    }

    #[test]
    fn test_scans_restricted_per_side() {
        // Project: a.x
        //   Select: a.id = b.aid
        //     Cross
        //       Scan: A AS a
        //       Scan: B AS b
        //
        // INTO
        //
        // Project: a.x
        //   Select: a.id = b.aid
        //     Cross
        //       Project: a.id, a.x
        //         Scan: A AS a
        //       Project: b.aid
        //         Scan: B AS b
        let plan = LogicalPlan::project(
            attrs(&["a.x"]),
            LogicalPlan::select(
                predicate("a.id = b.aid"),
                LogicalPlan::cross(scan("a"), scan("b")),
            ),
        );

        let expected = LogicalPlan::project(
            attrs(&["a.x"]),
            LogicalPlan::select(
                predicate("a.id = b.aid"),
                LogicalPlan::cross(
                    LogicalPlan::project(attrs(&["a.id", "a.x"]), scan("a")),
                    LogicalPlan::project(attrs(&["b.aid"]), scan("b")),
                ),
            ),
        );

        assert_eq!(pushdown().apply(plan), expected);
    }

    #[test]
    fn test_wildcard_keeps_scans_bare() {
        let plan = LogicalPlan::project(
            attrs(&["*"]),
            LogicalPlan::select(
                predicate("a.x > 1"),
                LogicalPlan::cross(scan("a"), scan("b")),
            ),
        );

        assert_eq!(pushdown().apply(plan.clone()), plan);

        let qualified_wildcard = LogicalPlan::project(
            attrs(&["a.*", "b.y"]),
            LogicalPlan::cross(scan("a"), scan("b")),
        );
        let expected = LogicalPlan::project(
            attrs(&["a.*", "b.y"]),
            LogicalPlan::cross(scan("a"), LogicalPlan::project(attrs(&["b.y"]), scan("b"))),
        );
        assert_eq!(pushdown().apply(qualified_wildcard), expected);
    }

    #[test]
    fn test_order_and_join_keys_are_kept() {
        let plan = LogicalPlan::order(
            attrs(&["b.z"]),
            LogicalPlan::project(
                attrs(&["a.x"]),
                LogicalPlan::join_on(
                    predicate("a.id = b.aid"),
                    "a.id".to_string(),
                    "b.aid".to_string(),
                    scan("a"),
                    scan("b"),
                ),
            ),
        );

        let expected = LogicalPlan::order(
            attrs(&["b.z"]),
            LogicalPlan::project(
                attrs(&["a.x"]),
                LogicalPlan::join_on(
                    predicate("a.id = b.aid"),
                    "a.id".to_string(),
                    "b.aid".to_string(),
                    LogicalPlan::project(attrs(&["a.id", "a.x"]), scan("a")),
                    LogicalPlan::project(attrs(&["b.aid", "b.z"]), scan("b")),
                ),
            ),
        );

        assert_eq!(pushdown().apply(plan), expected);
    }

    #[test]
    fn test_group_forwards_aggregate_arguments() {
        let plan = LogicalPlan::project(
            attrs(&["a.x", "total"]),
            LogicalPlan::having(
                predicate("total > 10"),
                LogicalPlan::group(
                    attrs(&["a.x"]),
                    vec![Aggregate {
                        alias: "total".to_string(),
                        expr: predicate("SUM(a.y * a.z)").expr().clone(),
                    }],
                    scan("a"),
                ),
            ),
        );

        let LogicalPlan::Project { plan, .. } = pushdown().apply(plan) else {
            panic!("expected a projection");
        };
        let LogicalPlan::Having { plan, .. } = *plan else {
            panic!("expected a having");
        };
        let LogicalPlan::Group { plan, .. } = *plan else {
            panic!("expected a group");
        };
        assert_eq!(
            *plan,
            LogicalPlan::project(attrs(&["a.x", "a.y", "a.z"]), scan("a"))
        );
    }

    #[test]
    fn test_bare_aggregate_argument_keeps_scan_bare() {
        let plan = LogicalPlan::project(
            attrs(&["t.g", "SUM(v)"]),
            LogicalPlan::group(
                attrs(&["t.g"]),
                vec![Aggregate {
                    alias: "SUM(v)".to_string(),
                    expr: predicate("SUM(v)").expr().clone(),
                }],
                LogicalPlan::scan("t", None),
            ),
        );

        assert_eq!(pushdown().apply(plan.clone()), plan);
    }

    #[test]
    fn test_unqualified_attributes_keep_scans_bare() {
        let plan = LogicalPlan::project(
            attrs(&["x"]),
            LogicalPlan::select(predicate("a.y > 1"), scan("a")),
        );

        assert_eq!(pushdown().apply(plan.clone()), plan);
    }

    #[test]
    fn test_catalog_skips_full_coverage() {
        let catalog = BTreeMap::from([
            ("A".to_string(), attrs(&["id", "x"])),
            ("B".to_string(), attrs(&["aid", "y", "w"])),
        ]);
        let plan = LogicalPlan::project(
            attrs(&["a.x", "b.y"]),
            LogicalPlan::join_on(
                predicate("a.id = b.aid"),
                "a.id".to_string(),
                "b.aid".to_string(),
                scan("a"),
                scan("b"),
            ),
        );

        let expected = LogicalPlan::project(
            attrs(&["a.x", "b.y"]),
            LogicalPlan::join_on(
                predicate("a.id = b.aid"),
                "a.id".to_string(),
                "b.aid".to_string(),
                scan("a"),
                LogicalPlan::project(attrs(&["b.aid", "b.y"]), scan("b")),
            ),
        );

        assert_eq!(ProjectionPushdown::new(catalog).apply(plan), expected);
    }

    #[test]
    fn test_required_attributes_survive() {
        let plan = LogicalPlan::order(
            attrs(&["a.x"]),
            LogicalPlan::project(
                attrs(&["a.x", "c.z"]),
                LogicalPlan::select(
                    predicate("b.cid = c.id"),
                    LogicalPlan::cross(
                        LogicalPlan::select(
                            predicate("a.id = b.aid"),
                            LogicalPlan::cross(scan("a"), scan("b")),
                        ),
                        LogicalPlan::select(predicate("c.w < 3"), scan("c")),
                    ),
                ),
            ),
        );
        let needed = plan.collect_needed_attributes();

        let pushed = pushdown().apply(plan);

        fn produced(plan: &LogicalPlan, out: &mut BTreeSet<String>) {
            match plan {
                LogicalPlan::Project { attrs, plan }
                    if matches!(plan.as_ref(), LogicalPlan::Scan { .. }) =>
                {
                    out.extend(attrs.iter().cloned());
                }
                plan => {
                    for input in plan.inputs() {
                        produced(input, out);
                    }
                }
            }
        }
        let mut available = BTreeSet::new();
        produced(&pushed, &mut available);

        assert_eq!(available, needed);
    }
}
