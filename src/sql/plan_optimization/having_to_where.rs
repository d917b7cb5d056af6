use log::debug;

use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::{Aggregate, LogicalPlan};

/// Moves aggregate-free HAVING predicates below the grouping.
pub struct HavingToWhere {
    aggregate_functions: Vec<String>,
}

impl OptimizationRule for HavingToWhere {
    fn name(&self) -> &'static str {
        "HavingToWhere"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        self.transform(plan)
    }
}

impl HavingToWhere {
    pub fn new(aggregate_functions: Vec<String>) -> Self {
        Self {
            aggregate_functions,
        }
    }

    fn transform(&self, plan: LogicalPlan) -> LogicalPlan {
        match plan.map_inputs(|input| self.transform(input)) {
            LogicalPlan::Having { predicate, plan } => match *plan {
                LogicalPlan::Group {
                    group_by,
                    aggregates,
                    plan,
                } if !predicate.references_aggregate(&self.aggregate_functions)
                    && !names_aggregate_output(predicate.attrs(), &aggregates) =>
                {
                    debug!("Evaluating {predicate} before grouping");
                    LogicalPlan::group(group_by, aggregates, LogicalPlan::select(predicate, *plan))
                }
                plan => LogicalPlan::having(predicate, plan),
            },
            plan => plan,
        }
    }
}

/// `HAVING total > 10` filters on `SUM(..) AS total` even without a call in the predicate.
fn names_aggregate_output(attrs: &[String], aggregates: &[Aggregate]) -> bool {
    attrs
        .iter()
        .any(|attr| aggregates.iter().any(|aggregate| &aggregate.alias == attr))
}
