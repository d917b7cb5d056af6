use std::collections::HashSet;

use log::debug;

use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::LogicalPlan;

/// Removes every Select whose predicate text already appeared earlier in a pre-order walk.
pub struct DedupSelections;

impl OptimizationRule for DedupSelections {
    fn name(&self) -> &'static str {
        "DedupSelections"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        let mut seen = HashSet::new();
        dedup(plan, &mut seen)
    }
}

fn dedup(plan: LogicalPlan, seen: &mut HashSet<String>) -> LogicalPlan {
    match plan {
        LogicalPlan::Select { predicate, plan } => {
            if seen.insert(predicate.text()) {
                LogicalPlan::select(predicate, dedup(*plan, seen))
            } else {
                debug!("Dropping duplicate selection {predicate}");
                dedup(*plan, seen)
            }
        }
        plan => plan.map_inputs(|input| dedup(input, seen)),
    }
}
