use log::debug;

use crate::sql::plan_optimization::OptimizationRule;
use crate::sql::sql_parser::LogicalPlan;

/// Splits `Select(p1 AND p2 AND p3)` into `Select(p1) -> Select(p2) -> Select(p3)`.
pub struct BreakUpConjuncts;

impl OptimizationRule for BreakUpConjuncts {
    fn name(&self) -> &'static str {
        "BreakUpConjuncts"
    }

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan {
        self.transform(plan)
    }
}

impl BreakUpConjuncts {
    fn transform(&self, plan: LogicalPlan) -> LogicalPlan {
        match plan {
            LogicalPlan::Select { predicate, plan } => {
                let plan = self.transform(*plan);
                if !predicate.is_conjunction() {
                    return LogicalPlan::select(predicate, plan);
                }

                debug!("Splitting conjunction {predicate}");
                // last conjunct ends up innermost
                predicate
                    .conjuncts()
                    .into_iter()
                    .rev()
                    .fold(plan, |plan, conjunct| LogicalPlan::select(conjunct, plan))
            }
            plan => plan.map_inputs(|input| self.transform(input)),
        }
    }
}
