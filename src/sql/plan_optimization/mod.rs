//! Heuristic rewrite pipeline.
//!
//! Seven rules run exactly once each, in a fixed order. Every rule consumes the plan produced by
//! the previous one; there is no fixpoint iteration, so an opportunity exposed by a later rule
//! is not picked up by an earlier one.

mod break_up_conjuncts;
mod dedup_selections;
mod having_to_where;
mod joinize;
mod projection_pushdown;
mod reorder_joins;
mod selection_pushdown;

pub use break_up_conjuncts::BreakUpConjuncts;
pub use dedup_selections::DedupSelections;
pub use having_to_where::HavingToWhere;
pub use joinize::Joinize;
pub use projection_pushdown::ProjectionPushdown;
pub use reorder_joins::ReorderJoins;
pub use selection_pushdown::SelectionPushdown;

use log::{debug, info};

use crate::config::Config;
use crate::sql::sql_parser::LogicalPlan;

/// A plan-to-plan rewrite.
pub trait OptimizationRule {
    /// Name shown in the trace.
    fn name(&self) -> &'static str;

    fn apply(&self, plan: LogicalPlan) -> LogicalPlan;
}

/// The plan as it looked after one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub name: String,
    pub plan: LogicalPlan,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    trace: Vec<TraceStep>,
    final_plan: LogicalPlan,
}

impl Optimized {
    /// `Canonical`, one entry per rule, then `Final`.
    pub fn trace(&self) -> &[TraceStep] {
        &self.trace
    }

    pub fn final_plan(&self) -> &LogicalPlan {
        &self.final_plan
    }

    pub fn into_final_plan(self) -> LogicalPlan {
        self.final_plan
    }
}

pub struct Optimizer {
    rules: Vec<Box<dyn OptimizationRule>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Optimizer {
    pub fn new(config: &Config) -> Self {
        Self {
            rules: vec![
                Box::new(BreakUpConjuncts),
                Box::new(SelectionPushdown),
                Box::new(Joinize),
                Box::new(ProjectionPushdown::new(config.get_catalog().clone())),
                Box::new(ReorderJoins),
                Box::new(HavingToWhere::new(config.get_aggregate_functions().to_vec())),
                Box::new(DedupSelections),
            ],
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Runs every rule once and records the plan after each of them.
    pub fn optimize(&self, plan: LogicalPlan) -> Optimized {
        let mut trace = Vec::with_capacity(self.rules.len() + 2);
        trace.push(TraceStep {
            name: "Canonical".to_string(),
            plan: plan.clone(),
        });

        let mut plan = plan;
        for (idx, rule) in self.rules.iter().enumerate() {
            info!("Applying {}", rule.name());
            plan = rule.apply(plan);
            debug!(
                "Attributes named after {}: {:?}",
                rule.name(),
                plan.collect_needed_attributes()
            );

            trace.push(TraceStep {
                name: format!("Step {} — {}", idx + 1, rule.name()),
                plan: plan.clone(),
            });
        }

        trace.push(TraceStep {
            name: "Final".to_string(),
            plan: plan.clone(),
        });

        Optimized {
            trace,
            final_plan: plan,
        }
    }
}

impl LogicalPlan {
    /// Runs the default pipeline.
    pub fn optimize(self) -> LogicalPlan {
        Optimizer::default().optimize(self).into_final_plan()
    }
}
