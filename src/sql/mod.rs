mod command_runner;
mod logical_plan;
mod plan_optimization;
mod preprocess;
mod sql_emitter;
mod sql_parser;

pub use command_runner::{CommandRunner, Report};
pub use logical_plan::{Predicate, attribute_alias};
pub use plan_optimization::{OptimizationRule, Optimized, Optimizer, TraceStep};
pub use preprocess::tag_anti_joins;
pub use sql_emitter::sql_from_plan;
pub use sql_parser::{Aggregate, LogicalPlan};
