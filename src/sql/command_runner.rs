use log::info;

use crate::config::Config;
use crate::error::Result;
use crate::sql::plan_optimization::{Optimizer, TraceStep};
use crate::sql::preprocess::tag_anti_joins;
use crate::sql::sql_emitter::sql_from_plan;
use crate::sql::sql_parser::LogicalPlan;

/// Everything one optimizer run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub trace: Vec<TraceStep>,
    pub final_plan: LogicalPlan,
    pub sql: String,
}

/// Main runner struct which optimizes received query.
#[derive(Debug)]
pub struct CommandRunner;

impl CommandRunner {
    /// Handles full command optimization: tagging, parsing, rewriting and SQL emission.
    pub fn optimize_command(command: &str, config: &Config) -> Result<Report> {
        let command = if config.tag_anti_joins() {
            tag_anti_joins(command)
        } else {
            command.to_string()
        };

        let logical_plan = LogicalPlan::parse_sql(&command, config.get_aggregate_functions())?;
        info!("Canonical plan has {} relations", logical_plan.aliases().len());

        let optimized = Optimizer::new(config).optimize(logical_plan);
        let sql = sql_from_plan(optimized.final_plan())?;

        let trace = optimized.trace().to_vec();
        Ok(Report {
            trace,
            final_plan: optimized.into_final_plan(),
            sql,
        })
    }
}
