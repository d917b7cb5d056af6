use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{LevelFilter, error, info};

use relopt::config::Config;
use relopt::error::{Error, Result};
use relopt::sql::CommandRunner;

/// Rule-based optimizer for single SELECT queries.
#[derive(Debug, Parser)]
#[command(version)]
struct Options {
    /// Path to a .sql file, or the query itself with --inline
    #[arg(long)]
    sql: String,

    /// Treat --sql as query text
    #[arg(long)]
    inline: bool,

    /// Do not tag NOT IN / NOT EXISTS before parsing
    #[arg(long)]
    no_unnest: bool,

    /// Do not write the optimized SQL
    #[arg(long)]
    no_sqlout: bool,

    /// Where to write the optimized SQL
    #[arg(long)]
    emit_sql: Option<PathBuf>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let options = Options::parse();

    let config = Config::load(options.config.as_deref());
    let log_level = config
        .as_ref()
        .map_or(LevelFilter::Info, Config::get_log_level);
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match config.and_then(|config| run(options, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: Options, config: Config) -> Result<()> {
    let mut config = config;
    if options.no_unnest {
        config = config.with_tag_anti_joins(false);
    }
    if options.no_sqlout {
        config = config.with_emit_sql(None);
    } else if options.emit_sql.is_some() {
        config = config.with_emit_sql(options.emit_sql);
    }

    let sql = if options.inline {
        options.sql
    } else {
        std::fs::read_to_string(&options.sql)
            .map_err(|error| Error::Io(format!("{}: {error}", options.sql)))?
    };

    let report = CommandRunner::optimize_command(&sql, &config)?;

    if config.print_trace() {
        for step in &report.trace {
            println!("{}", "=".repeat(80));
            println!("{}", step.name);
            println!("{}", step.plan);
        }
    }

    if let Some(path) = config.get_emit_sql() {
        std::fs::write(path, &report.sql)
            .map_err(|error| Error::Io(format!("{}: {error}", path.display())))?;
        info!("Wrote optimized SQL to {}", path.display());
        println!("\n[WROTE] {}", path.display());
    }

    Ok(())
}
