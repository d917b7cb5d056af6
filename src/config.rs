use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_AGGREGATE_FUNCTIONS: [&str; 5] = ["SUM", "COUNT", "AVG", "MIN", "MAX"];

/// Optimizer settings, read from an optional TOML file.
///
/// ```toml
/// log_level = "debug"
/// emit_sql = "out.sql"
/// aggregate_functions = ["SUM", "COUNT", "AVG", "MIN", "MAX", "STDDEV"]
///
/// [catalog]
/// orders = ["id", "customer_id", "total"]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    log_level: LevelFilter,
    tag_anti_joins: bool,
    print_trace: bool,
    emit_sql: Option<PathBuf>,
    aggregate_functions: Vec<String>,
    catalog: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            tag_anti_joins: true,
            print_trace: true,
            emit_sql: Some(PathBuf::from("optimized.sql")),
            aggregate_functions: DEFAULT_AGGREGATE_FUNCTIONS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            catalog: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads config from `path`, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .map_err(|error| Error::Io(format!("{}: {error}", path.display())))?;

        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|error| Error::InvalidConfig(error.to_string()))
    }

    pub fn get_log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn tag_anti_joins(&self) -> bool {
        self.tag_anti_joins
    }

    pub fn print_trace(&self) -> bool {
        self.print_trace
    }

    pub fn get_emit_sql(&self) -> Option<&Path> {
        self.emit_sql.as_deref()
    }

    pub fn get_aggregate_functions(&self) -> &[String] {
        &self.aggregate_functions
    }

    pub fn get_catalog(&self) -> &BTreeMap<String, Vec<String>> {
        &self.catalog
    }

    pub fn with_tag_anti_joins(mut self, tag_anti_joins: bool) -> Self {
        self.tag_anti_joins = tag_anti_joins;
        self
    }

    pub fn with_emit_sql(mut self, emit_sql: Option<PathBuf>) -> Self {
        self.emit_sql = emit_sql;
        self
    }

    pub fn with_catalog(mut self, catalog: BTreeMap<String, Vec<String>>) -> Self {
        self.catalog = catalog;
        self
    }
}
