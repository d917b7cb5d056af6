use derive_more::Display;

pub type Result<T> = std::result::Result<T, Error>;

/// Universal error.
#[derive(Debug, Display, PartialEq, Eq)]
pub enum Error {
    // mod sql (front end)
    #[display("Couldn't parse SQL: {_0}")]
    SqlToAstConversion(String),
    #[display("No statement provided")]
    EmptyStatement,
    #[display("Unsupported query shape: {_0}.")]
    UnsupportedQueryShape(String),
    #[display("Query must have a FROM clause.")]
    MissingFromClause,
    #[display("Unsupported FROM term: {_0}")]
    UnsupportedFromTerm(String),
    #[display("Unsupported expression: {_0}")]
    UnsupportedExpression(String),

    // mod sql (emission)
    #[display("Invalid plan shape: {_0}")]
    InvalidPlanShape(String),

    // mod config / main
    #[display("Invalid config: {_0}")]
    InvalidConfig(String),
    #[display("I/O error: {_0}")]
    Io(String),
}
