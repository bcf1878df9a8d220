//! Database error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Row codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Errors raised while mapping a flat row to a typed model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column '{column}' has an invalid value: {reason}")]
    InvalidValue { column: String, reason: String },
}
