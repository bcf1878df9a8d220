//! Core error types

use carelink_db::DbError;
use thiserror::Error;

/// Failures surfaced by the cached repositories
///
/// A missing record is not an error: lookups return `Ok(None)` and writes
/// against a missing id return `Ok(false)`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Persistence error: {0}")]
    Persistence(#[source] DbError),
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(msg) => CoreError::DuplicateKey(msg),
            other => CoreError::Persistence(other),
        }
    }
}
