//! CareLink Database Layer
//!
//! This crate provides the local persistence layer for CareLink: a row store
//! over SQLite (via sqlx), typed clinical models with a two-way row codec,
//! and uncached repositories for the less frequently used entities.

pub mod error;
pub mod models;
pub mod repository;
pub mod row;
pub mod store;
pub mod utils;

pub use error::{CodecError, DbError};
pub use models::*;
pub use repository::Database;
pub use row::{Filter, Predicate, Query, Row, SortOrder, Value};
pub use store::{RowStore, decode_rows, fetch_all, fetch_one};

/// Re-export sqlx types for convenience
pub use sqlx::SqlitePool;
