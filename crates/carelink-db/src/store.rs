//! Row store abstraction and its SQLite implementation

use async_trait::async_trait;
use sqlx::query::Query as SqlxQuery;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::DbError;
use crate::models::Entity;
use crate::repository::Database;
use crate::row::{Filter, Query, Row, Value};
use crate::utils::is_identifier;

/// Table-scoped CRUD over flat rows
///
/// This is the only surface the cached repositories see of the database,
/// which keeps them testable against decorated or fake stores.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a row, returning the SQLite rowid
    async fn insert(&self, table: &str, row: &Row) -> Result<i64, DbError>;

    /// Select whole rows from one table
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, DbError>;

    /// Run hand-written SQL with positional arguments
    async fn raw_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Update the given columns on every matching row, returning rows affected
    async fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<u64, DbError>;

    /// Like `update`, and in the same statement append `line` to the text in
    /// `column`, newline-separated from any existing non-empty text
    async fn update_appending(
        &self,
        table: &str,
        row: &Row,
        column: &str,
        line: &str,
        filter: &Filter,
    ) -> Result<u64, DbError>;

    /// Delete every matching row, returning rows affected
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, DbError>;

    /// Count matching rows
    async fn count(&self, table: &str, filter: &Filter) -> Result<i64, DbError>;
}

/// Decode rows into typed models
pub fn decode_rows<E: Entity>(rows: &[Row]) -> Result<Vec<E>, DbError> {
    rows.iter()
        .map(|row| E::from_row(row).map_err(DbError::from))
        .collect()
}

/// Fetch at most one model matching the filter
pub async fn fetch_one<E, S>(store: &S, filter: &Filter) -> Result<Option<E>, DbError>
where
    E: Entity,
    S: RowStore + ?Sized,
{
    let query = Query::new().filter(filter.clone()).limit(1);
    let rows = store.query(E::TABLE, &query).await?;
    rows.first()
        .map(|row| E::from_row(row).map_err(DbError::from))
        .transpose()
}

/// Fetch every model matching the query
pub async fn fetch_all<E, S>(store: &S, query: &Query) -> Result<Vec<E>, DbError>
where
    E: Entity,
    S: RowStore + ?Sized,
{
    let rows = store.query(E::TABLE, query).await?;
    decode_rows(&rows)
}

fn check_identifier(kind: &str, name: &str) -> Result<(), DbError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(DbError::InvalidQuery(format!("invalid {} name: {}", kind, name)))
    }
}

fn bind_value<'q>(
    query: SqlxQuery<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> SqlxQuery<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
    }
}

fn bind_all<'q>(
    mut query: SqlxQuery<'q, Sqlite, SqliteArguments<'q>>,
    values: impl IntoIterator<Item = &'q Value>,
) -> SqlxQuery<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

/// Map constraint violations on writes to `DbError::Duplicate`
fn map_write_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Duplicate(db_err.message().to_string())
        }
        _ => DbError::Connection(err),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, DbError> {
    let mut decoded = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::Real(row.try_get::<f64, _>(idx)?),
                "TEXT" => Value::Text(row.try_get::<String, _>(idx)?),
                other => {
                    return Err(DbError::InvalidQuery(format!(
                        "unsupported value type {} in column {}",
                        other,
                        column.name()
                    )));
                }
            }
        };
        decoded.set(column.name(), value);
    }
    Ok(decoded)
}

impl Database {
    /// Single `UPDATE` statement, optionally appending to one text column
    async fn execute_update(
        &self,
        table: &str,
        row: &Row,
        append: Option<(&str, &str)>,
        filter: &Filter,
    ) -> Result<u64, DbError> {
        check_identifier("table", table)?;
        if row.is_empty() && append.is_none() {
            return Err(DbError::InvalidQuery("nothing to update".to_string()));
        }
        if filter.is_empty() {
            return Err(DbError::InvalidQuery(format!(
                "refusing unfiltered update on {}",
                table
            )));
        }
        for column in row.columns() {
            check_identifier("column", column)?;
        }

        let mut assignments: Vec<String> = row.columns().map(|c| format!("{} = ?", c)).collect();
        let mut args: Vec<Value> = row.values().cloned().collect();
        if let Some((column, line)) = append {
            check_identifier("column", column)?;
            assignments.push(format!(
                "{0} = CASE WHEN {0} IS NULL OR {0} = '' THEN ? ELSE {0} || char(10) || ? END",
                column
            ));
            args.push(Value::Text(line.to_string()));
            args.push(Value::Text(line.to_string()));
        }

        let (where_clause, filter_args) = filter.to_sql()?;
        args.extend(filter_args);
        let sql = format!(
            "UPDATE {} SET {} {}",
            table,
            assignments.join(", "),
            where_clause
        );

        let result = bind_all(sqlx::query(&sql), args.iter())
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RowStore for Database {
    async fn insert(&self, table: &str, row: &Row) -> Result<i64, DbError> {
        check_identifier("table", table)?;
        if row.is_empty() {
            return Err(DbError::InvalidQuery("cannot insert an empty row".to_string()));
        }
        for column in row.columns() {
            check_identifier("column", column)?;
        }

        let columns: Vec<&str> = row.columns().collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );

        let result = bind_all(sqlx::query(&sql), row.values())
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;

        debug!("Inserted row {} into {}", result.last_insert_rowid(), table);
        Ok(result.last_insert_rowid())
    }

    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, DbError> {
        check_identifier("table", table)?;
        let query = query.clone().validated();
        let (clauses, args) = query.to_sql()?;
        let sql = format!("SELECT * FROM {} {}", table, clauses);

        let rows = bind_all(sqlx::query(&sql), args.iter())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_row).collect()
    }

    async fn raw_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DbError> {
        let rows = bind_all(sqlx::query(sql), args.iter())
            .fetch_all(&self.pool)
            .await
            .map_err(map_write_error)?;

        rows.iter().map(decode_row).collect()
    }

    async fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<u64, DbError> {
        self.execute_update(table, row, None, filter).await
    }

    async fn update_appending(
        &self,
        table: &str,
        row: &Row,
        column: &str,
        line: &str,
        filter: &Filter,
    ) -> Result<u64, DbError> {
        self.execute_update(table, row, Some((column, line)), filter)
            .await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, DbError> {
        check_identifier("table", table)?;
        if filter.is_empty() {
            return Err(DbError::InvalidQuery(format!(
                "refusing unfiltered delete on {}",
                table
            )));
        }

        let (where_clause, args) = filter.to_sql()?;
        let sql = format!("DELETE FROM {} {}", table, where_clause);
        let result = bind_all(sqlx::query(&sql), args.iter())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<i64, DbError> {
        check_identifier("table", table)?;
        let (where_clause, args) = filter.to_sql()?;
        let sql = format!("SELECT COUNT(*) as count FROM {} {}", table, where_clause);
        let row = bind_all(sqlx::query(&sql), args.iter())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    #[tokio::test]
    async fn test_insert_query_update_delete() {
        let db = Database::in_memory().await.unwrap();
        let provider = Provider::new("Dr. Grey", "cardiology");
        db.insert(Provider::TABLE, &provider.to_row()).await.unwrap();

        let rows = db
            .query(Provider::TABLE, &Query::new().filter(Filter::by_id(&provider.id)))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(Provider::from_row(&rows[0]).unwrap(), provider);

        let affected = db
            .update(
                Provider::TABLE,
                &Row::new().with("accepting_referrals", false),
                &Filter::by_id(&provider.id),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let count = db
            .count(Provider::TABLE, &Filter::new().eq("accepting_referrals", false))
            .await
            .unwrap();
        assert_eq!(count, 1);

        let deleted = db
            .delete(Provider::TABLE, &Filter::by_id(&provider.id))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(db.count(Provider::TABLE, &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unfiltered_writes_refused() {
        let db = Database::in_memory().await.unwrap();
        let result = db.delete(Provider::TABLE, &Filter::new()).await;
        assert!(matches!(result, Err(DbError::InvalidQuery(_))));

        let result = db
            .update(Provider::TABLE, &Row::new().with("name", "x"), &Filter::new())
            .await;
        assert!(matches!(result, Err(DbError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_update_appending() {
        let db = Database::in_memory().await.unwrap();
        let provider = Provider::new("Dr. Grey", "cardiology");
        db.insert(Provider::TABLE, &provider.to_row()).await.unwrap();
        let by_id = Filter::by_id(&provider.id);

        for line in ["first", "second"] {
            let affected = db
                .update_appending(
                    Provider::TABLE,
                    &Row::new().with("accepting_referrals", false),
                    "name",
                    line,
                    &by_id,
                )
                .await
                .unwrap();
            assert_eq!(affected, 1);
        }

        let stored: Option<Provider> = fetch_one(&db, &by_id).await.unwrap();
        let stored = stored.unwrap();
        assert_eq!(stored.name, "Dr. Grey\nfirst\nsecond");
        assert!(!stored.accepting_referrals);

        let missing = db
            .update_appending(Provider::TABLE, &Row::new(), "name", "x", &Filter::by_id("nope"))
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn test_bad_table_name_rejected() {
        let db = Database::in_memory().await.unwrap();
        let result = db.query("providers; DROP TABLE x", &Query::new()).await;
        assert!(matches!(result, Err(DbError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_raw_query_decodes_all_types() {
        let db = Database::in_memory().await.unwrap();
        let rows = db
            .raw_query(
                "SELECT 1 AS i, 0.5 AS r, 'x' AS t, NULL AS n, ? AS bound",
                &[Value::Text("arg".to_string())],
            )
            .await
            .unwrap();
        let row = &rows[0];
        assert_eq!(row.get("i"), Some(&Value::Integer(1)));
        assert_eq!(row.get("r"), Some(&Value::Real(0.5)));
        assert_eq!(row.get("t"), Some(&Value::Text("x".to_string())));
        assert_eq!(row.get("n"), Some(&Value::Null));
        assert_eq!(row.get("bound"), Some(&Value::Text("arg".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_helpers() {
        let db = Database::in_memory().await.unwrap();
        for name in ["Dr. A", "Dr. B", "Dr. C"] {
            let provider = Provider::new(name, "neurology");
            db.insert(Provider::TABLE, &provider.to_row()).await.unwrap();
        }

        let first: Option<Provider> = fetch_one(&db, &Filter::new().eq("name", "Dr. B"))
            .await
            .unwrap();
        assert_eq!(first.unwrap().name, "Dr. B");

        let all: Vec<Provider> = fetch_all(
            &db,
            &Query::new().order_by("name", crate::row::SortOrder::Desc),
        )
        .await
        .unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Dr. C", "Dr. B", "Dr. A"]);
    }
}
