//! Flat rows and predicates exchanged with the row store

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;

use crate::error::{CodecError, DbError};
use crate::utils::{
    decode_list, escape_like, format_date, format_timestamp, is_identifier, parse_date,
    parse_timestamp,
};

/// Upper bound applied to any requested page size
pub const MAX_QUERY_LIMIT: i64 = 1000;

/// A single column value as stored by SQLite
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(format_timestamp(&v))
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Text(format_date(&v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A flat `column -> value` map, ordered by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column assignment
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.columns.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Reject any column that the target model does not declare
    pub fn ensure_known_columns(&self, known: &[&str]) -> Result<(), CodecError> {
        match self.columns().find(|c| !known.contains(c)) {
            Some(unknown) => Err(CodecError::UnknownColumn(unknown.to_string())),
            None => Ok(()),
        }
    }

    fn required(&self, column: &str) -> Result<&Value, CodecError> {
        self.columns
            .get(column)
            .ok_or_else(|| CodecError::MissingColumn(column.to_string()))
    }

    fn optional(&self, column: &str) -> Result<Option<&Value>, CodecError> {
        Ok(match self.required(column)? {
            Value::Null => None,
            value => Some(value),
        })
    }

    pub fn text(&self, column: &str) -> Result<String, CodecError> {
        expect_text(column, self.required(column)?)
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, CodecError> {
        self.optional(column)?
            .map(|v| expect_text(column, v))
            .transpose()
    }

    pub fn integer(&self, column: &str) -> Result<i64, CodecError> {
        expect_integer(column, self.required(column)?)
    }

    pub fn boolean(&self, column: &str) -> Result<bool, CodecError> {
        Ok(self.integer(column)? != 0)
    }

    pub fn real(&self, column: &str) -> Result<f64, CodecError> {
        expect_real(column, self.required(column)?)
    }

    pub fn opt_real(&self, column: &str) -> Result<Option<f64>, CodecError> {
        self.optional(column)?
            .map(|v| expect_real(column, v))
            .transpose()
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, CodecError> {
        let text = self.text(column)?;
        parse_timestamp(&text).map_err(|e| invalid(column, e))
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, CodecError> {
        self.opt_text(column)?
            .map(|text| parse_timestamp(&text).map_err(|e| invalid(column, e)))
            .transpose()
    }

    pub fn opt_date(&self, column: &str) -> Result<Option<NaiveDate>, CodecError> {
        self.opt_text(column)?
            .map(|text| parse_date(&text).map_err(|e| invalid(column, e)))
            .transpose()
    }

    /// A JSON array list column; `NULL` is the empty list
    pub fn list(&self, column: &str) -> Result<Vec<String>, CodecError> {
        self.opt_text(column)?
            .map(|text| decode_list(&text).map_err(|e| invalid(column, e)))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// An embedded JSON column
    pub fn json<T: DeserializeOwned>(&self, column: &str) -> Result<T, CodecError> {
        let text = self.text(column)?;
        serde_json::from_str(&text).map_err(|e| invalid(column, e))
    }

    pub fn opt_json<T: DeserializeOwned>(&self, column: &str) -> Result<Option<T>, CodecError> {
        self.opt_text(column)?
            .map(|text| serde_json::from_str(&text).map_err(|e| invalid(column, e)))
            .transpose()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

fn invalid(column: &str, reason: impl std::fmt::Display) -> CodecError {
    CodecError::InvalidValue {
        column: column.to_string(),
        reason: reason.to_string(),
    }
}

fn mismatch(column: &str, expected: &'static str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn expect_text(column: &str, value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(mismatch(column, "text", other)),
    }
}

fn expect_integer(column: &str, value: &Value) -> Result<i64, CodecError> {
    match value {
        Value::Integer(i) => Ok(*i),
        other => Err(mismatch(column, "integer", other)),
    }
}

fn expect_real(column: &str, value: &Value) -> Result<f64, CodecError> {
    match value {
        Value::Real(f) => Ok(*f),
        // REAL affinity may still hand back integral values
        Value::Integer(i) => Ok(*i as f64),
        other => Err(mismatch(column, "real", other)),
    }
}

/// A single term of a `WHERE` conjunction
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Between(String, Value, Value),
    Like(String, String),
}

impl Predicate {
    fn column(&self) -> &str {
        match self {
            Predicate::Eq(c, _) | Predicate::Between(c, _, _) | Predicate::Like(c, _) => c,
        }
    }
}

/// A conjunction of predicates with positional arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the primary-key filter every table shares
    pub fn by_id(id: &str) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.predicates
            .push(Predicate::Eq(column.to_string(), value.into()));
        self
    }

    pub fn between(
        mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.predicates.push(Predicate::Between(
            column.to_string(),
            low.into(),
            high.into(),
        ));
        self
    }

    /// Literal substring match; wildcards in `needle` are escaped
    pub fn contains(mut self, column: &str, needle: &str) -> Self {
        self.predicates.push(Predicate::Like(
            column.to_string(),
            format!("%{}%", escape_like(needle)),
        ));
        self
    }

    pub fn like(mut self, column: &str, pattern: impl Into<String>) -> Self {
        self.predicates
            .push(Predicate::Like(column.to_string(), pattern.into()));
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Render the `WHERE` clause (empty when there are no predicates) and its
    /// positional arguments
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), DbError> {
        if self.predicates.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let mut conditions = Vec::with_capacity(self.predicates.len());
        let mut args = Vec::new();
        for predicate in &self.predicates {
            let column = predicate.column();
            if !is_identifier(column) {
                return Err(DbError::InvalidQuery(format!(
                    "invalid column name: {}",
                    column
                )));
            }
            match predicate {
                Predicate::Eq(_, value) => {
                    conditions.push(format!("{} = ?", column));
                    args.push(value.clone());
                }
                Predicate::Between(_, low, high) => {
                    conditions.push(format!("{} BETWEEN ? AND ?", column));
                    args.push(low.clone());
                    args.push(high.clone());
                }
                Predicate::Like(_, pattern) => {
                    conditions.push(format!("{} LIKE ? ESCAPE '\\'", column));
                    args.push(Value::Text(pattern.clone()));
                }
            }
        }

        Ok((format!("WHERE {}", conditions.join(" AND ")), args))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// A single-table query: filter, ordering and pagination
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order_by = Some((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Normalizes pagination: negative offsets become zero, non-positive
    /// limits are dropped and oversized ones are capped
    pub fn validated(mut self) -> Self {
        if let Some(offset) = self.offset {
            if offset < 0 {
                self.offset = Some(0);
            }
        }
        if let Some(limit) = self.limit {
            if limit <= 0 {
                self.limit = None;
            } else if limit > MAX_QUERY_LIMIT {
                self.limit = Some(MAX_QUERY_LIMIT);
            }
        }
        self
    }

    /// Render the clauses that follow `FROM <table>`
    pub fn to_sql(&self) -> Result<(String, Vec<Value>), DbError> {
        let (mut sql, mut args) = self.filter.to_sql()?;

        if let Some((column, order)) = &self.order_by {
            if !is_identifier(column) {
                return Err(DbError::InvalidQuery(format!(
                    "invalid sort column: {}",
                    column
                )));
            }
            sql.push_str(&format!(" ORDER BY {} {}", column, order.as_sql()));
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                args.push(Value::Integer(limit));
                args.push(Value::Integer(offset.unwrap_or(0)));
            }
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                args.push(Value::Integer(offset));
            }
            (None, None) => {}
        }

        Ok((sql, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
        assert_eq!(Value::from(0.5), Value::Real(0.5));
    }

    #[test]
    fn test_row_accessors() {
        let row = Row::new()
            .with("name", "Ada")
            .with("age", 36i64)
            .with("score", 2i64)
            .with("note", None::<String>);

        assert_eq!(row.text("name").unwrap(), "Ada");
        assert_eq!(row.integer("age").unwrap(), 36);
        assert_eq!(row.real("score").unwrap(), 2.0);
        assert_eq!(row.opt_text("note").unwrap(), None);
        assert!(matches!(
            row.text("missing"),
            Err(CodecError::MissingColumn(_))
        ));
        assert!(matches!(
            row.text("age"),
            Err(CodecError::TypeMismatch { expected: "text", .. })
        ));
    }

    #[test]
    fn test_unknown_columns_rejected() {
        let row = Row::new().with("id", "1").with("extra", 1i64);
        assert!(row.ensure_known_columns(&["id"]).is_err());
        assert!(row.ensure_known_columns(&["id", "extra"]).is_ok());
    }

    #[test]
    fn test_filter_to_sql() {
        let filter = Filter::new()
            .eq("status", "Pending")
            .between("created_at", "a", "b")
            .contains("reason", "knee");
        let (sql, args) = filter.to_sql().unwrap();
        assert_eq!(
            sql,
            "WHERE status = ? AND created_at BETWEEN ? AND ? AND reason LIKE ? ESCAPE '\\'"
        );
        assert_eq!(args.len(), 4);
        assert_eq!(args[3], Value::Text("%knee%".to_string()));

        let (_, args) = Filter::new().contains("reason", "100%").to_sql().unwrap();
        assert_eq!(args[0], Value::Text(r"%100\%%".to_string()));

        let (sql, args) = Filter::new().to_sql().unwrap();
        assert!(sql.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn test_filter_rejects_bad_columns() {
        let filter = Filter::new().eq("status = 1 OR 1", "x");
        assert!(matches!(filter.to_sql(), Err(DbError::InvalidQuery(_))));
    }

    #[test]
    fn test_query_validated() {
        let q = Query::new().limit(0).offset(-5).validated();
        assert_eq!(q.limit, None);
        assert_eq!(q.offset, Some(0));

        let q = Query::new().limit(50_000).validated();
        assert_eq!(q.limit, Some(MAX_QUERY_LIMIT));
    }

    #[test]
    fn test_query_to_sql() {
        let q = Query::new()
            .filter(Filter::by_id("abc"))
            .order_by("created_at", SortOrder::Desc)
            .limit(10)
            .offset(20);
        let (sql, args) = q.to_sql().unwrap();
        assert_eq!(sql, "WHERE id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?");
        assert_eq!(
            args,
            vec![
                Value::Text("abc".to_string()),
                Value::Integer(10),
                Value::Integer(20)
            ]
        );

        let bad = Query::new().order_by("bad column", SortOrder::Asc);
        assert!(matches!(bad.to_sql(), Err(DbError::InvalidQuery(_))));
    }
}
