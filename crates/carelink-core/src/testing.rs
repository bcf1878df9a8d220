//! Test doubles

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use carelink_db::{Database, DbError, Filter, Query, Row, RowStore, Value};
use chrono::Duration;

use crate::clock::ManualClock;
use crate::repository::RepositoryConfig;

/// Row store decorator that counts calls per operation
pub struct CountingStore {
    inner: Database,
    pub inserts: AtomicUsize,
    pub queries: AtomicUsize,
    pub raw_queries: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub counts: AtomicUsize,
}

impl CountingStore {
    pub async fn in_memory() -> Arc<Self> {
        let inner = Database::in_memory().await.unwrap();
        Arc::new(Self {
            inner,
            inserts: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            raw_queries: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
        })
    }

    pub fn database(&self) -> &Database {
        &self.inner
    }

    /// Reads of any kind: `query` plus `raw_query`
    pub fn reads(&self) -> usize {
        self.queries.load(Ordering::SeqCst) + self.raw_queries.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowStore for CountingStore {
    async fn insert(&self, table: &str, row: &Row) -> Result<i64, DbError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, row).await
    }

    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>, DbError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(table, query).await
    }

    async fn raw_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DbError> {
        self.raw_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.raw_query(sql, args).await
    }

    async fn update(&self, table: &str, row: &Row, filter: &Filter) -> Result<u64, DbError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(table, row, filter).await
    }

    async fn update_appending(
        &self,
        table: &str,
        row: &Row,
        column: &str,
        line: &str,
        filter: &Filter,
    ) -> Result<u64, DbError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner
            .update_appending(table, row, column, line, filter)
            .await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64, DbError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(table, filter).await
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<i64, DbError> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count(table, filter).await
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_now())
}

pub fn five_minute_config() -> RepositoryConfig {
    RepositoryConfig::default().with_ttl(Duration::minutes(5))
}
