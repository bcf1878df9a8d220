//! Provider operations

use chrono::Utc;

use crate::error::DbError;
use crate::models::{Entity, Provider};
use crate::repository::Database;
use crate::row::{Filter, Query, SortOrder};
use crate::store::{RowStore, fetch_all, fetch_one};

impl Database {
    // ==================== Provider Operations ====================

    /// Insert a new provider
    pub async fn insert_provider(&self, provider: &Provider) -> Result<(), DbError> {
        self.insert(Provider::TABLE, &provider.to_row()).await?;
        Ok(())
    }

    /// Get a provider by ID
    pub async fn get_provider(&self, id: &str) -> Result<Option<Provider>, DbError> {
        fetch_one(self, &Filter::by_id(id)).await
    }

    /// List providers of one specialty that currently accept referrals
    pub async fn list_providers_by_specialty(
        &self,
        specialty: &str,
    ) -> Result<Vec<Provider>, DbError> {
        let query = Query::new()
            .filter(
                Filter::new()
                    .eq("specialty", specialty)
                    .eq("accepting_referrals", true),
            )
            .order_by("name", SortOrder::Asc);
        fetch_all(self, &query).await
    }

    /// List all providers by name
    pub async fn list_providers(&self) -> Result<Vec<Provider>, DbError> {
        fetch_all(self, &Query::new().order_by("name", SortOrder::Asc)).await
    }

    /// Replace a provider's columns, stamping `updated_at`
    pub async fn update_provider(&self, provider: &Provider) -> Result<bool, DbError> {
        let mut row = provider.to_row();
        row.remove("id");
        row.remove("created_at");
        row.set("updated_at", Utc::now());
        let affected = self
            .update(Provider::TABLE, &row, &Filter::by_id(&provider.id))
            .await?;
        Ok(affected > 0)
    }

    /// Delete a provider
    pub async fn delete_provider(&self, id: &str) -> Result<bool, DbError> {
        let affected = self.delete(Provider::TABLE, &Filter::by_id(id)).await?;
        Ok(affected > 0)
    }

    /// Count providers
    pub async fn count_providers(&self) -> Result<i64, DbError> {
        self.count(Provider::TABLE, &Filter::new()).await
    }
}
