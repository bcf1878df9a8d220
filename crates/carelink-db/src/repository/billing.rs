//! Billing settings operations

use chrono::Utc;

use crate::error::DbError;
use crate::models::{BillingSettings, Entity};
use crate::repository::Database;
use crate::row::Filter;
use crate::store::{RowStore, fetch_one};

impl Database {
    // ==================== Billing Settings Operations ====================

    /// Get the billing settings of a tenant
    pub async fn get_billing_settings_for_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Option<BillingSettings>, DbError> {
        fetch_one(self, &Filter::new().eq("tenant_id", tenant_id)).await
    }

    /// Insert or replace the billing settings of a tenant
    ///
    /// The tenant's existing row keeps its id; the returned settings carry
    /// the id actually stored.
    pub async fn upsert_billing_settings(
        &self,
        settings: &BillingSettings,
    ) -> Result<BillingSettings, DbError> {
        if !settings.is_valid() {
            return Err(DbError::InvalidRecord(format!(
                "invalid billing settings for tenant {}",
                settings.tenant_id
            )));
        }

        let mut stored = settings.clone();
        stored.updated_at = Utc::now();

        match self.get_billing_settings_for_tenant(&settings.tenant_id).await? {
            Some(existing) => {
                stored.id = existing.id;
                let mut row = stored.to_row();
                row.remove("id");
                self.update(BillingSettings::TABLE, &row, &Filter::by_id(&stored.id))
                    .await?;
            }
            None => {
                self.insert(BillingSettings::TABLE, &stored.to_row()).await?;
            }
        }

        Ok(stored)
    }

    /// Delete the billing settings of a tenant
    pub async fn delete_billing_settings(&self, tenant_id: &str) -> Result<bool, DbError> {
        let affected = self
            .delete(
                BillingSettings::TABLE,
                &Filter::new().eq("tenant_id", tenant_id),
            )
            .await?;
        Ok(affected > 0)
    }
}
