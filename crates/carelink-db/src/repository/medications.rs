//! Medication operations

use chrono::Utc;

use crate::error::DbError;
use crate::models::{Entity, Medication};
use crate::repository::Database;
use crate::row::{Filter, Query, Row, SortOrder};
use crate::store::{RowStore, fetch_all, fetch_one};

impl Database {
    // ==================== Medication Operations ====================

    /// Insert a new medication
    pub async fn insert_medication(&self, medication: &Medication) -> Result<(), DbError> {
        self.insert(Medication::TABLE, &medication.to_row()).await?;
        Ok(())
    }

    /// Get a medication by ID
    pub async fn get_medication(&self, id: &str) -> Result<Option<Medication>, DbError> {
        fetch_one(self, &Filter::by_id(id)).await
    }

    /// List all medications for a patient, newest first
    pub async fn list_medications_by_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Medication>, DbError> {
        let query = Query::new()
            .filter(Filter::new().eq("patient_id", patient_id))
            .order_by("created_at", SortOrder::Desc);
        fetch_all(self, &query).await
    }

    /// List the medications a patient is currently taking
    pub async fn list_active_medications(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Medication>, DbError> {
        let query = Query::new()
            .filter(Filter::new().eq("patient_id", patient_id).eq("active", true))
            .order_by("name", SortOrder::Asc);
        fetch_all(self, &query).await
    }

    /// Replace a medication's columns, stamping `updated_at`
    pub async fn update_medication(&self, medication: &Medication) -> Result<bool, DbError> {
        let mut row = medication.to_row();
        row.remove("id");
        row.remove("created_at");
        row.set("updated_at", Utc::now());
        let affected = self
            .update(Medication::TABLE, &row, &Filter::by_id(&medication.id))
            .await?;
        Ok(affected > 0)
    }

    /// Mark a medication as no longer taken
    pub async fn discontinue_medication(&self, id: &str) -> Result<bool, DbError> {
        let today = Utc::now().date_naive();
        let row = Row::new()
            .with("active", false)
            .with("end_date", today)
            .with("updated_at", Utc::now());
        let affected = self
            .update(Medication::TABLE, &row, &Filter::by_id(id))
            .await?;
        Ok(affected > 0)
    }

    /// Delete a medication
    pub async fn delete_medication(&self, id: &str) -> Result<bool, DbError> {
        let affected = self.delete(Medication::TABLE, &Filter::by_id(id)).await?;
        Ok(affected > 0)
    }

    /// Count medications recorded for a patient
    pub async fn count_medications(&self, patient_id: &str) -> Result<i64, DbError> {
        self.count(Medication::TABLE, &Filter::new().eq("patient_id", patient_id))
            .await
    }
}
