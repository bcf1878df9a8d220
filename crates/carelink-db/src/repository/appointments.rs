//! Appointment operations

use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::{Appointment, Entity};
use crate::repository::Database;
use crate::row::{Filter, Query, Row, SortOrder};
use crate::store::{RowStore, fetch_all, fetch_one};

impl Database {
    // ==================== Appointment Operations ====================

    /// Insert a new appointment
    pub async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), DbError> {
        self.insert(Appointment::TABLE, &appointment.to_row()).await?;
        Ok(())
    }

    /// Get an appointment by ID
    pub async fn get_appointment(&self, id: &str) -> Result<Option<Appointment>, DbError> {
        fetch_one(self, &Filter::by_id(id)).await
    }

    /// List a patient's appointments in chronological order
    pub async fn list_appointments_by_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<Appointment>, DbError> {
        let query = Query::new()
            .filter(Filter::new().eq("patient_id", patient_id))
            .order_by("scheduled_at", SortOrder::Asc);
        fetch_all(self, &query).await
    }

    /// List appointments that resulted from a referral
    pub async fn list_appointments_by_referral(
        &self,
        referral_id: &str,
    ) -> Result<Vec<Appointment>, DbError> {
        let query = Query::new()
            .filter(Filter::new().eq("referral_id", referral_id))
            .order_by("scheduled_at", SortOrder::Asc);
        fetch_all(self, &query).await
    }

    /// List scheduled appointments starting within `[from, to]`
    pub async fn list_upcoming_appointments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, DbError> {
        let query = Query::new()
            .filter(
                Filter::new()
                    .eq("status", "scheduled")
                    .between("scheduled_at", from, to),
            )
            .order_by("scheduled_at", SortOrder::Asc);
        fetch_all(self, &query).await
    }

    /// Replace an appointment's columns, stamping `updated_at`
    pub async fn update_appointment(&self, appointment: &Appointment) -> Result<bool, DbError> {
        let mut row = appointment.to_row();
        row.remove("id");
        row.remove("created_at");
        row.set("updated_at", Utc::now());
        let affected = self
            .update(Appointment::TABLE, &row, &Filter::by_id(&appointment.id))
            .await?;
        Ok(affected > 0)
    }

    /// Set an appointment's status
    pub async fn set_appointment_status(&self, id: &str, status: &str) -> Result<bool, DbError> {
        let row = Row::new()
            .with("status", status)
            .with("updated_at", Utc::now());
        let affected = self
            .update(Appointment::TABLE, &row, &Filter::by_id(id))
            .await?;
        Ok(affected > 0)
    }

    /// Delete an appointment
    pub async fn delete_appointment(&self, id: &str) -> Result<bool, DbError> {
        let affected = self.delete(Appointment::TABLE, &Filter::by_id(id)).await?;
        Ok(affected > 0)
    }

    /// Count appointments for a patient
    pub async fn count_appointments(&self, patient_id: &str) -> Result<i64, DbError> {
        self.count(Appointment::TABLE, &Filter::new().eq("patient_id", patient_id))
            .await
    }
}
