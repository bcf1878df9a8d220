//! Database models
//!
//! Each model owns a pure, two-way mapping to a flat [`Row`]. Decoding is
//! strict: a row carrying a column the model does not declare is rejected
//! instead of silently dropped.

use crate::error::CodecError;
use crate::row::Row;

mod appointment;
mod billing;
mod medication;
mod patient;
mod provider;
mod referral;

pub use appointment::{APPOINTMENT_STATUSES, Appointment};
pub use billing::BillingSettings;
pub use medication::Medication;
pub use patient::{EmergencyContact, GENDERS, PATIENT_STATUSES, Patient};
pub use provider::Provider;
pub use referral::{REFERRAL_STATUSES, Referral, URGENCY_LEVELS};

/// A model persisted as one row of one table
pub trait Entity: Clone + Send + Sync + 'static {
    /// Backing table name
    const TABLE: &'static str;

    /// Every column of the backing table
    const COLUMNS: &'static [&'static str];

    /// Stable, client-generated primary key
    fn id(&self) -> &str;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self, CodecError>;
}

/// Generate a fresh client-side primary key
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;

    fn assert_columns_match<E: Entity>(entity: &E) {
        let row = entity.to_row();
        let mut written: Vec<&str> = row.columns().collect();
        let mut declared = E::COLUMNS.to_vec();
        written.sort_unstable();
        declared.sort_unstable();
        assert_eq!(written, declared, "column set drift in {}", E::TABLE);
    }

    #[test]
    fn test_to_row_writes_every_declared_column() {
        assert_columns_match(&Patient::new("Ada", "Lovelace"));
        assert_columns_match(&Referral::new("p1", "cardiology", "chest pain", "high"));
        assert_columns_match(&Medication::new("p1", "Metformin", "500mg", "twice daily"));
        assert_columns_match(&Appointment::new("p1", chrono::Utc::now(), 30));
        assert_columns_match(&Provider::new("Dr. Who", "general"));
        assert_columns_match(&BillingSettings::new("tenant-a", "USD"));
    }

    #[test]
    fn test_from_row_rejects_unknown_column() {
        let row = Provider::new("Dr. Who", "general")
            .to_row()
            .with("favourite_colour", Value::Text("blue".to_string()));
        assert_eq!(
            Provider::from_row(&row),
            Err(CodecError::UnknownColumn("favourite_colour".to_string()))
        );
    }

    #[test]
    fn test_from_row_rejects_missing_column() {
        let mut row = Provider::new("Dr. Who", "general").to_row();
        row.remove("specialty");
        assert_eq!(
            Provider::from_row(&row),
            Err(CodecError::MissingColumn("specialty".to_string()))
        );
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
        assert_eq!(new_id().len(), 36);
    }
}
