//! Appointment model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, new_id};
use crate::error::CodecError;
use crate::row::Row;

/// Allowed values for [`Appointment::status`]
pub const APPOINTMENT_STATUSES: &[&str] = &["scheduled", "completed", "cancelled", "no_show"];

/// Scheduled visit, optionally resulting from a referral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub provider_id: Option<String>,
    pub referral_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub location: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(
        patient_id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            patient_id: patient_id.into(),
            provider_id: None,
            referral_id: None,
            scheduled_at,
            duration_minutes,
            location: None,
            status: "scheduled".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes)
    }
}

impl Entity for Appointment {
    const TABLE: &'static str = "appointments";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "patient_id",
        "provider_id",
        "referral_id",
        "scheduled_at",
        "duration_minutes",
        "location",
        "status",
        "notes",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("patient_id", &self.patient_id)
            .with("provider_id", self.provider_id.as_ref())
            .with("referral_id", self.referral_id.as_ref())
            .with("scheduled_at", self.scheduled_at)
            .with("duration_minutes", self.duration_minutes)
            .with("location", self.location.as_ref())
            .with("status", &self.status)
            .with("notes", self.notes.as_ref())
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, CodecError> {
        row.ensure_known_columns(Self::COLUMNS)?;
        Ok(Appointment {
            id: row.text("id")?,
            patient_id: row.text("patient_id")?,
            provider_id: row.opt_text("provider_id")?,
            referral_id: row.opt_text("referral_id")?,
            scheduled_at: row.timestamp("scheduled_at")?,
            duration_minutes: row.integer("duration_minutes")?,
            location: row.opt_text("location")?,
            status: row.text("status")?,
            notes: row.opt_text("notes")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
