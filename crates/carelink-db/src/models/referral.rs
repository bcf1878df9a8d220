//! Referral model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, new_id};
use crate::error::CodecError;
use crate::row::Row;
use crate::utils::encode_list;

/// Allowed values for [`Referral::urgency`]
pub const URGENCY_LEVELS: &[&str] = &["low", "medium", "high", "urgent"];

/// Allowed values for [`Referral::status`]
pub const REFERRAL_STATUSES: &[&str] = &[
    "Pending",
    "Approved",
    "Rejected",
    "Scheduled",
    "Completed",
    "Cancelled",
];

/// Referral of a patient to a specialist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    pub patient_id: String,
    pub referring_provider_id: Option<String>,
    pub receiving_provider_id: Option<String>,
    pub specialty: String,
    pub reason: String,
    pub description: Option<String>,
    pub urgency: String,
    pub status: String,
    /// Human-facing identifier; generated on create when left empty
    pub tracking_number: String,
    pub diagnosis_codes: Vec<String>,
    pub ai_confidence: Option<f64>,
    pub notes: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    /// Create a pending referral with a generated id and fresh timestamps
    pub fn new(
        patient_id: impl Into<String>,
        specialty: impl Into<String>,
        reason: impl Into<String>,
        urgency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            patient_id: patient_id.into(),
            referring_provider_id: None,
            receiving_provider_id: None,
            specialty: specialty.into(),
            reason: reason.into(),
            description: None,
            urgency: urgency.into(),
            status: "Pending".to_string(),
            tracking_number: String::new(),
            diagnosis_codes: Vec::new(),
            ai_confidence: None,
            notes: None,
            scheduled_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = tracking_number.into();
        self
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status.as_str(), "Pending" | "Approved" | "Scheduled")
    }
}

impl Entity for Referral {
    const TABLE: &'static str = "referrals";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "patient_id",
        "referring_provider_id",
        "receiving_provider_id",
        "specialty",
        "reason",
        "description",
        "urgency",
        "status",
        "tracking_number",
        "diagnosis_codes",
        "ai_confidence",
        "notes",
        "scheduled_date",
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
            .with("referring_provider_id", self.referring_provider_id.as_ref())
            .with("receiving_provider_id", self.receiving_provider_id.as_ref())
            .with("specialty", &self.specialty)
            .with("reason", &self.reason)
            .with("description", self.description.as_ref())
            .with("urgency", &self.urgency)
            .with("status", &self.status)
            .with("tracking_number", &self.tracking_number)
            .with("diagnosis_codes", encode_list(&self.diagnosis_codes))
            .with("ai_confidence", self.ai_confidence)
            .with("notes", self.notes.as_ref())
            .with("scheduled_date", self.scheduled_date)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, CodecError> {
        row.ensure_known_columns(Self::COLUMNS)?;
        Ok(Referral {
            id: row.text("id")?,
            patient_id: row.text("patient_id")?,
            referring_provider_id: row.opt_text("referring_provider_id")?,
            receiving_provider_id: row.opt_text("receiving_provider_id")?,
            specialty: row.text("specialty")?,
            reason: row.text("reason")?,
            description: row.opt_text("description")?,
            urgency: row.text("urgency")?,
            status: row.text("status")?,
            tracking_number: row.text("tracking_number")?,
            diagnosis_codes: row.list("diagnosis_codes")?,
            ai_confidence: row.opt_real("ai_confidence")?,
            notes: row.opt_text("notes")?,
            scheduled_date: row.opt_timestamp("scheduled_date")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
