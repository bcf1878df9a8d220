//! Patient model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, new_id};
use crate::error::CodecError;
use crate::row::Row;
use crate::utils::{encode_list, to_json_text};

/// Allowed values for [`Patient::gender`]
pub const GENDERS: &[&str] = &["male", "female", "other", "unknown"];

/// Allowed values for [`Patient::status`]
pub const PATIENT_STATUSES: &[&str] = &["Active", "Inactive", "Transferred", "Deceased"];

/// Person to call on the patient's behalf, stored as embedded JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub relationship: String,
    pub phone: String,
}

/// Patient record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub medical_record_number: Option<String>,
    pub insurance_provider: Option<String>,
    pub allergies: Vec<String>,
    pub conditions: Vec<String>,
    pub emergency_contact: Option<EmergencyContact>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Create an active patient with a generated id and fresh timestamps
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth: None,
            gender: None,
            phone: None,
            email: None,
            address: None,
            medical_record_number: None,
            insurance_provider: None,
            allergies: Vec::new(),
            conditions: Vec::new(),
            emergency_contact: None,
            status: "Active".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == "Active"
    }
}

impl Entity for Patient {
    const TABLE: &'static str = "patients";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "first_name",
        "last_name",
        "date_of_birth",
        "gender",
        "phone",
        "email",
        "address",
        "medical_record_number",
        "insurance_provider",
        "allergies",
        "conditions",
        "emergency_contact",
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
            .with("first_name", &self.first_name)
            .with("last_name", &self.last_name)
            .with("date_of_birth", self.date_of_birth)
            .with("gender", self.gender.as_ref())
            .with("phone", self.phone.as_ref())
            .with("email", self.email.as_ref())
            .with("address", self.address.as_ref())
            .with("medical_record_number", self.medical_record_number.as_ref())
            .with("insurance_provider", self.insurance_provider.as_ref())
            .with("allergies", encode_list(&self.allergies))
            .with("conditions", encode_list(&self.conditions))
            .with(
                "emergency_contact",
                self.emergency_contact.as_ref().map(to_json_text),
            )
            .with("status", &self.status)
            .with("notes", self.notes.as_ref())
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, CodecError> {
        row.ensure_known_columns(Self::COLUMNS)?;
        Ok(Patient {
            id: row.text("id")?,
            first_name: row.text("first_name")?,
            last_name: row.text("last_name")?,
            date_of_birth: row.opt_date("date_of_birth")?,
            gender: row.opt_text("gender")?,
            phone: row.opt_text("phone")?,
            email: row.opt_text("email")?,
            address: row.opt_text("address")?,
            medical_record_number: row.opt_text("medical_record_number")?,
            insurance_provider: row.opt_text("insurance_provider")?,
            allergies: row.list("allergies")?,
            conditions: row.list("conditions")?,
            emergency_contact: row.opt_json("emergency_contact")?,
            status: row.text("status")?,
            notes: row.opt_text("notes")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
