//! Medication model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, new_id};
use crate::error::CodecError;
use crate::row::Row;

/// Medication prescribed to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub route: Option<String>,
    pub prescribed_by: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    pub fn new(
        patient_id: impl Into<String>,
        name: impl Into<String>,
        dosage: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            patient_id: patient_id.into(),
            name: name.into(),
            dosage: dosage.into(),
            frequency: frequency.into(),
            route: None,
            prescribed_by: None,
            start_date: None,
            end_date: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Medication {
    const TABLE: &'static str = "medications";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "patient_id",
        "name",
        "dosage",
        "frequency",
        "route",
        "prescribed_by",
        "start_date",
        "end_date",
        "active",
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
            .with("name", &self.name)
            .with("dosage", &self.dosage)
            .with("frequency", &self.frequency)
            .with("route", self.route.as_ref())
            .with("prescribed_by", self.prescribed_by.as_ref())
            .with("start_date", self.start_date)
            .with("end_date", self.end_date)
            .with("active", self.active)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, CodecError> {
        row.ensure_known_columns(Self::COLUMNS)?;
        Ok(Medication {
            id: row.text("id")?,
            patient_id: row.text("patient_id")?,
            name: row.text("name")?,
            dosage: row.text("dosage")?,
            frequency: row.text("frequency")?,
            route: row.opt_text("route")?,
            prescribed_by: row.opt_text("prescribed_by")?,
            start_date: row.opt_date("start_date")?,
            end_date: row.opt_date("end_date")?,
            active: row.boolean("active")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
