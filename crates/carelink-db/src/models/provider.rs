//! Provider model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, new_id};
use crate::error::CodecError;
use crate::row::Row;

/// Clinician or clinic that sends or receives referrals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub specialty: String,
    pub organization: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub accepting_referrals: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(name: impl Into<String>, specialty: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            specialty: specialty.into(),
            organization: None,
            phone: None,
            email: None,
            accepting_referrals: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Provider {
    const TABLE: &'static str = "providers";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "specialty",
        "organization",
        "phone",
        "email",
        "accepting_referrals",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("name", &self.name)
            .with("specialty", &self.specialty)
            .with("organization", self.organization.as_ref())
            .with("phone", self.phone.as_ref())
            .with("email", self.email.as_ref())
            .with("accepting_referrals", self.accepting_referrals)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, CodecError> {
        row.ensure_known_columns(Self::COLUMNS)?;
        Ok(Provider {
            id: row.text("id")?,
            name: row.text("name")?,
            specialty: row.text("specialty")?,
            organization: row.opt_text("organization")?,
            phone: row.opt_text("phone")?,
            email: row.opt_text("email")?,
            accepting_referrals: row.boolean("accepting_referrals")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
