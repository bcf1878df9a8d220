//! Per-tenant billing settings

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Entity, new_id};
use crate::error::CodecError;
use crate::row::Row;
use crate::utils::to_json_text;

/// Billing configuration for one tenant
///
/// Fees are kept in minor currency units so the embedded JSON fee schedule
/// round-trips exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSettings {
    pub id: String,
    pub tenant_id: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// Fraction in `[0, 1]`
    pub tax_rate: f64,
    /// Service code -> fee in minor units
    pub fee_schedule: BTreeMap<String, i64>,
    pub invoice_prefix: String,
    pub updated_at: DateTime<Utc>,
}

impl BillingSettings {
    pub fn new(tenant_id: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            tenant_id: tenant_id.into(),
            currency: currency.into(),
            tax_rate: 0.0,
            fee_schedule: BTreeMap::new(),
            invoice_prefix: "INV".to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Fee for a service code including tax, in minor units
    pub fn gross_fee(&self, code: &str) -> Option<i64> {
        self.fee_schedule
            .get(code)
            .map(|net| (*net as f64 * (1.0 + self.tax_rate)).round() as i64)
    }

    /// Check the invariants the settings table does not enforce
    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.tax_rate)
            && self.currency.len() == 3
            && self.currency.chars().all(|c| c.is_ascii_uppercase())
            && self.fee_schedule.values().all(|fee| *fee >= 0)
    }
}

impl Entity for BillingSettings {
    const TABLE: &'static str = "billing_settings";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "tenant_id",
        "currency",
        "tax_rate",
        "fee_schedule",
        "invoice_prefix",
        "updated_at",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", &self.id)
            .with("tenant_id", &self.tenant_id)
            .with("currency", &self.currency)
            .with("tax_rate", self.tax_rate)
            .with("fee_schedule", to_json_text(&self.fee_schedule))
            .with("invoice_prefix", &self.invoice_prefix)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, CodecError> {
        row.ensure_known_columns(Self::COLUMNS)?;
        Ok(BillingSettings {
            id: row.text("id")?,
            tenant_id: row.text("tenant_id")?,
            currency: row.text("currency")?,
            tax_rate: row.real("tax_rate")?,
            fee_schedule: row.json("fee_schedule")?,
            invoice_prefix: row.text("invoice_prefix")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
