//! Patient repository

use std::sync::Arc;

use carelink_db::utils::escape_like;
use carelink_db::{
    Filter, GENDERS, PATIENT_STATUSES, Patient, Query, RowStore, SortOrder, Value, decode_rows,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;

use super::{CachedEntity, CachedRepository, RepositoryConfig};
use crate::cache::CacheStats;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::ChangeEvent;
use crate::validation::{
    require_list_items, require_non_empty, require_one_of, require_optional_one_of,
};

impl CachedEntity for Patient {
    const KIND: &'static str = "patient";
    const ALLOWED_STATUSES: &'static [&'static str] = PATIENT_STATUSES;

    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty("first_name", &self.first_name)?;
        require_non_empty("last_name", &self.last_name)?;
        require_optional_one_of("gender", self.gender.as_deref(), GENDERS)?;
        require_one_of("status", &self.status, PATIENT_STATUSES)?;
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(CoreError::Validation(format!(
                    "email is not an address: '{}'",
                    email
                )));
            }
        }
        require_list_items("allergies", &self.allergies)?;
        require_list_items("conditions", &self.conditions)?;
        Ok(())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn listing_query() -> Query {
        Query::new().order_by("last_name", SortOrder::Asc)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub status: Option<String>,
    /// Substring of the last name
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PatientFilter {
    fn to_query(&self) -> Query {
        let mut filter = Filter::new();
        if let Some(status) = &self.status {
            filter = filter.eq("status", status);
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            filter = filter.contains("last_name", name);
        }

        let mut query = Query::new()
            .filter(filter)
            .order_by("last_name", SortOrder::Asc);
        query.limit = self.limit;
        query.offset = self.offset;
        query
    }
}

const SEARCH_SQL: &str = r#"
    SELECT * FROM patients
    WHERE first_name LIKE ? ESCAPE '\' OR last_name LIKE ? ESCAPE '\'
       OR medical_record_number LIKE ? ESCAPE '\'
    ORDER BY last_name, first_name
"#;

const UPCOMING_SQL: &str = r#"
    SELECT DISTINCT p.* FROM patients p
    JOIN appointments a ON a.patient_id = p.id
    WHERE a.status = 'scheduled' AND a.scheduled_at BETWEEN ? AND ?
    ORDER BY p.last_name, p.first_name
"#;

/// Cached access to patients
pub struct PatientRepository<S: ?Sized> {
    inner: Arc<CachedRepository<Patient, S>>,
}

impl<S: ?Sized> Clone for PatientRepository<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: RowStore + ?Sized + 'static> PatientRepository<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RepositoryConfig) -> Self {
        Self {
            inner: Arc::new(CachedRepository::new(store, clock, config)),
        }
    }

    pub fn shared(&self) -> Arc<CachedRepository<Patient, S>> {
        self.inner.clone()
    }

    pub async fn create(&self, patient: Patient) -> Result<String, CoreError> {
        self.inner.create(patient).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Patient>, CoreError> {
        self.inner.get_by_id(id).await
    }

    pub async fn update(&self, patient: Patient) -> Result<bool, CoreError> {
        self.inner.update(patient).await
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: &str,
        note: Option<&str>,
    ) -> Result<bool, CoreError> {
        self.inner.update_status(id, status, note).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, CoreError> {
        self.inner.delete(id).await
    }

    pub async fn list(&self, filter: &PatientFilter) -> Result<Vec<Patient>, CoreError> {
        self.inner.list(&filter.to_query()).await
    }

    /// Match `term` literally anywhere in the first name, last name or record
    /// number
    pub async fn search(&self, term: &str) -> Result<Vec<Patient>, CoreError> {
        let pattern = Value::from(format!("%{}%", escape_like(term.trim())));
        let rows = self
            .inner
            .store()
            .raw_query(SEARCH_SQL, &[pattern.clone(), pattern.clone(), pattern])
            .await?;
        Ok(decode_rows(&rows)?)
    }

    /// Patients with a scheduled appointment between now and `now + horizon`
    pub async fn with_upcoming_appointments(
        &self,
        horizon: Duration,
    ) -> Result<Vec<Patient>, CoreError> {
        let now = self.inner.now();
        let rows = self
            .inner
            .store()
            .raw_query(UPCOMING_SQL, &[Value::from(now), Value::from(now + horizon)])
            .await?;
        Ok(decode_rows(&rows)?)
    }

    pub fn clear_cache(&self, id: Option<&str>) -> usize {
        self.inner.clear_cache(id)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<Patient>> {
        self.inner.subscribe()
    }

    pub fn subscribe_listing(&self) -> broadcast::Receiver<Arc<Vec<Patient>>> {
        self.inner.subscribe_listing()
    }
}
