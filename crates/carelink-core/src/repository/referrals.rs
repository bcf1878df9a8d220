//! Referral repository

use std::collections::BTreeMap;
use std::sync::Arc;

use carelink_db::{
    DbError, Filter, Query, REFERRAL_STATUSES, Referral, RowStore, SortOrder, URGENCY_LEVELS,
    Value, decode_rows, fetch_one,
};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{CachedEntity, CachedRepository, RepositoryConfig};
use crate::cache::CacheStats;
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::ChangeEvent;
use crate::tracking::{estimate_ai_confidence, generate_tracking_number};
use crate::validation::{require_in_range, require_list_items, require_non_empty, require_one_of};

impl CachedEntity for Referral {
    const KIND: &'static str = "referral";
    const ALLOWED_STATUSES: &'static [&'static str] = REFERRAL_STATUSES;

    fn validate(&self) -> Result<(), CoreError> {
        require_non_empty("patient_id", &self.patient_id)?;
        require_non_empty("specialty", &self.specialty)?;
        require_non_empty("reason", &self.reason)?;
        require_non_empty("tracking_number", &self.tracking_number)?;
        require_one_of("urgency", &self.urgency, URGENCY_LEVELS)?;
        require_one_of("status", &self.status, REFERRAL_STATUSES)?;
        require_list_items("diagnosis_codes", &self.diagnosis_codes)?;
        if let Some(confidence) = self.ai_confidence {
            require_in_range("ai_confidence", confidence, 0.0, 1.0)?;
        }
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
}

/// Optional criteria for [`ReferralRepository::list`]; unset fields match all
#[derive(Debug, Clone, Default)]
pub struct ReferralFilter {
    pub patient_id: Option<String>,
    pub status: Option<String>,
    pub urgency: Option<String>,
    pub specialty: Option<String>,
    /// Inclusive `created_at` window
    pub created_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Substring of the reason
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ReferralFilter {
    fn to_query(&self) -> Query {
        let mut filter = Filter::new();
        if let Some(patient_id) = &self.patient_id {
            filter = filter.eq("patient_id", patient_id);
        }
        if let Some(status) = &self.status {
            filter = filter.eq("status", status);
        }
        if let Some(urgency) = &self.urgency {
            filter = filter.eq("urgency", urgency);
        }
        if let Some(specialty) = &self.specialty {
            filter = filter.eq("specialty", specialty);
        }
        if let Some((from, to)) = self.created_between {
            filter = filter.between("created_at", from, to);
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            filter = filter.contains("reason", search);
        }

        let mut query = Query::new()
            .filter(filter)
            .order_by("created_at", SortOrder::Desc);
        query.limit = self.limit;
        query.offset = self.offset;
        query
    }
}

/// Cached access to referrals, plus tracking-number handling
pub struct ReferralRepository<S: ?Sized> {
    inner: Arc<CachedRepository<Referral, S>>,
}

impl<S: ?Sized> Clone for ReferralRepository<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: RowStore + ?Sized + 'static> ReferralRepository<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RepositoryConfig) -> Self {
        Self {
            inner: Arc::new(CachedRepository::new(store, clock, config)),
        }
    }

    /// The generic repository, e.g. for [`super::spawn_listing_refresh_task`]
    pub fn shared(&self) -> Arc<CachedRepository<Referral, S>> {
        self.inner.clone()
    }

    /// Create a referral, filling in the tracking number and confidence
    ///
    /// Fails with `DuplicateKey` if the tracking number is already taken. The
    /// pre-check is not atomic; the store's unique index rejects a racing
    /// insert with the same error.
    pub async fn create(&self, mut referral: Referral) -> Result<String, CoreError> {
        if referral.tracking_number.trim().is_empty() {
            referral.tracking_number = generate_tracking_number(self.inner.now());
        }
        if referral.ai_confidence.is_none() {
            referral.ai_confidence = Some(estimate_ai_confidence(&referral));
        }
        referral.validate()?;

        if self
            .get_by_tracking_number(&referral.tracking_number)
            .await?
            .is_some()
        {
            warn!(
                "Rejected referral with existing tracking number {}",
                referral.tracking_number
            );
            return Err(CoreError::DuplicateKey(format!(
                "tracking number {} already exists",
                referral.tracking_number
            )));
        }

        self.inner.create(referral).await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Referral>, CoreError> {
        self.inner.get_by_id(id).await
    }

    /// Cache scan first, then a store lookup that repopulates the cache
    pub async fn get_by_tracking_number(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Referral>, CoreError> {
        if let Some(hit) = self
            .inner
            .find_cached(|r| r.tracking_number == tracking_number)
        {
            return Ok(Some(hit));
        }

        let filter = Filter::new().eq("tracking_number", tracking_number);
        let found: Option<Referral> = fetch_one(self.inner.store().as_ref(), &filter).await?;
        if let Some(referral) = &found {
            debug!("Tracking number {} resolved from store", tracking_number);
            self.inner.populate(referral.clone());
        }
        Ok(found)
    }

    pub async fn update(&self, referral: Referral) -> Result<bool, CoreError> {
        self.inner.update(referral).await
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

    /// Newest first; bypasses the cache
    pub async fn list(&self, filter: &ReferralFilter) -> Result<Vec<Referral>, CoreError> {
        self.inner.list(&filter.to_query()).await
    }

    pub async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<Referral>, CoreError> {
        let filter = ReferralFilter {
            patient_id: Some(patient_id.to_string()),
            ..Default::default()
        };
        self.list(&filter).await
    }

    /// Number of referrals per status; statuses with no referrals are absent
    pub async fn count_by_status(&self) -> Result<BTreeMap<String, i64>, CoreError> {
        let rows = self
            .inner
            .store()
            .raw_query(
                "SELECT status, COUNT(*) AS count FROM referrals GROUP BY status ORDER BY status",
                &[],
            )
            .await?;

        let mut counts = BTreeMap::new();
        for row in &rows {
            let status = row.text("status").map_err(DbError::from)?;
            let count = row.integer("count").map_err(DbError::from)?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    /// Pending referrals with high or urgent urgency, oldest first
    pub async fn urgent_pending(&self) -> Result<Vec<Referral>, CoreError> {
        let rows = self
            .inner
            .store()
            .raw_query(
                "SELECT * FROM referrals WHERE status = ? AND urgency IN (?, ?) ORDER BY created_at ASC",
                &[
                    Value::from("Pending"),
                    Value::from("high"),
                    Value::from("urgent"),
                ],
            )
            .await?;
        Ok(decode_rows(&rows)?)
    }

    pub fn clear_cache(&self, id: Option<&str>) -> usize {
        self.inner.clear_cache(id)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<Referral>> {
        self.inner.subscribe()
    }

    pub fn subscribe_listing(&self) -> broadcast::Receiver<Arc<Vec<Referral>>> {
        self.inner.subscribe_listing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::repository::spawn_listing_refresh_task;
    use crate::clock::Clock;
    use crate::testing::{CountingStore, five_minute_config, manual_clock};
    use crate::tracking::is_tracking_number;
    use carelink_db::Row;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    async fn setup() -> (
        ReferralRepository<CountingStore>,
        Arc<CountingStore>,
        Arc<crate::clock::ManualClock>,
    ) {
        let store = CountingStore::in_memory().await;
        let clock = manual_clock();
        let repo = ReferralRepository::new(store.clone(), clock.clone(), five_minute_config());
        (repo, store, clock)
    }

    #[tokio::test]
    async fn test_end_to_end_create_then_cached_read() {
        let (repo, store, _clock) = setup().await;
        let referral = Referral::new("P1", "cardiology", "palpitations", "high");

        let id = repo.create(referral).await.unwrap();
        let reads_after_create = store.reads();

        let fetched = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(store.reads(), reads_after_create, "served from cache");
        assert!(is_tracking_number(&fetched.tracking_number));
        assert_eq!(fetched.ai_confidence, Some(0.85));
        assert_eq!(fetched.patient_id, "P1");

        let stored: Referral = fetch_one(store.database(), &Filter::by_id(&id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, fetched);
    }

    #[tokio::test]
    async fn test_severe_description_raises_confidence() {
        let (repo, _store, _clock) = setup().await;
        let referral = Referral::new("P1", "neurology", "headache", "urgent")
            .with_description("Severe migraine with aura");

        let id = repo.create(referral).await.unwrap();
        let fetched = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.ai_confidence, Some(0.95));
    }

    #[tokio::test]
    async fn test_stale_entry_is_reread_once() {
        let (repo, store, clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();

        // Change the row behind the cache's back
        store
            .database()
            .update(
                "referrals",
                &Row::new().with("specialty", "electrophysiology"),
                &Filter::by_id(&id),
            )
            .await
            .unwrap();

        clock.advance(Duration::minutes(4));
        let cached = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(cached.specialty, "cardiology");

        clock.advance(Duration::minutes(1));
        let before = store.reads();
        let fresh = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(store.reads(), before + 1);
        assert_eq!(fresh.specialty, "electrophysiology");

        // Repopulated with a new window
        clock.advance(Duration::minutes(4));
        repo.get_by_id(&id).await.unwrap();
        assert_eq!(store.reads(), before + 1);
    }

    #[tokio::test]
    async fn test_update_status_evicts_entry() {
        let (repo, store, _clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();
        let mut events = repo.subscribe();

        assert!(repo.update_status(&id, "Approved", None).await.unwrap());
        let before = store.reads();

        let fetched = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(store.reads(), before + 1, "entry was evicted");
        assert_eq!(fetched.status, "Approved");

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::StatusChanged);
        assert_eq!(event.new_status.as_deref(), Some("Approved"));
        assert!(event.entity.is_none());
    }

    #[tokio::test]
    async fn test_update_status_appends_notes() {
        let (repo, _store, _clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();

        repo.update_status(&id, "Approved", Some("accepted by clinic"))
            .await
            .unwrap();
        repo.update_status(&id, "Scheduled", Some("booked for monday"))
            .await
            .unwrap();

        let notes = repo.get_by_id(&id).await.unwrap().unwrap().notes.unwrap();
        let lines: Vec<_> = notes.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Approved: accepted by clinic"));
        assert!(lines[1].ends_with("Scheduled: booked for monday"));
    }

    #[tokio::test]
    async fn test_status_change_with_lagging_clock_keeps_timestamps_ordered() {
        let store = CountingStore::in_memory().await;
        let clock = Arc::new(crate::clock::ManualClock::new(
            Utc::now() - Duration::minutes(10),
        ));
        let repo = ReferralRepository::new(store.clone(), clock, five_minute_config());

        let referral = Referral::new("P1", "cardiology", "palpitations", "high");
        let created_at = referral.created_at;
        let id = repo.create(referral).await.unwrap();

        assert!(repo.update_status(&id, "Approved", None).await.unwrap());
        let stored = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.created_at, created_at);
        assert!(stored.updated_at >= stored.created_at);

        assert!(repo.update_status(&id, "Scheduled", Some("booked")).await.unwrap());
        let stored = repo.get_by_id(&id).await.unwrap().unwrap();
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_status_notes_are_all_kept() {
        let (repo, _store, _clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();

        for _ in 0..20 {
            let (a, b) = tokio::join!(
                repo.update_status(&id, "Approved", Some("note-a")),
                repo.update_status(&id, "Scheduled", Some("note-b")),
            );
            assert!(a.unwrap());
            assert!(b.unwrap());
        }

        let notes = repo.get_by_id(&id).await.unwrap().unwrap().notes.unwrap();
        let lines: Vec<_> = notes.lines().collect();
        assert_eq!(lines.len(), 40);
        assert_eq!(lines.iter().filter(|l| l.ends_with("note-a")).count(), 20);
        assert_eq!(lines.iter().filter(|l| l.ends_with("note-b")).count(), 20);
    }

    #[tokio::test]
    async fn test_zero_channel_capacity_in_config_literal() {
        let store = CountingStore::in_memory().await;
        let config = RepositoryConfig {
            channel_capacity: 0,
            ..five_minute_config()
        };
        let repo = ReferralRepository::new(store, manual_clock(), config);
        let mut events = repo.subscribe();

        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap().entity_id, id);
    }

    #[tokio::test]
    async fn test_update_status_rejects_unknown_status() {
        let (repo, store, _clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();

        let result = repo.update_status(&id, "approved", None).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);

        assert!(!repo.update_status("missing", "Approved", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_tracking_number_rejected() {
        let (repo, store, _clock) = setup().await;
        let first = Referral::new("P1", "cardiology", "palpitations", "high")
            .with_tracking_number("REF-1700000000000-0001");
        repo.create(first).await.unwrap();

        let second = Referral::new("P2", "dermatology", "rash", "low")
            .with_tracking_number("REF-1700000000000-0001");
        let result = repo.create(second).await;
        assert!(matches!(result, Err(CoreError::DuplicateKey(_))));
        assert_eq!(store.insert_calls(), 1);
        assert_eq!(
            store.database().count("referrals", &Filter::new()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_unique_index_catches_skipped_precheck() {
        let (repo, _store, _clock) = setup().await;
        let tracking = "REF-1700000000000-0002";
        repo.create(
            Referral::new("P1", "cardiology", "palpitations", "high").with_tracking_number(tracking),
        )
        .await
        .unwrap();

        // Same insert through the generic path, as a racing create would do
        let racer = Referral::new("P2", "dermatology", "rash", "low").with_tracking_number(tracking);
        let result = repo.shared().create(racer).await;
        assert!(matches!(result, Err(CoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_insert() {
        let (repo, store, _clock) = setup().await;

        let empty_patient = Referral::new("", "cardiology", "palpitations", "high");
        let result = repo.create(empty_patient).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let bad_urgency = Referral::new("P1", "cardiology", "palpitations", "critical");
        let result = repo.create(bad_urgency).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let mut bad_confidence = Referral::new("P1", "cardiology", "palpitations", "high");
        bad_confidence.ai_confidence = Some(1.5);
        assert!(repo.create(bad_confidence).await.is_err());

        assert_eq!(store.insert_calls(), 0);
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_get_by_tracking_number_falls_back_to_store() {
        let (repo, store, _clock) = setup().await;
        let id = repo
            .create(
                Referral::new("P1", "cardiology", "palpitations", "high")
                    .with_tracking_number("REF-1700000000000-0003"),
            )
            .await
            .unwrap();

        let reads = store.reads();
        let hit = repo
            .get_by_tracking_number("REF-1700000000000-0003")
            .await
            .unwrap();
        assert_eq!(hit.unwrap().id, id);
        assert_eq!(store.reads(), reads);

        repo.clear_cache(None);
        let miss = repo
            .get_by_tracking_number("REF-1700000000000-0003")
            .await
            .unwrap();
        assert_eq!(miss.unwrap().id, id);
        assert_eq!(store.reads(), reads + 1);

        // Repopulated: the id lookup is a hit again
        repo.get_by_id(&id).await.unwrap();
        assert_eq!(store.reads(), reads + 1);

        assert!(
            repo.get_by_tracking_number("REF-0-0")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_refreshes_entry_and_publishes() {
        let (repo, store, clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();
        let mut events = repo.subscribe();

        let mut referral = repo.get_by_id(&id).await.unwrap().unwrap();
        clock.advance(Duration::minutes(1));
        referral.receiving_provider_id = Some("prov-9".to_string());
        assert!(repo.update(referral).await.unwrap());

        let reads = store.reads();
        let fetched = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(store.reads(), reads);
        assert_eq!(fetched.receiving_provider_id.as_deref(), Some("prov-9"));
        assert!(fetched.updated_at > fetched.created_at);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Updated);
        assert_eq!(event.entity.unwrap().id, id);

        let ghost = Referral::new("P1", "cardiology", "x", "low").with_tracking_number("REF-1-1");
        assert!(!repo.update(ghost).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_evicts_and_publishes() {
        let (repo, _store, _clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();
        let mut events = repo.subscribe();

        assert!(repo.delete(&id).await.unwrap());
        assert!(repo.get_by_id(&id).await.unwrap().is_none());
        assert!(!repo.delete(&id).await.unwrap());

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert_eq!(event.entity_id, id);
    }

    #[tokio::test]
    async fn test_list_filters_and_pushes_listing() {
        let (repo, _store, clock) = setup().await;
        for (patient, urgency, reason) in [
            ("P1", "high", "chest pain"),
            ("P1", "low", "routine check"),
            ("P2", "urgent", "chest tightness"),
        ] {
            let mut referral = Referral::new(patient, "cardiology", reason, urgency);
            referral.created_at = clock.now();
            referral.updated_at = referral.created_at;
            repo.create(referral).await.unwrap();
            clock.advance(Duration::seconds(1));
        }
        let mut listings = repo.subscribe_listing();

        let by_patient = repo.list_by_patient("P1").await.unwrap();
        assert_eq!(by_patient.len(), 2);
        assert_eq!(by_patient[0].reason, "routine check", "newest first");
        assert_eq!(listings.recv().await.unwrap().len(), 2);

        let search = ReferralFilter {
            search: Some("chest".to_string()),
            limit: Some(1),
            ..Default::default()
        };
        let page = repo.list(&search).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].patient_id, "P2");

        let urgent = repo.urgent_pending().await.unwrap();
        let reasons: Vec<_> = urgent.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons, vec!["chest pain", "chest tightness"]);
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let (repo, _store, _clock) = setup().await;
        let a = repo
            .create(Referral::new("P1", "cardiology", "a", "high"))
            .await
            .unwrap();
        repo.create(Referral::new("P1", "cardiology", "b", "high"))
            .await
            .unwrap();
        repo.update_status(&a, "Completed", None).await.unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get("Pending"), Some(&1));
        assert_eq!(counts.get("Completed"), Some(&1));
        assert_eq!(counts.get("Rejected"), None);
    }

    #[tokio::test]
    async fn test_listing_refresh_is_debounced() {
        let store = CountingStore::in_memory().await;
        let config = five_minute_config()
            .with_listing_refresh_interval(std::time::Duration::from_millis(20));
        let repo = ReferralRepository::new(store.clone(), manual_clock(), config.clone());
        let mut listings = repo.subscribe_listing();

        for reason in ["a", "b", "c"] {
            repo.create(Referral::new("P1", "cardiology", reason, "low"))
                .await
                .unwrap();
        }
        let handle = spawn_listing_refresh_task(repo.shared(), config.listing_refresh_interval);

        let pushed = tokio::time::timeout(std::time::Duration::from_secs(2), listings.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pushed.len(), 3);

        // No writes since the last push, so nothing else arrives
        let idle = tokio::time::timeout(std::time::Duration::from_millis(100), listings.recv()).await;
        assert!(idle.is_err());
        handle.abort();
    }

    #[tokio::test]
    async fn test_clear_cache_leaves_store_untouched() {
        let (repo, store, _clock) = setup().await;
        let id = repo
            .create(Referral::new("P1", "cardiology", "palpitations", "high"))
            .await
            .unwrap();

        assert_eq!(repo.clear_cache(Some(&id)), 1);
        assert_eq!(repo.clear_cache(Some(&id)), 0);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
        assert!(repo.get_by_id(&id).await.unwrap().is_some());
        assert_eq!(repo.stats().entry_count, 1);
    }
}
