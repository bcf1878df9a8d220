//! Cached repositories
//!
//! [`CachedRepository`] is the generic read-through cache in front of the
//! row store. Reads within the TTL are served from memory; every successful
//! write refreshes or evicts the entry in the same call:
//!
//! - `create` and `update` refresh the entry with the written value;
//! - `update_status` evicts it, because the store appends to the notes
//!   column in the same statement and the cached copy would be missing that
//!   text;
//! - `delete` evicts it.
//!
//! Listing subscribers are not re-queried on every write. Writes mark the
//! listing dirty and [`spawn_listing_refresh_task`] re-lists at most once
//! per interval.

use std::sync::Arc;

use carelink_db::{Entity, Filter, Query, Row, RowStore, SortOrder, fetch_all, fetch_one};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, EntityCache};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::{ChangeEvent, ChangeNotifier, DEFAULT_CHANNEL_CAPACITY};
use crate::validation::require_one_of;

mod patients;
mod referrals;

pub use patients::{PatientFilter, PatientRepository};
pub use referrals::{ReferralFilter, ReferralRepository};

/// An entity that can sit behind a [`CachedRepository`]
pub trait CachedEntity: Entity {
    /// Human-readable name used in logs and error messages
    const KIND: &'static str;

    const STATUS_COLUMN: &'static str = "status";

    /// Column that status changes append their note to
    const NOTES_COLUMN: &'static str = "notes";

    const ALLOWED_STATUSES: &'static [&'static str];

    /// Check the entity before it is written
    fn validate(&self) -> Result<(), CoreError>;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Query used when the listing is recomputed for subscribers
    fn listing_query() -> Query {
        Query::new().order_by("created_at", SortOrder::Desc)
    }
}

/// Repository tuning
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// How long a cached entry stays fresh
    pub ttl: Duration,
    /// Capacity of the change and listing broadcast channels
    pub channel_capacity: usize,
    /// Debounce interval of the listing refresh task
    pub listing_refresh_interval: std::time::Duration,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            listing_refresh_interval: std::time::Duration::from_millis(500),
        }
    }
}

impl RepositoryConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_listing_refresh_interval(mut self, interval: std::time::Duration) -> Self {
        self.listing_refresh_interval = interval;
        self
    }
}

/// Read-through, time-expiring cache over one table of the row store
///
/// The row store stays the single source of truth; the cache only ever holds
/// values that were just read from or written to it.
pub struct CachedRepository<E, S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cache: EntityCache<E>,
    notifier: ChangeNotifier<E>,
    config: RepositoryConfig,
}

impl<E, S> CachedRepository<E, S>
where
    E: CachedEntity,
    S: RowStore + ?Sized,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RepositoryConfig) -> Self {
        info!(
            "Creating {} repository (ttl: {}s, channel capacity: {})",
            E::KIND,
            config.ttl.num_seconds(),
            config.channel_capacity
        );
        Self {
            cache: EntityCache::new(config.ttl, clock.clone()),
            notifier: ChangeNotifier::new(config.channel_capacity),
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Validate, insert, cache and announce a new entity
    pub async fn create(&self, entity: E) -> Result<String, CoreError> {
        entity.validate()?;
        self.store.insert(E::TABLE, &entity.to_row()).await?;

        let id = entity.id().to_string();
        debug!("Created {} {}", E::KIND, id);
        self.cache.put(&id, entity.clone());
        self.notifier
            .publish(ChangeEvent::created(&id, entity, self.now()));
        Ok(id)
    }

    /// Look up by primary key, serving fresh cache hits without a store read
    pub async fn get_by_id(&self, id: &str) -> Result<Option<E>, CoreError> {
        if let Some(hit) = self.cache.get_fresh(id) {
            return Ok(Some(hit));
        }

        let found: Option<E> = fetch_one(self.store.as_ref(), &Filter::by_id(id)).await?;
        match &found {
            Some(entity) => self.cache.put(id, entity.clone()),
            None => {
                self.cache.evict(id);
            }
        }
        Ok(found)
    }

    /// Best-effort scan over fresh cached values
    pub fn find_cached(&self, predicate: impl FnMut(&E) -> bool) -> Option<E> {
        self.cache.find(predicate)
    }

    /// Cache a value that was just read from the store
    pub(crate) fn populate(&self, entity: E) {
        let id = entity.id().to_string();
        self.cache.put(&id, entity);
    }

    /// Re-validate and persist the whole entity, refreshing its cache entry
    ///
    /// Returns `false` when no row carries the entity's id.
    pub async fn update(&self, mut entity: E) -> Result<bool, CoreError> {
        entity.validate()?;
        let now = self.now();
        let stamped = now.max(entity.created_at());
        entity.set_updated_at(stamped);

        let mut row = entity.to_row();
        row.remove("id");
        row.remove("created_at");

        let affected = self
            .store
            .update(E::TABLE, &row, &Filter::by_id(entity.id()))
            .await?;
        if affected == 0 {
            debug!("Update of missing {} {}", E::KIND, entity.id());
            return Ok(false);
        }

        let id = entity.id().to_string();
        self.cache.put(&id, entity.clone());
        self.notifier
            .publish(ChangeEvent::updated(&id, entity, now));
        Ok(true)
    }

    /// Change the status column only, optionally appending a note
    ///
    /// Nothing but the status value is validated. The note is appended by the
    /// store in the same statement as the status write, so concurrent status
    /// changes never drop each other's notes. The cache entry is evicted
    /// rather than refreshed.
    pub async fn update_status(
        &self,
        id: &str,
        status: &str,
        note: Option<&str>,
    ) -> Result<bool, CoreError> {
        require_one_of(E::STATUS_COLUMN, status, E::ALLOWED_STATUSES)?;
        let now = self.now();

        let filter = Filter::by_id(id);
        let Some(current) = fetch_one::<E, S>(self.store.as_ref(), &filter).await? else {
            return Ok(false);
        };
        // updated_at never precedes created_at, even with a clock behind the row
        let row = Row::new()
            .with(E::STATUS_COLUMN, status)
            .with("updated_at", now.max(current.created_at()));

        let affected = match note {
            Some(note) => {
                self.store
                    .update_appending(
                        E::TABLE,
                        &row,
                        E::NOTES_COLUMN,
                        &note_line(status, note, now),
                        &filter,
                    )
                    .await?
            }
            None => self.store.update(E::TABLE, &row, &filter).await?,
        };
        if affected == 0 {
            return Ok(false);
        }

        debug!("{} {} status -> {}", E::KIND, id, status);
        self.cache.evict(id);
        self.notifier
            .publish(ChangeEvent::status_changed(id, status, now));
        Ok(true)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, CoreError> {
        let affected = self.store.delete(E::TABLE, &Filter::by_id(id)).await?;
        self.cache.evict(id);
        if affected == 0 {
            return Ok(false);
        }

        debug!("Deleted {} {}", E::KIND, id);
        self.notifier
            .publish(ChangeEvent::deleted(id, self.now()));
        Ok(true)
    }

    /// Query the store directly and push the result to listing subscribers
    pub async fn list(&self, query: &Query) -> Result<Vec<E>, CoreError> {
        let items: Vec<E> = fetch_all(self.store.as_ref(), query).await?;
        self.notifier.publish_listing(Arc::new(items.clone()));
        Ok(items)
    }

    /// Recompute the default listing and push it, returning its length
    pub async fn refresh_listing(&self) -> Result<usize, CoreError> {
        let items: Vec<E> = fetch_all(self.store.as_ref(), &E::listing_query()).await?;
        let len = items.len();
        self.notifier.publish_listing(Arc::new(items));
        Ok(len)
    }

    /// Evict one entry, or every entry when `id` is `None`
    pub fn clear_cache(&self, id: Option<&str>) -> usize {
        match id {
            Some(id) => usize::from(self.cache.evict(id)),
            None => {
                let cleared = self.cache.clear();
                debug!("Cleared {} {} cache entries", cleared, E::KIND);
                cleared
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<E>> {
        self.notifier.subscribe()
    }

    pub fn subscribe_listing(&self) -> broadcast::Receiver<Arc<Vec<E>>> {
        self.notifier.subscribe_listing()
    }

    pub fn watch(&self) -> impl Stream<Item = ChangeEvent<E>> + Send + use<E, S> {
        self.notifier.watch()
    }

    pub(crate) fn notifier(&self) -> &ChangeNotifier<E> {
        &self.notifier
    }
}

fn note_line(status: &str, note: &str, at: DateTime<Utc>) -> String {
    format!(
        "[{}] {}: {}",
        at.format("%Y-%m-%d %H:%M:%S UTC"),
        status,
        note
    )
}

/// Spawn the debounced listing refresh
///
/// Every `interval`, re-lists once if a write happened since the last push
/// and at least one listing subscriber is attached. A failed refresh leaves
/// the listing dirty so the next tick retries it.
pub fn spawn_listing_refresh_task<E, S>(
    repo: Arc<CachedRepository<E, S>>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()>
where
    E: CachedEntity,
    S: RowStore + ?Sized + 'static,
{
    use tokio::time::{MissedTickBehavior, interval as ticker_interval};

    info!(
        "Starting {} listing refresh task (interval: {}ms)",
        E::KIND,
        interval.as_millis()
    );

    tokio::spawn(async move {
        let mut ticker = ticker_interval(interval.max(std::time::Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let notifier = repo.notifier();
            if !notifier.has_listing_subscribers() || !notifier.take_dirty() {
                continue;
            }

            match repo.refresh_listing().await {
                Ok(len) => debug!("Pushed {} listing ({} entries)", E::KIND, len),
                Err(e) => {
                    warn!("{} listing refresh failed: {}", E::KIND, e);
                    repo.notifier().mark_dirty();
                }
            }
        }
    })
}
