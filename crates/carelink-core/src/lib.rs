//! CareLink Core
//!
//! This crate provides the cached repositories for the hot entities
//! (patients and referrals): a time-expiring read-through cache in front of
//! the row store, write-through invalidation, input validation and change
//! notification fan-out.

pub mod cache;
pub mod clock;
pub mod error;
pub mod events;
pub mod repository;
pub mod tracking;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStats, EntityCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use events::{ChangeEvent, ChangeKind, ChangeNotifier};
pub use repository::{
    CachedEntity, CachedRepository, PatientFilter, PatientRepository, ReferralFilter,
    ReferralRepository, RepositoryConfig, spawn_listing_refresh_task,
};
pub use tracking::{estimate_ai_confidence, generate_tracking_number, is_tracking_number};
