//! In-memory entity cache

mod entries;

pub use entries::{CacheStats, EntityCache};
