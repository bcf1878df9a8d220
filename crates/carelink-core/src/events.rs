//! Change notification fan-out
//!
//! Two broadcast channels per repository:
//!
//! - change events (created / updated / deleted / status changed), one per
//!   mutation;
//! - full listings, pushed by explicit `list` calls and by the debounced
//!   refresh task after mutations.
//!
//! Delivery is in-process, best-effort and at-most-once. A subscriber only
//! sees what is published after it subscribed, and a receiver that falls
//! more than the channel capacity behind loses the overflow.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// Default capacity for both broadcast channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    StatusChanged,
}

/// A mutation observed on a repository. Never persisted.
#[derive(Debug, Clone)]
pub struct ChangeEvent<E> {
    pub kind: ChangeKind,
    pub entity_id: String,
    pub entity: Option<E>,
    pub new_status: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<E> ChangeEvent<E> {
    pub fn created(entity_id: &str, entity: E, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: ChangeKind::Created,
            entity_id: entity_id.to_string(),
            entity: Some(entity),
            new_status: None,
            timestamp,
        }
    }

    pub fn updated(entity_id: &str, entity: E, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: ChangeKind::Updated,
            entity_id: entity_id.to_string(),
            entity: Some(entity),
            new_status: None,
            timestamp,
        }
    }

    pub fn deleted(entity_id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            entity_id: entity_id.to_string(),
            entity: None,
            new_status: None,
            timestamp,
        }
    }

    pub fn status_changed(entity_id: &str, new_status: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: ChangeKind::StatusChanged,
            entity_id: entity_id.to_string(),
            entity: None,
            new_status: Some(new_status.to_string()),
            timestamp,
        }
    }
}

/// Broadcast hub for one repository
pub struct ChangeNotifier<E> {
    changes: broadcast::Sender<ChangeEvent<E>>,
    listings: broadcast::Sender<Arc<Vec<E>>>,
    listing_dirty: AtomicBool,
}

impl<E: Clone + Send + Sync + 'static> ChangeNotifier<E> {
    /// Capacity applies to both channels; zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (changes, _) = broadcast::channel(capacity);
        let (listings, _) = broadcast::channel(capacity);
        Self {
            changes,
            listings,
            listing_dirty: AtomicBool::new(false),
        }
    }

    /// Publish a change event and mark the listing dirty
    ///
    /// Returns the number of subscribers reached; zero subscribers is not an
    /// error and never blocks.
    pub fn publish(&self, event: ChangeEvent<E>) -> usize {
        self.listing_dirty.store(true, Ordering::Release);
        let kind = event.kind;
        match self.changes.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No subscribers for {:?} event", kind);
                0
            }
        }
    }

    /// Push a full listing to listing subscribers
    pub fn publish_listing(&self, listing: Arc<Vec<E>>) -> usize {
        self.listings.send(listing).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent<E>> {
        self.changes.subscribe()
    }

    pub fn subscribe_listing(&self) -> broadcast::Receiver<Arc<Vec<E>>> {
        self.listings.subscribe()
    }

    /// Change events as a stream; lag is logged and skipped
    pub fn watch(&self) -> impl Stream<Item = ChangeEvent<E>> + Send + use<E> {
        BroadcastStream::new(self.changes.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("Change subscriber lagged, {} events dropped", skipped);
                None
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    pub fn has_listing_subscribers(&self) -> bool {
        self.listings.receiver_count() > 0
    }

    pub fn is_listing_dirty(&self) -> bool {
        self.listing_dirty.load(Ordering::Acquire)
    }

    /// Clear the dirty flag, returning whether it was set
    pub fn take_dirty(&self) -> bool {
        self.listing_dirty.swap(false, Ordering::AcqRel)
    }

    pub fn mark_dirty(&self) {
        self.listing_dirty.store(true, Ordering::Release);
    }
}
