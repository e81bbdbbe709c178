//! Interfaces to the authoritative record store and its change feed.
//!
//! The store is the single source of truth: it assigns ids and commit
//! timestamps and independently reports every committed change on the
//! owner's feed. [`MemoryStore`] implements both sides in-process.

mod memory;

pub use memory::MemoryStore;

use crate::error::{Result, StoreFailure};
use crate::feed::{FeedConfig, FeedHub, FeedSubscription, SubscriptionId};
use crate::types::{Bookmark, OwnerId, RecordId};

/// Request/response access to the authoritative bookmark table.
pub trait RecordStore: Send + Sync {
    /// Commit a new bookmark and return the stored row.
    fn insert(&self, title: &str, url: &str, owner: &OwnerId)
        -> std::result::Result<Bookmark, StoreFailure>;

    /// Delete the owner's bookmark with `id`. Deleting a missing row succeeds.
    fn delete(&self, id: &RecordId, owner: &OwnerId) -> std::result::Result<(), StoreFailure>;

    /// All of the owner's bookmarks, newest first.
    fn list_by_owner(&self, owner: &OwnerId) -> std::result::Result<Vec<Bookmark>, StoreFailure>;
}

/// Source of push notifications for committed changes.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, owner: &OwnerId, config: FeedConfig) -> Result<FeedSubscription>;

    fn unsubscribe(&self, id: SubscriptionId);
}

impl ChangeFeed for FeedHub {
    fn subscribe(&self, owner: &OwnerId, config: FeedConfig) -> Result<FeedSubscription> {
        Ok(FeedHub::subscribe(self, owner, config))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        FeedHub::unsubscribe(self, id)
    }
}
