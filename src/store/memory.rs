//! In-process authoritative store.

use crate::error::{Result, StoreFailure};
use crate::feed::{FeedConfig, FeedHub, FeedSubscription, SubscriptionId};
use crate::types::{Bookmark, OwnerId, RecordId, Timestamp};
use parking_lot::Mutex;
use tracing::debug;

use super::{ChangeFeed, RecordStore};

/// Committed rows and id/clock counters.
struct Table {
    rows: Vec<Bookmark>,
    next_id: u64,
    last_commit: Timestamp,
}

/// One-shot failures to return from the next matching request.
#[derive(Default)]
struct Faults {
    insert: Option<StoreFailure>,
    delete: Option<StoreFailure>,
    list: Option<StoreFailure>,
}

/// A bookmark table held in memory, with its own change feed.
///
/// Every committed insert or delete is broadcast to the owner's feed
/// subscribers while the table lock is held, so feed order matches commit
/// order.
pub struct MemoryStore {
    table: Mutex<Table>,
    faults: Mutex<Faults>,
    feed: FeedHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                rows: Vec::new(),
                next_id: 1,
                last_commit: Timestamp(0),
            }),
            faults: Mutex::new(Faults::default()),
            feed: FeedHub::new(),
        }
    }

    /// Make the next `insert` fail with `failure`.
    pub fn fail_next_insert(&self, failure: StoreFailure) {
        self.faults.lock().insert = Some(failure);
    }

    /// Make the next `delete` fail with `failure`.
    pub fn fail_next_delete(&self, failure: StoreFailure) {
        self.faults.lock().delete = Some(failure);
    }

    /// Make the next `list_by_owner` fail with `failure`.
    pub fn fail_next_list(&self, failure: StoreFailure) {
        self.faults.lock().list = Some(failure);
    }

    /// End every feed subscription as if the connection dropped.
    pub fn disconnect_feed(&self) {
        self.feed.disconnect_all();
    }

    /// The feed hub backing this store.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Total committed rows across all owners.
    pub fn row_count(&self) -> usize {
        self.table.lock().rows.len()
    }

    /// Commit a row as if another client of `owner` had added it.
    pub fn insert_remote(&self, title: &str, url: &str, owner: &OwnerId) -> Bookmark {
        let mut table = self.table.lock();
        self.commit(&mut table, title, url, owner)
    }

    fn commit(&self, table: &mut Table, title: &str, url: &str, owner: &OwnerId) -> Bookmark {
        // Strictly increasing so commit order is also sort order.
        let now = Timestamp::now();
        let created_at = if now > table.last_commit {
            now
        } else {
            Timestamp(table.last_commit.0 + 1)
        };
        table.last_commit = created_at;

        let bookmark = Bookmark {
            id: RecordId::Stored(format!("bm-{}", table.next_id)),
            created_at,
            title: title.to_string(),
            url: url.to_string(),
            owner_id: owner.clone(),
        };
        table.next_id += 1;
        table.rows.push(bookmark.clone());

        debug!(id = %bookmark.id, %owner, "row committed");
        self.feed.broadcast_insert(&bookmark);
        bookmark
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn insert(
        &self,
        title: &str,
        url: &str,
        owner: &OwnerId,
    ) -> std::result::Result<Bookmark, StoreFailure> {
        if let Some(failure) = self.faults.lock().insert.take() {
            return Err(failure);
        }
        if title.is_empty() || url.is_empty() {
            return Err(StoreFailure::constraint("title and url are required"));
        }

        let mut table = self.table.lock();
        Ok(self.commit(&mut table, title, url, owner))
    }

    fn delete(&self, id: &RecordId, owner: &OwnerId) -> std::result::Result<(), StoreFailure> {
        if let Some(failure) = self.faults.lock().delete.take() {
            return Err(failure);
        }

        let mut table = self.table.lock();
        let position = table
            .rows
            .iter()
            .position(|row| &row.id == id && &row.owner_id == owner);

        // Filtered delete: no matching row is not an error.
        if let Some(index) = position {
            table.rows.remove(index);
            debug!(%id, %owner, "row deleted");
            self.feed.broadcast_delete(owner, id);
        }
        Ok(())
    }

    fn list_by_owner(&self, owner: &OwnerId) -> std::result::Result<Vec<Bookmark>, StoreFailure> {
        if let Some(failure) = self.faults.lock().list.take() {
            return Err(failure);
        }

        let table = self.table.lock();
        let mut rows: Vec<Bookmark> = table
            .rows
            .iter()
            .filter(|row| &row.owner_id == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self, owner: &OwnerId, config: FeedConfig) -> Result<FeedSubscription> {
        Ok(self.feed.subscribe(owner, config))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.feed.unsubscribe(id)
    }
}
