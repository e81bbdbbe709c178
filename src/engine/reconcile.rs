//! The reconciliation reducer.
//!
//! # Record lifecycle
//!
//! ```text
//!            begin_add                confirm_add / feed insert
//!   absent ─────────────▶ provisional ─────────────────────────▶ confirmed
//!     ▲                        │                                    │
//!     │   add failure, delete  │      delete, feed delete           │
//!     ├────────────────────────┘◀───────────────────────────────────┘
//!     │
//!     └──── feed insert (other session) ──▶ confirmed
//! ```
//!
//! No transition re-enters `provisional`.

use crate::collection::Collection;
use crate::error::{Result, StoreFailure};
use crate::feed::{DropReason, FeedEvent};
use crate::types::{validate_input, Bookmark, OwnerId, ProvisionalId, RecordId};
use tracing::{debug, info, trace, warn};

/// What `confirm_add` did with a store response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The provisional entry was replaced by the committed record.
    Confirmed,
    /// The feed already delivered the committed record; the provisional
    /// entry (if still present) was removed.
    AlreadyPresent,
    /// The provisional entry was gone (deleted while pending); the late
    /// confirmation was ignored.
    Discarded,
    /// The store refused the insert; the provisional entry was removed.
    RolledBack(StoreFailure),
}

/// What `confirm_delete` requires of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing left to do; the entry was already removed optimistically.
    Committed,
    /// The delete failed. The removed entry is not retained, so the caller
    /// must reload the snapshot and call `initialize` again.
    ResyncRequired(StoreFailure),
}

/// What a feed event did to the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// A record from elsewhere was inserted.
    Inserted,
    /// A pending local add was matched by content and replaced.
    MergedProvisional(ProvisionalId),
    /// The record was already present (duplicate delivery).
    Duplicate,
    /// The named record was removed.
    Removed,
    /// The named record was not present.
    Absent,
    /// The event was ignored.
    Skipped(SkipReason),
    /// The subscription ended; the caller should resynchronize.
    Disconnected(DropReason),
}

/// Reason a feed event was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The record belongs to a different owner.
    ForeignOwner(OwnerId),
}

/// Owns one user's ordered bookmark collection.
///
/// Every method is a single, complete state transition. Callers that share
/// the engine between threads wrap it in a lock and never hold the lock
/// across a store round-trip.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    owner: OwnerId,
    collection: Collection,
}

impl ReconciliationEngine {
    /// Create an empty engine for an authenticated owner.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            collection: Collection::new(),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Replace the collection with an authoritative snapshot.
    pub fn initialize(&mut self, snapshot: Vec<Bookmark>) {
        let dropped = self.collection.replace_all(snapshot);
        if dropped > 0 {
            warn!(dropped, "snapshot contained repeated ids");
        }
        info!(
            owner = %self.owner,
            count = self.collection.len(),
            "collection initialized"
        );
    }

    /// Optimistically add a bookmark and return the provisional entry.
    ///
    /// The entry is visible to readers before any store call is made.
    pub fn begin_add(&mut self, title: &str, url: &str) -> Result<Bookmark> {
        self.stage_add(title, url).map(|(_, bookmark)| bookmark)
    }

    pub(crate) fn stage_add(
        &mut self,
        title: &str,
        url: &str,
    ) -> Result<(ProvisionalId, Bookmark)> {
        validate_input(title, url)?;

        let provisional = ProvisionalId::next();
        let bookmark = Bookmark::provisional(provisional, title, url, self.owner.clone());
        // Normally lands at the front; a store clock running ahead of ours
        // can still leave newer committed entries above it.
        let index = self.collection.insert_sorted(bookmark.clone());
        debug!(id = %bookmark.id, index, "provisional entry added");

        Ok((provisional, bookmark))
    }

    /// Apply the store's response to the insert issued for `provisional`.
    pub fn confirm_add(
        &mut self,
        provisional: ProvisionalId,
        result: std::result::Result<Bookmark, StoreFailure>,
    ) -> AddOutcome {
        let provisional_id = RecordId::Provisional(provisional);

        let committed = match result {
            Ok(committed) => committed,
            Err(failure) => {
                if self.collection.remove(&provisional_id).is_some() {
                    warn!(id = %provisional_id, error = %failure, "add rolled back");
                } else {
                    debug!(
                        id = %provisional_id,
                        error = %failure,
                        "failed add was already removed"
                    );
                }
                return AddOutcome::RolledBack(failure);
            }
        };

        if self.collection.contains(&committed.id) {
            // The feed got here first.
            self.collection.remove(&provisional_id);
            trace!(id = %committed.id, "confirmation merged into feed copy");
            return AddOutcome::AlreadyPresent;
        }

        match self.collection.position(&provisional_id) {
            Some(index) => {
                debug!(provisional = %provisional_id, id = %committed.id, "add confirmed");
                self.collection.replace_at(index, committed);
                AddOutcome::Confirmed
            }
            None => {
                debug!(
                    provisional = %provisional_id,
                    id = %committed.id,
                    "late confirmation for removed entry discarded"
                );
                AddOutcome::Discarded
            }
        }
    }

    /// Merge a feed insert. Idempotent under duplicate delivery.
    pub fn on_feed_insert(&mut self, record: Bookmark) -> FeedOutcome {
        if record.owner_id != self.owner {
            warn!(
                id = %record.id,
                owner = %record.owner_id,
                "feed insert for another owner ignored"
            );
            return FeedOutcome::Skipped(SkipReason::ForeignOwner(record.owner_id));
        }

        if self.collection.contains(&record.id) {
            trace!(id = %record.id, "duplicate feed insert");
            return FeedOutcome::Duplicate;
        }

        // Only content can tie a server row to a pending local add.
        if let Some((index, provisional)) = self
            .collection
            .find_provisional_match(&record.title, &record.url)
        {
            debug!(%provisional, id = %record.id, "feed insert merged pending add");
            self.collection.replace_at(index, record);
            return FeedOutcome::MergedProvisional(provisional);
        }

        debug!(id = %record.id, "feed insert");
        self.collection.insert_sorted(record);
        FeedOutcome::Inserted
    }

    /// Optimistically remove an entry, provisional or not.
    pub fn begin_delete(&mut self, id: &RecordId) -> Option<Bookmark> {
        let removed = self.collection.remove(id);
        match &removed {
            Some(_) => debug!(%id, "entry removed optimistically"),
            None => trace!(%id, "delete for absent entry"),
        }
        removed
    }

    /// Apply the store's response to a delete.
    pub fn confirm_delete(
        &mut self,
        id: &RecordId,
        result: std::result::Result<(), StoreFailure>,
    ) -> DeleteOutcome {
        match result {
            Ok(()) => DeleteOutcome::Committed,
            Err(failure) => {
                warn!(%id, error = %failure, "delete failed, resync required");
                DeleteOutcome::ResyncRequired(failure)
            }
        }
    }

    /// Merge a feed delete. Idempotent.
    pub fn on_feed_delete(&mut self, id: &RecordId) -> FeedOutcome {
        match self.collection.remove(id) {
            Some(_) => {
                debug!(%id, "feed delete");
                FeedOutcome::Removed
            }
            None => FeedOutcome::Absent,
        }
    }

    /// Dispatch any feed event.
    pub fn apply_feed(&mut self, event: FeedEvent) -> FeedOutcome {
        match event {
            FeedEvent::Insert { record } => self.on_feed_insert(record),
            FeedEvent::Delete { id } => self.on_feed_delete(&id),
            FeedEvent::Dropped { reason } => FeedOutcome::Disconnected(reason),
        }
    }

    // --- Read access ---

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.collection.to_vec()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Bookmark> {
        self.collection.get(id)
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Number of adds still waiting for the store.
    pub fn pending_count(&self) -> usize {
        self.collection.provisional_count()
    }
}
