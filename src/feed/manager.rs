//! Feed hub for broadcasting committed changes to subscribers.

use crate::types::{Bookmark, OwnerId, RecordId};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{DropReason, FeedConfig, FeedEvent, FeedSubscription, SubscriptionId};

/// Internal subscription state.
struct Subscription {
    owner: OwnerId,
    sender: Sender<FeedEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: FeedEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Fans out committed inserts and deletes to the owner's subscribers.
pub struct FeedHub {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl FeedHub {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to changes for `owner`.
    pub fn subscribe(&self, owner: &OwnerId, config: FeedConfig) -> FeedSubscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.subscriptions.write().insert(
            id,
            Subscription {
                owner: owner.clone(),
                sender,
            },
        );
        debug!(subscription = id.0, %owner, "feed subscription opened");

        FeedSubscription { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.drop_subscription(id, DropReason::Unsubscribed);
    }

    /// End every subscription as if the transport had gone away.
    pub fn disconnect_all(&self) {
        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        for (id, sub) in drained {
            debug!(subscription = id.0, "feed subscription disconnected");
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Disconnected,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Broadcast a committed insert to the record owner's subscribers.
    pub fn broadcast_insert(&self, record: &Bookmark) {
        let event = FeedEvent::Insert {
            record: record.clone(),
        };
        self.broadcast(&record.owner_id, event);
    }

    /// Broadcast a committed delete to the owner's subscribers.
    pub fn broadcast_delete(&self, owner: &OwnerId, id: &RecordId) {
        let event = FeedEvent::Delete { id: id.clone() };
        self.broadcast(owner, event);
    }

    fn drop_subscription(&self, id: SubscriptionId, reason: DropReason) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            // Best effort; the receiver may already be gone.
            let _ = sub.sender.try_send(FeedEvent::Dropped { reason });
        }
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast(&self, owner: &OwnerId, event: FeedEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if &sub.owner == owner && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(subscription = id.0, "dropping slow feed subscriber");
                    // Buffer is full, so this usually fails; the closed
                    // sender still ends the stream for the receiver.
                    let _ = sub.sender.try_send(FeedEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}
