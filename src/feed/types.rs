//! Feed event and subscription types.

use crate::error::Result;
use crate::types::{Bookmark, RecordId};
use serde::{Deserialize, Serialize};

/// Configuration for a feed subscription.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Max buffered events before dropping the subscriber.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// Events delivered by a feed subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A bookmark was committed to the store.
    Insert { record: Bookmark },

    /// A bookmark was deleted from the store.
    Delete { id: RecordId },

    /// The subscription ended; no further events will follow.
    Dropped { reason: DropReason },
}

impl FeedEvent {
    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Transport went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// Internal error.
    Error(String),
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a live subscription.
pub struct FeedSubscription {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
}

impl FeedSubscription {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
