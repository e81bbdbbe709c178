//! Change feed for live collection updates.
//!
//! The feed reports authoritative inserts and deletes for one owner's
//! bookmarks. Delivery is at-least-once and unordered relative to direct
//! store calls, so consumers must treat every event as idempotent.
//!
//! Subscriptions use bounded buffers; a subscriber that falls behind is
//! dropped with [`DropReason::BufferOverflow`] and is expected to resubscribe
//! and resynchronize from a fresh snapshot.
//!
//! # Example
//!
//! ```ignore
//! let hub = FeedHub::new();
//! let handle = hub.subscribe(&owner, FeedConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Insert { record }) => println!("added {}", record.title),
//!         Ok(FeedEvent::Delete { id }) => println!("removed {}", id),
//!         Ok(FeedEvent::Dropped { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::FeedHub;
pub use types::{DropReason, FeedConfig, FeedEvent, FeedSubscription, SubscriptionId};
