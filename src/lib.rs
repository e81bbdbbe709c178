//! # marksync
//!
//! An optimistic, live view of one user's bookmarks, kept consistent with
//! an authoritative store and the store's change feed.
//!
//! ## Core Concepts
//!
//! - **Provisional records**: local adds appear immediately under a
//!   placeholder id and are swapped for the committed row later
//! - **Change feed**: at-least-once, unordered insert/delete notifications
//!   that may race the store's own response
//! - **Reconciliation**: whichever of store response and feed event arrives
//!   first wins; the second is a no-op merge
//! - **Resync**: failed deletes and feed drops reload the whole snapshot
//!
//! ## Example
//!
//! ```ignore
//! use marksync::{MemoryStore, OwnerId, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let owner = OwnerId::new("user-1")?;
//!
//! let session = Session::open(SessionConfig::default(), Some(owner), store.clone(), store)?;
//! let _listener = session.spawn_feed_listener()?;
//!
//! let bookmark = session.add("Docs", "https://docs.example")?;
//! session.delete(&bookmark.id)?;
//! ```

pub mod collection;
pub mod engine;
pub mod error;
pub mod feed;
pub mod session;
pub mod store;
pub mod types;

// Re-exports
pub use collection::Collection;
pub use engine::{AddOutcome, DeleteOutcome, FeedOutcome, ReconciliationEngine, SkipReason};
pub use error::{FailureKind, Result, StoreFailure, SyncError};
pub use feed::{DropReason, FeedConfig, FeedEvent, FeedHub, FeedSubscription, SubscriptionId};
pub use session::{Notice, Session, SessionConfig};
pub use store::{ChangeFeed, MemoryStore, RecordStore};
pub use types::*;
