//! Core types for the bookmark collection.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix used when rendering provisional ids.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Process-wide counter so provisional ids never repeat, even across engines.
static NEXT_PROVISIONAL: AtomicU64 = AtomicU64::new(1);

/// Locally generated placeholder id for a record the store has not confirmed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProvisionalId(pub u64);

impl ProvisionalId {
    /// Issue a fresh id, distinct from every id issued before in this process.
    pub fn next() -> Self {
        ProvisionalId(NEXT_PROVISIONAL.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProvisionalId({})", self.0)
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PROVISIONAL_PREFIX, self.0)
    }
}

/// Identifier of a bookmark in the collection.
///
/// Store-assigned ids and provisional ids are separate variants, so a
/// provisional id can never collide with anything the store hands out.
/// On the wire every id is a string and always decodes as `Stored`; a
/// provisional id encodes as `temp-<n>` but never decodes back into one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum RecordId {
    Stored(String),
    Provisional(ProvisionalId),
}

impl RecordId {
    pub fn stored(id: impl Into<String>) -> Self {
        RecordId::Stored(id.into())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, RecordId::Provisional(_))
    }

    pub fn as_provisional(&self) -> Option<ProvisionalId> {
        match self {
            RecordId::Provisional(id) => Some(*id),
            RecordId::Stored(_) => None,
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(RecordId::Stored)
    }
}

impl From<ProvisionalId> for RecordId {
    fn from(id: ProvisionalId) -> Self {
        RecordId::Provisional(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Stored(id.to_string())
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Stored(id) => write!(f, "RecordId({})", id),
            RecordId::Provisional(id) => write!(f, "RecordId({})", id),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Stored(id) => f.write_str(id),
            RecordId::Provisional(id) => write!(f, "{}", id),
        }
    }
}

/// Identity of the authenticated user owning a collection.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a resolved user id. An empty id means nobody is signed in.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SyncError::NotAuthenticated);
        }
        Ok(OwnerId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A single bookmark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Store-assigned or provisional identifier.
    pub id: RecordId,

    /// Sort key; the collection is ordered newest first.
    pub created_at: Timestamp,

    pub title: String,

    pub url: String,

    /// Owner of the collection this bookmark belongs to.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
}

impl Bookmark {
    /// Build a provisional bookmark for a pending add.
    pub fn provisional(id: ProvisionalId, title: &str, url: &str, owner_id: OwnerId) -> Self {
        Self {
            id: RecordId::Provisional(id),
            created_at: Timestamp::now(),
            title: title.to_string(),
            url: url.to_string(),
            owner_id,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    /// Whether this bookmark has exactly this title and url.
    pub fn same_content(&self, title: &str, url: &str) -> bool {
        self.title == title && self.url == url
    }
}

/// Reject empty titles or urls before anything reaches the store.
pub fn validate_input(title: &str, url: &str) -> Result<()> {
    if title.is_empty() {
        return Err(SyncError::Validation("title must not be empty".into()));
    }
    if url.is_empty() {
        return Err(SyncError::Validation("url must not be empty".into()));
    }
    Ok(())
}
