//! Vec-backed ordered collection.

use crate::types::{Bookmark, ProvisionalId, RecordId};
use std::collections::HashSet;

/// Bookmarks ordered descending by `created_at`, unique by id.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    entries: Vec<Bookmark>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry with `snapshot`.
    ///
    /// Repeated ids keep their first occurrence. Returns how many
    /// duplicates were dropped.
    pub fn replace_all(&mut self, snapshot: Vec<Bookmark>) -> usize {
        let total = snapshot.len();
        let mut seen = HashSet::with_capacity(total);
        let mut entries: Vec<Bookmark> = snapshot
            .into_iter()
            .filter(|b| seen.insert(b.id.clone()))
            .collect();

        // Stable, so equal timestamps keep snapshot order.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let dropped = total - entries.len();
        self.entries = entries;
        dropped
    }

    /// Insert ahead of every entry that is not strictly newer.
    ///
    /// The caller guarantees the id is not already present.
    pub fn insert_sorted(&mut self, bookmark: Bookmark) -> usize {
        debug_assert!(!self.contains(&bookmark.id));
        let index = self
            .entries
            .partition_point(|e| e.created_at > bookmark.created_at);
        self.entries.insert(index, bookmark);
        index
    }

    /// Swap the entry at `index` for `bookmark`, then restore ordering.
    pub fn replace_at(&mut self, index: usize, bookmark: Bookmark) -> Bookmark {
        let old = std::mem::replace(&mut self.entries[index], bookmark);
        self.entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        old
    }

    /// Remove the entry with `id`, if present.
    pub fn remove(&mut self, id: &RecordId) -> Option<Bookmark> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Bookmark> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// First provisional entry, in collection order, with matching content.
    pub fn find_provisional_match(&self, title: &str, url: &str) -> Option<(usize, ProvisionalId)> {
        self.entries
            .iter()
            .enumerate()
            .find_map(|(index, e)| match e.id.as_provisional() {
                Some(id) if e.same_content(title, url) => Some((index, id)),
                _ => None,
            })
    }

    pub fn provisional_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_provisional()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bookmark> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Bookmark] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<Bookmark> {
        self.entries.clone()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Bookmark;
    type IntoIter = std::slice::Iter<'a, Bookmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
