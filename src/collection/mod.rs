//! Ordered bookmark collection.
//!
//! Entries are kept newest first by `created_at`. Among equal timestamps a
//! later insertion sorts ahead of an earlier one, and snapshot order is kept
//! as given. Ids are unique.

mod ordered;

pub use ordered::Collection;
