//! Reconciliation of optimistic local edits with authoritative state.
//!
//! The engine is a reducer over three unordered inputs: the initial
//! snapshot, store responses to local mutations, and change feed events.
//! Whatever order a store response and the matching feed event arrive in,
//! the collection converges to one entry per logical record.

mod reconcile;

pub use reconcile::{AddOutcome, DeleteOutcome, FeedOutcome, ReconciliationEngine, SkipReason};
