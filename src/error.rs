//! Error types for the reconciliation engine and its session.

use crate::feed::DropReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad category of a failed store request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Request never reached the store or the response was lost.
    Network,
    /// The store rejected the caller's credentials.
    Unauthorized,
    /// A constraint on the store side refused the write.
    Constraint,
    /// The store is temporarily unable to serve requests.
    Unavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Network => "network",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Constraint => "constraint",
            FailureKind::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// A failed insert, delete or list against the record store.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct StoreFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StoreFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Constraint, message)
    }
}

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreFailure),

    #[error("Not authenticated: no owner context")]
    NotAuthenticated,

    #[error("Change feed disconnected: {0:?}")]
    FeedDisconnected(DropReason),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            SyncError::Deserialization(e.to_string())
        } else {
            SyncError::Serialization(e.to_string())
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
