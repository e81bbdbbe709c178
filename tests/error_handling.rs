//! Error handling and edge case tests.

use marksync::{
    AddOutcome, FailureKind, FeedEvent, FeedOutcome, MemoryStore, Notice, OwnerId,
    ReconciliationEngine, RecordId, RecordStore, Session, SessionConfig, StoreFailure, SyncError,
};
use serde_json::json;
use std::sync::Arc;

fn owner() -> OwnerId {
    OwnerId::new("u1").unwrap()
}

fn open_session(store: &Arc<MemoryStore>) -> Session {
    Session::open(SessionConfig::default(), Some(owner()), store.clone(), store.clone()).unwrap()
}

// --- Authentication ---

#[test]
fn test_empty_owner_is_not_authenticated() {
    assert!(matches!(OwnerId::new(""), Err(SyncError::NotAuthenticated)));
}

#[test]
fn test_open_without_owner() {
    let store = Arc::new(MemoryStore::new());
    let result = Session::open(SessionConfig::default(), None, store.clone(), store.clone());

    assert!(matches!(result, Err(SyncError::NotAuthenticated)));
    assert_eq!(store.feed().subscription_count(), 0);
}

// --- Validation ---

#[test]
fn test_empty_title_never_reaches_store() {
    let store = Arc::new(MemoryStore::new());
    let session = open_session(&store);

    let result = session.add("", "https://a.example");

    assert!(matches!(result, Err(SyncError::Validation(_))));
    assert!(session.is_empty());
    assert_eq!(store.row_count(), 0);
}

#[test]
fn test_empty_url_never_reaches_store() {
    let store = Arc::new(MemoryStore::new());
    let session = open_session(&store);

    // A queued failure would be consumed if the store were called.
    store.fail_next_insert(StoreFailure::network("offline"));
    let result = session.add("Site", "");

    assert!(matches!(result, Err(SyncError::Validation(_))));
    assert!(session.add("Site", "https://a.example").is_err());
}

// --- Add Failures ---

#[test]
fn test_add_failure_restores_previous_collection() {
    let store = Arc::new(MemoryStore::new());
    store.insert_remote("Existing", "https://existing.example", &owner());
    let session = open_session(&store);
    let before = session.bookmarks();

    store.fail_next_insert(StoreFailure::new(FailureKind::Unauthorized, "token expired"));
    let result = session.add("Site", "https://a.example");

    match result {
        Err(SyncError::Store(failure)) => assert_eq!(failure.kind, FailureKind::Unauthorized),
        other => panic!("Expected store failure, got {:?}", other),
    }
    assert_eq!(session.bookmarks(), before);
    assert_eq!(session.pending_count(), 0);
}

#[test]
fn test_rollback_after_provisional_already_deleted() {
    let mut engine = ReconciliationEngine::new(owner());
    let pending = engine.begin_add("Site", "https://a.example").unwrap();
    engine.begin_delete(&pending.id);

    let failure = StoreFailure::network("offline");
    let outcome = engine.confirm_add(pending.id.as_provisional().unwrap(), Err(failure.clone()));

    assert_eq!(outcome, AddOutcome::RolledBack(failure));
    assert!(engine.is_empty());
}

#[test]
fn test_add_retry_is_callers_choice() {
    let store = Arc::new(MemoryStore::new());
    let session = open_session(&store);

    store.fail_next_insert(StoreFailure::network("offline"));
    assert!(session.add("Site", "https://a.example").is_err());
    assert_eq!(store.row_count(), 0);

    session.add("Site", "https://a.example").unwrap();
    assert_eq!(store.row_count(), 1);
    assert_eq!(session.len(), 1);
}

// --- Delete Failures ---

#[test]
fn test_delete_failure_resyncs_and_notifies() {
    let store = Arc::new(MemoryStore::new());
    let row = store.insert_remote("Site", "https://a.example", &owner());
    let session = open_session(&store);
    let notices = session.notices();

    store.fail_next_delete(StoreFailure::network("timeout"));
    let result = session.delete(&row.id);

    assert!(matches!(result, Err(SyncError::Store(_))));
    assert_eq!(session.bookmarks(), vec![row.clone()]);
    assert_eq!(
        notices.try_recv().unwrap(),
        Notice::DeleteFailed {
            id: row.id,
            failure: StoreFailure::network("timeout"),
        }
    );
    assert_eq!(notices.try_recv().unwrap(), Notice::Resynced { count: 1 });
}

#[test]
fn test_delete_failure_with_failing_resync_still_reports() {
    let store = Arc::new(MemoryStore::new());
    let row = store.insert_remote("Site", "https://a.example", &owner());
    let session = open_session(&store);

    store.fail_next_delete(StoreFailure::network("timeout"));
    store.fail_next_list(StoreFailure::new(FailureKind::Unavailable, "maintenance"));

    let result = session.delete(&row.id);
    match result {
        Err(SyncError::Store(failure)) => assert_eq!(failure.kind, FailureKind::Network),
        other => panic!("Expected store failure, got {:?}", other),
    }

    // The optimistic removal stands until a later resync succeeds.
    assert!(session.is_empty());
    assert_eq!(session.resync().unwrap(), 1);
    assert_eq!(session.bookmarks(), vec![row]);
}

#[test]
fn test_delete_missing_id_is_not_an_error() {
    let store = Arc::new(MemoryStore::new());
    let session = open_session(&store);

    session.delete(&RecordId::stored("does-not-exist")).unwrap();
    assert!(session.is_empty());
}

// --- Feed Payloads ---

#[test]
fn test_unknown_feed_kind_is_rejected() {
    let result = FeedEvent::from_json(r#"{"kind":"update","id":"r1"}"#);
    assert!(matches!(result, Err(SyncError::Deserialization(_))));
}

#[test]
fn test_truncated_feed_payload_is_rejected() {
    let result = FeedEvent::from_json(r#"{"kind":"delete","#);
    assert!(matches!(result, Err(SyncError::Deserialization(_))));
}

#[test]
fn test_numeric_feed_id_is_rejected() {
    let mut engine = ReconciliationEngine::new(owner());
    let pending = engine.begin_add("Site", "https://a.example").unwrap();
    let number = pending.id.as_provisional().unwrap().0;

    let delete = json!({ "kind": "delete", "id": number });
    let result = FeedEvent::from_json(&delete.to_string());
    assert!(matches!(result, Err(SyncError::Deserialization(_))));

    let insert = json!({
        "kind": "insert",
        "record": {
            "id": number,
            "created_at": 5,
            "title": "Site",
            "url": "https://a.example",
            "user_id": "u1"
        }
    });
    let result = FeedEvent::from_json(&insert.to_string());
    assert!(matches!(result, Err(SyncError::Deserialization(_))));

    assert_eq!(engine.len(), 1);
    assert_eq!(engine.pending_count(), 1);
}

#[test]
fn test_placeholder_shaped_feed_id_stays_stored() {
    let mut engine = ReconciliationEngine::new(owner());
    let pending = engine.begin_add("Site", "https://a.example").unwrap();

    let text = format!(r#"{{"kind":"delete","id":"{}"}}"#, pending.id);
    let event = FeedEvent::from_json(&text).unwrap();

    assert_eq!(engine.apply_feed(event), FeedOutcome::Absent);
    assert!(engine.get(&pending.id).is_some());
}

#[test]
fn test_store_failure_display() {
    let failure = StoreFailure::constraint("duplicate key");
    assert_eq!(failure.to_string(), "constraint failure: duplicate key");

    let error: SyncError = failure.into();
    assert_eq!(error.to_string(), "Store failure: constraint failure: duplicate key");
}

#[test]
fn test_store_rejects_empty_fields_directly() {
    let store = MemoryStore::new();
    let err = store.insert("", "https://a.example", &owner()).unwrap_err();
    assert_eq!(err.kind, FailureKind::Constraint);
}
