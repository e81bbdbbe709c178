//! Session tying the engine to a store and a change feed for one owner.

use crate::engine::{AddOutcome, DeleteOutcome, FeedOutcome, ReconciliationEngine};
use crate::error::{Result, StoreFailure, SyncError};
use crate::feed::{DropReason, FeedConfig, FeedEvent, SubscriptionId};
use crate::store::{ChangeFeed, RecordStore};
use crate::types::{Bookmark, OwnerId, ProvisionalId, RecordId};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the feed listener waits while another thread reconnects.
const RECONNECT_POLL: Duration = Duration::from_millis(5);

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Feed subscription settings.
    pub feed: FeedConfig,

    /// Resubscribe and reload the snapshot when the feed drops.
    /// When false, a drop surfaces as `SyncError::FeedDisconnected`.
    pub resync_on_feed_drop: bool,

    /// Delete the committed row when the user deleted its provisional
    /// entry while the insert was still in flight.
    pub compensate_abandoned_adds: bool,

    /// Max undelivered notices; newer notices are dropped when full.
    /// Default: 64
    pub notice_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            resync_on_feed_drop: true,
            compensate_abandoned_adds: true,
            notice_buffer: 64,
        }
    }
}

/// User-visible, transient report of something the session recovered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// An add was rejected and its provisional entry removed.
    AddFailed { title: String, failure: StoreFailure },
    /// A delete was rejected; the collection is reloaded.
    DeleteFailed { id: RecordId, failure: StoreFailure },
    /// The change feed ended.
    FeedDropped { reason: DropReason },
    /// The collection was reloaded from the store.
    Resynced { count: usize },
}

/// Where the session's feed subscription stands.
enum FeedState {
    Live {
        id: SubscriptionId,
        receiver: Receiver<FeedEvent>,
    },
    Reconnecting,
    Disconnected(DropReason),
    Closed,
}

/// What a feed consumer should do next.
enum Next {
    Read(SubscriptionId, Receiver<FeedEvent>),
    Wait,
    Stop(SyncError),
}

struct Inner {
    config: SessionConfig,
    owner: OwnerId,
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn ChangeFeed>,
    engine: Mutex<ReconciliationEngine>,
    state: Mutex<FeedState>,
    /// Feed events take this shared; a snapshot reload takes it exclusively
    /// so no event lands between listing and initializing.
    gate: RwLock<()>,
    /// Provisional entries deleted while their insert was in flight.
    abandoned: Mutex<HashSet<ProvisionalId>>,
    notice_tx: Sender<Notice>,
    notice_rx: Receiver<Notice>,
}

/// An authenticated user's live, optimistic bookmark collection.
///
/// Mutations apply to the local collection first and are then sent to the
/// store; the change feed is merged as it arrives. Each engine update is a
/// single critical section and store calls run with no lock held, so the
/// collection can be read at any time.
///
/// Dropping the session closes it.
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Open a session for `owner`.
    ///
    /// Subscribes to the feed before loading the snapshot, so nothing
    /// committed in between is missed; events that repeat the snapshot are
    /// absorbed as duplicates.
    pub fn open(
        config: SessionConfig,
        owner: Option<OwnerId>,
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Result<Self> {
        let owner = owner.ok_or(SyncError::NotAuthenticated)?;
        let (notice_tx, notice_rx) = bounded(config.notice_buffer.max(1));

        let inner = Arc::new(Inner {
            engine: Mutex::new(ReconciliationEngine::new(owner.clone())),
            config,
            owner,
            store,
            feed,
            state: Mutex::new(FeedState::Reconnecting),
            gate: RwLock::new(()),
            abandoned: Mutex::new(HashSet::new()),
            notice_tx,
            notice_rx,
        });

        let count = inner.connect()?;
        info!(owner = %inner.owner, count, "session opened");

        let session = Session { inner };
        session.pump_feed()?;
        Ok(session)
    }

    pub fn owner(&self) -> &OwnerId {
        &self.inner.owner
    }

    /// Add a bookmark optimistically and wait for the store.
    ///
    /// Returns the committed record. On failure the provisional entry is
    /// rolled back, a notice is emitted and the failure returned.
    pub fn add(&self, title: &str, url: &str) -> Result<Bookmark> {
        let inner = &self.inner;
        inner.ensure_open()?;

        let (provisional, pending) = inner.engine.lock().stage_add(title, url)?;
        debug!(id = %pending.id, "add issued");

        let committed = match inner.store.insert(title, url, &inner.owner) {
            Ok(committed) => committed,
            Err(failure) => {
                {
                    let mut engine = inner.engine.lock();
                    inner.abandoned.lock().remove(&provisional);
                    engine.confirm_add(provisional, Err(failure.clone()));
                }
                inner.notify(Notice::AddFailed {
                    title: title.to_string(),
                    failure: failure.clone(),
                });
                return Err(failure.into());
            }
        };

        let (outcome, abandoned) = {
            let mut engine = inner.engine.lock();
            let outcome = engine.confirm_add(provisional, Ok(committed.clone()));
            (outcome, inner.abandoned.lock().remove(&provisional))
        };
        debug!(id = %committed.id, ?outcome, "add settled");

        if abandoned && inner.config.compensate_abandoned_adds {
            info!(id = %committed.id, "removing row whose pending add was deleted");
            // A failed delete has already notified and resynced.
            if let Err(e) = self.delete(&committed.id) {
                warn!(id = %committed.id, error = %e, "could not remove abandoned row");
            }
        } else if outcome == AddOutcome::Discarded {
            warn!(id = %committed.id, "confirmation arrived for an entry no longer present");
        }

        Ok(committed)
    }

    /// Delete a bookmark optimistically and wait for the store.
    ///
    /// Deleting a provisional entry only removes it locally; the pending
    /// insert is dealt with when it settles. A rejected delete reloads the
    /// collection from the store.
    pub fn delete(&self, id: &RecordId) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_open()?;

        {
            let mut engine = inner.engine.lock();
            let removed = engine.begin_delete(id);
            if let RecordId::Provisional(provisional) = id {
                if removed.is_some() {
                    inner.abandoned.lock().insert(*provisional);
                }
                return Ok(());
            }
        }

        let result = inner.store.delete(id, &inner.owner);
        let outcome = inner.engine.lock().confirm_delete(id, result);

        match outcome {
            DeleteOutcome::Committed => Ok(()),
            DeleteOutcome::ResyncRequired(failure) => {
                inner.notify(Notice::DeleteFailed {
                    id: id.clone(),
                    failure: failure.clone(),
                });
                if let Err(e) = self.resync() {
                    warn!(error = %e, "resync after failed delete did not complete");
                }
                Err(failure.into())
            }
        }
    }

    /// Reload the collection from the store.
    pub fn resync(&self) -> Result<usize> {
        self.inner.ensure_open()?;
        let count = self.inner.reload()?;
        self.inner.notify(Notice::Resynced { count });
        Ok(count)
    }

    /// Drop the current feed subscription, subscribe afresh and reload.
    pub fn reconnect(&self) -> Result<usize> {
        let inner = &self.inner;
        let previous = {
            let mut state = inner.state.lock();
            if matches!(*state, FeedState::Closed) {
                return Err(SyncError::SessionClosed);
            }
            std::mem::replace(&mut *state, FeedState::Reconnecting)
        };
        if let FeedState::Live { id, .. } = previous {
            inner.feed.unsubscribe(id);
        }

        let count = inner.connect()?;
        inner.notify(Notice::Resynced { count });
        Ok(count)
    }

    /// Apply every feed event already queued, without blocking.
    ///
    /// Returns how many insert/delete events were applied.
    pub fn pump_feed(&self) -> Result<usize> {
        let mut applied = 0;
        loop {
            let (id, receiver) = match self.inner.next_source() {
                Next::Read(id, receiver) => (id, receiver),
                Next::Wait => return Ok(applied),
                Next::Stop(e) => return Err(e),
            };

            let event = match receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Disconnected) => FeedEvent::Dropped {
                    reason: DropReason::Disconnected,
                },
            };

            if self.inner.dispatch(id, event)? {
                applied += 1;
            }
        }
    }

    /// Apply feed events on a background thread as they arrive.
    ///
    /// The thread exits when the session closes or the feed drops with
    /// resync disabled.
    pub fn spawn_feed_listener(&self) -> Result<JoinHandle<()>> {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("marksync-feed".into())
            .spawn(move || listen(inner))?;
        Ok(handle)
    }

    /// Stream of user-visible notices.
    pub fn notices(&self) -> Receiver<Notice> {
        self.inner.notice_rx.clone()
    }

    /// Current collection, newest first.
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.inner.engine.lock().bookmarks()
    }

    pub fn get(&self, id: &RecordId) -> Option<Bookmark> {
        self.inner.engine.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.engine.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.engine.lock().is_empty()
    }

    /// Adds still waiting for the store.
    pub fn pending_count(&self) -> usize {
        self.inner.engine.lock().pending_count()
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.inner.state.lock(), FeedState::Closed)
    }

    /// End the session and its feed subscription.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), FeedState::Closed);
        match previous {
            FeedState::Closed => return,
            FeedState::Live { id, .. } => self.inner.feed.unsubscribe(id),
            FeedState::Reconnecting | FeedState::Disconnected(_) => {}
        }
        info!(owner = %self.inner.owner, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if matches!(*self.state.lock(), FeedState::Closed) {
            return Err(SyncError::SessionClosed);
        }
        Ok(())
    }

    fn notify(&self, notice: Notice) {
        if self.notice_tx.try_send(notice).is_err() {
            debug!("notice buffer full, notice dropped");
        }
    }

    /// Replace the collection with a fresh snapshot.
    fn reload(&self) -> Result<usize> {
        let _gate = self.gate.write();
        let snapshot = self.store.list_by_owner(&self.owner)?;
        let mut engine = self.engine.lock();
        engine.initialize(snapshot);
        Ok(engine.len())
    }

    /// Subscribe, reload, then expose the new subscription to consumers.
    fn connect(&self) -> Result<usize> {
        let subscription = self.feed.subscribe(&self.owner, self.config.feed.clone())?;

        let count = match self.reload() {
            Ok(count) => count,
            Err(e) => {
                self.feed.unsubscribe(subscription.id);
                let mut state = self.state.lock();
                if !matches!(*state, FeedState::Closed) {
                    *state = FeedState::Disconnected(DropReason::Error(e.to_string()));
                }
                return Err(e);
            }
        };

        let mut state = self.state.lock();
        if matches!(*state, FeedState::Closed) {
            drop(state);
            self.feed.unsubscribe(subscription.id);
            return Err(SyncError::SessionClosed);
        }
        *state = FeedState::Live {
            id: subscription.id,
            receiver: subscription.receiver,
        };
        Ok(count)
    }

    fn next_source(&self) -> Next {
        match &*self.state.lock() {
            FeedState::Live { id, receiver } => Next::Read(*id, receiver.clone()),
            FeedState::Reconnecting => Next::Wait,
            FeedState::Disconnected(reason) => {
                Next::Stop(SyncError::FeedDisconnected(reason.clone()))
            }
            FeedState::Closed => Next::Stop(SyncError::SessionClosed),
        }
    }

    /// Apply one event read from subscription `id`.
    ///
    /// Returns true if an insert or delete was applied.
    fn dispatch(&self, id: SubscriptionId, event: FeedEvent) -> Result<bool> {
        if let FeedEvent::Dropped { reason } = event {
            self.handle_drop(id, reason)?;
            return Ok(false);
        }

        let _gate = self.gate.read();
        let outcome = self.engine.lock().apply_feed(event);
        if let FeedOutcome::Skipped(reason) = &outcome {
            debug!(?reason, "feed event skipped");
        }
        Ok(true)
    }

    fn handle_drop(&self, id: SubscriptionId, reason: DropReason) -> Result<()> {
        {
            let mut state = self.state.lock();
            match &*state {
                FeedState::Live { id: live, .. } if *live == id => {}
                // Closed, or another consumer already handled this drop.
                _ => return Ok(()),
            }
            *state = if self.config.resync_on_feed_drop {
                FeedState::Reconnecting
            } else {
                FeedState::Disconnected(reason.clone())
            };
        }

        warn!(subscription = id.0, ?reason, "change feed dropped");
        self.notify(Notice::FeedDropped {
            reason: reason.clone(),
        });

        if !self.config.resync_on_feed_drop {
            return Err(SyncError::FeedDisconnected(reason));
        }

        let count = self.connect()?;
        info!(count, "resynchronized after feed drop");
        self.notify(Notice::Resynced { count });
        Ok(())
    }
}

/// Feed listener loop.
fn listen(inner: Arc<Inner>) {
    loop {
        let (id, receiver) = match inner.next_source() {
            Next::Read(id, receiver) => (id, receiver),
            Next::Wait => {
                thread::sleep(RECONNECT_POLL);
                continue;
            }
            Next::Stop(e) => {
                debug!(error = %e, "feed listener stopping");
                return;
            }
        };

        let event = receiver.recv().unwrap_or(FeedEvent::Dropped {
            reason: DropReason::Disconnected,
        });

        if let Err(e) = inner.dispatch(id, event) {
            warn!(error = %e, "feed listener stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn owner() -> OwnerId {
        OwnerId::new("u1").unwrap()
    }

    fn open(store: &Arc<MemoryStore>, config: SessionConfig) -> Session {
        Session::open(config, Some(owner()), store.clone(), store.clone()).unwrap()
    }

    #[test]
    fn test_open_requires_owner() {
        let store = Arc::new(MemoryStore::new());
        let result = Session::open(SessionConfig::default(), None, store.clone(), store);
        assert!(matches!(result, Err(SyncError::NotAuthenticated)));
    }

    #[test]
    fn test_open_loads_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store.insert_remote("A", "https://a", &owner());
        store.insert_remote("B", "https://b", &owner());

        let session = open(&store, SessionConfig::default());

        let titles: Vec<_> = session.bookmarks().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["B", "A"]);
    }

    #[test]
    fn test_open_fails_when_snapshot_fails() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_list(StoreFailure::network("offline"));

        let result = Session::open(
            SessionConfig::default(),
            Some(owner()),
            store.clone(),
            store.clone(),
        );

        assert!(matches!(result, Err(SyncError::Store(_))));
        assert_eq!(store.feed().subscription_count(), 0);
    }

    #[test]
    fn test_add_then_pump_keeps_single_entry() {
        let store = Arc::new(MemoryStore::new());
        let session = open(&store, SessionConfig::default());

        let committed = session.add("Site", "https://a.example").unwrap();
        assert_eq!(session.bookmarks(), vec![committed.clone()]);

        // The feed copy of the same insert is a duplicate.
        assert_eq!(session.pump_feed().unwrap(), 1);
        assert_eq!(session.bookmarks(), vec![committed]);
    }

    #[test]
    fn test_failed_add_emits_notice() {
        let store = Arc::new(MemoryStore::new());
        let session = open(&store, SessionConfig::default());
        let notices = session.notices();

        store.fail_next_insert(StoreFailure::network("offline"));
        let result = session.add("Site", "https://a.example");

        assert!(matches!(result, Err(SyncError::Store(_))));
        assert!(session.is_empty());
        assert_eq!(
            notices.try_recv().unwrap(),
            Notice::AddFailed {
                title: "Site".into(),
                failure: StoreFailure::network("offline"),
            }
        );
    }

    #[test]
    fn test_closed_session_rejects_operations() {
        let store = Arc::new(MemoryStore::new());
        let session = open(&store, SessionConfig::default());

        session.close();

        assert!(session.is_closed());
        assert_eq!(store.feed().subscription_count(), 0);
        assert!(matches!(session.add("A", "https://a"), Err(SyncError::SessionClosed)));
        assert!(matches!(session.pump_feed(), Err(SyncError::SessionClosed)));
        assert!(matches!(session.reconnect(), Err(SyncError::SessionClosed)));
    }

    #[test]
    fn test_drop_closes_subscription() {
        let store = Arc::new(MemoryStore::new());
        {
            let _session = open(&store, SessionConfig::default());
            assert_eq!(store.feed().subscription_count(), 1);
        }
        assert_eq!(store.feed().subscription_count(), 0);
    }
}
