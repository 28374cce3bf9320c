//! Session registry.
//!
//! Maps a session id to a slot holding at most one [`SessionRecord`]. The map
//! itself is guarded by a synchronous lock that is never held across an
//! `.await`; each slot has its own async mutex, which serializes every
//! operation on one session without blocking any other session.
//!
//! Each slot also carries a cancellation token that lives outside the mutex.
//! [`SessionRegistry::remove`] fires it before queueing for the lock, and
//! remote calls made through [`SessionGuard::until_cancelled`] give up when
//! it fires.

use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use webssh_core::{RemoteError, SessionId};

use crate::record::{ConnectionState, SessionRecord};

type Record = Arc<Mutex<Option<SessionRecord>>>;

#[derive(Clone, Default)]
struct Slot {
    record: Record,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    slots: RwLock<HashMap<SessionId, Slot>>,
    generation: AtomicU64,
}

/// Concurrency-safe store of live session records.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number to tag a new record with.
    pub fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Acquire exclusive access to a session's slot.
    ///
    /// Waits for any other operation on the same session to finish. A slot
    /// that was pruned while waiting is discarded and the current one is
    /// acquired instead.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        loop {
            let slot = self.slot(session_id);
            let guard = Arc::clone(&slot.record).lock_owned().await;
            if self.is_current(session_id, &slot.record) {
                return SessionGuard {
                    registry: self.clone(),
                    session_id: session_id.to_string(),
                    cancel: slot.cancel,
                    guard,
                };
            }
            debug!(session_id, "Slot was replaced while waiting, retrying");
        }
    }

    /// Whether a record is registered under `session_id`.
    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.read_slots().contains_key(session_id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_slots().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of a session, waiting for in-flight operations.
    pub async fn state(&self, session_id: &str) -> Option<ConnectionState> {
        if !self.contains(session_id) {
            return None;
        }
        self.lock(session_id).await.record().map(SessionRecord::state)
    }

    /// Tear down and forget a session.
    ///
    /// Pending remote calls on the session are cancelled first, so teardown
    /// never waits behind a call that does not return. Idempotent: returns
    /// `false` when nothing was registered.
    pub async fn remove(&self, session_id: &str) -> bool {
        let Some(cancel) = self
            .read_slots()
            .get(session_id)
            .map(|slot| slot.cancel.clone())
        else {
            return false;
        };
        cancel.cancel();

        let mut guard = self.lock(session_id).await;
        match guard.take() {
            Some(record) => {
                info!(session_id, "Removing session");
                record.close().await;
                true
            }
            None => false,
        }
    }

    /// Tear down a session only if it still holds the record tagged `generation`.
    ///
    /// Returns `true` when a teardown happened. The client is told through
    /// the record's sink.
    pub async fn remove_generation(&self, session_id: &str, generation: u64) -> bool {
        if !self.contains(session_id) {
            return false;
        }
        let mut guard = self.lock(session_id).await;
        if guard.record().is_none_or(|r| r.generation() != generation) {
            return false;
        }
        match guard.take() {
            Some(record) => {
                record.fail().await;
                true
            }
            None => false,
        }
    }

    fn slot(&self, session_id: &str) -> Slot {
        if let Some(slot) = self.read_slots().get(session_id) {
            return slot.clone();
        }
        let mut slots = self
            .inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        slots.entry(session_id.to_string()).or_default().clone()
    }

    fn is_current(&self, session_id: &str, record: &Record) -> bool {
        self.read_slots()
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(&current.record, record))
    }

    fn prune(&self, session_id: &str, record: &Record) {
        let mut slots = self
            .inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(&current.record, record))
        {
            slots.remove(session_id);
        }
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Slot>> {
        self.inner.slots.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one session's record.
///
/// Dropping a guard whose slot is empty removes the slot from the registry,
/// so a session id is registered only while it holds a record.
pub struct SessionGuard {
    registry: SessionRegistry,
    session_id: SessionId,
    cancel: CancellationToken,
    guard: OwnedMutexGuard<Option<SessionRecord>>,
}

impl SessionGuard {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The registered record, if any.
    #[must_use]
    pub fn record(&self) -> Option<&SessionRecord> {
        self.guard.as_ref()
    }

    pub fn record_mut(&mut self) -> Option<&mut SessionRecord> {
        self.guard.as_mut()
    }

    /// Register `record`, handing back the one it displaced.
    ///
    /// The caller owns the displaced record and must close it.
    pub fn put(&mut self, record: SessionRecord) -> Option<SessionRecord> {
        self.guard.replace(record)
    }

    /// Unregister the record without closing it.
    pub fn take(&mut self) -> Option<SessionRecord> {
        self.guard.take()
    }

    /// Whether a disconnect has been requested for this session.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a remote call, failing with [`RemoteError::Cancelled`] as soon as
    /// the session is being removed.
    ///
    /// # Errors
    /// Whatever the call returns, or [`RemoteError::Cancelled`].
    pub async fn until_cancelled<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::select! {
            () = self.cancel.cancelled() => Err(RemoteError::Cancelled),
            result = call => result,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.guard.is_none() {
            let record = Arc::clone(OwnedMutexGuard::mutex(&self.guard));
            self.registry.prune(&self.session_id, &record);
        }
    }
}
