//! In-memory stores for pending logins and active sessions.
//!
//! Each store guards its map with a single lock held only for the map
//! operation itself, never across an `.await`.

use chrono::{DateTime, Duration, Utc};
use goboard_access::{LoginChallenge, PendingAuthRequest, Session, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Logins started by `/login` and awaiting their callback, keyed by `state`.
#[derive(Clone)]
pub struct PendingRequestStore {
    entries: Arc<Mutex<HashMap<String, PendingAuthRequest>>>,
    ttl: Duration,
}

impl PendingRequestStore {
    /// Creates an empty store whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Generates a fresh state/nonce/verifier triple and records it.
    pub fn begin(&self) -> LoginChallenge {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let challenge = LoginChallenge::generate();
            if !entries.contains_key(&challenge.state) {
                entries.insert(challenge.state.clone(), PendingAuthRequest::from(&challenge));
                return challenge;
            }
        }
    }

    /// Removes and returns the entry for `state`.
    ///
    /// The entry is gone after this call whatever the outcome, so a replayed
    /// or expired `state` yields `None`.
    pub fn consume(&self, state: &str) -> Option<PendingAuthRequest> {
        let pending = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(state)?;
        if pending.is_expired(Utc::now(), self.ttl) {
            return None;
        }
        Some(pending)
    }

    /// Drops entries older than the TTL. Returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_expired(now, self.ttl));
        before - entries.len()
    }

    /// Returns the number of pending logins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no login is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Active sessions keyed by the session cookie value.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `session` under `id`. Returns false if `id` is already taken.
    pub fn create(&self, id: SessionId, session: Session) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return false;
        }
        sessions.insert(id, session);
        true
    }

    /// Returns a snapshot of the session.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Applies `mutate` under the write lock and returns the updated session.
    ///
    /// Readers observe either the whole update or none of it.
    pub fn update<F>(&self, id: &SessionId, mutate: F) -> Option<Session>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(id)?;
        mutate(session);
        Some(session.clone())
    }

    /// Removes the session, returning it if it existed.
    pub fn delete(&self, id: &SessionId) -> Option<Session> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Drops sessions that can never be refreshed again. Returns how many were removed.
    pub fn remove_stale(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_stale(now));
        before - sessions.len()
    }

    /// Returns the number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
