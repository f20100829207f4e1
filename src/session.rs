use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Position in the order-taking flow. Transitions are monotonic within one
/// order lifecycle; cancellation short-circuits back to `None` from any
/// stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    None,
    AwaitingQty,
    AwaitingPaymentMethod,
    AwaitingAddressTransfer,
    AwaitingAddressCod,
}

/// Per-user dialogue state. In-process and best-effort only: a restart
/// loses every session, and persisted orders remain the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub stage: Stage,
    pub last_product_code: Option<String>,
    pub pending_order_id: Option<String>,
}

/// Key-value session state keyed by user id, injected into the dialogue
/// orchestrator. `get` on an unknown user returns the empty session.
pub trait SessionStore: Send + Sync {
    fn get(&self, user_id: &str) -> Session;
    fn put(&self, user_id: &str, session: Session);
    fn clear(&self, user_id: &str);
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, user_id: &str) -> Session {
        self.guard().get(user_id).cloned().unwrap_or_default()
    }

    fn put(&self, user_id: &str, session: Session) {
        self.guard().insert(user_id.to_string(), session);
    }

    fn clear(&self, user_id: &str) {
        self.guard().remove(user_id);
    }
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn get(&self, user_id: &str) -> Session {
        (**self).get(user_id)
    }

    fn put(&self, user_id: &str, session: Session) {
        (**self).put(user_id, session)
    }

    fn clear(&self, user_id: &str) {
        (**self).clear(user_id)
    }
}

/// Per-user mutex map. The dispatcher holds a user's lock for the whole
/// handling of one message, so same-user messages serialize while messages
/// from different users run in parallel. Entries are never pruned; the map
/// keeps one mutex per user id ever seen.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
