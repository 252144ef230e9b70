//! Session store — owned map from chat identity to an in-flight session.
//!
//! Each chat id gets its own async mutex slot. Holding a [`SessionGuard`]
//! serializes every read/compare/remove for that chat while leaving other
//! chats untouched.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use super::session::{ChatId, VerificationSession};

type Slot = Arc<AsyncMutex<Option<VerificationSession>>>;

/// Process-wide session store, built once at startup.
#[derive(Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<ChatId, Slot>>,
}

impl SessionStore {
    /// Create a new, empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire exclusive access to the session slot of `chat_id`.
    ///
    /// Waits while another task holds the same chat. The outer map lock is
    /// only held long enough to find or create the slot.
    pub async fn lock(&self, chat_id: &ChatId) -> SessionGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(chat_id.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        SessionGuard {
            store: self,
            chat_id: chat_id.clone(),
            guard,
        }
    }

    /// Snapshot of the session for `chat_id`, if any.
    pub async fn get(&self, chat_id: &ChatId) -> Option<VerificationSession> {
        self.lock(chat_id).await.clone()
    }

    /// Drop the session for `chat_id`. Returns the removed session.
    pub async fn remove(&self, chat_id: &ChatId) -> Option<VerificationSession> {
        self.lock(chat_id).await.take()
    }

    /// Number of chats with a live slot. Idle chats are pruned, so this is
    /// the count of sessions plus slots currently being worked on.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the slot of `chat_id` when its session is gone and nobody
    /// else holds or waits on it. Called with the slot still locked.
    fn prune(&self, chat_id: &ChatId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one inside the guard being dropped.
        if slots.get(chat_id).is_some_and(|slot| Arc::strong_count(slot) == 2) {
            slots.remove(chat_id);
            debug!(chat_id = %chat_id, "Pruned empty session slot");
        }
    }
}

/// Exclusive handle on one chat's session. Derefs to the optional session.
pub struct SessionGuard<'a> {
    store: &'a SessionStore,
    chat_id: ChatId,
    guard: OwnedMutexGuard<Option<VerificationSession>>,
}

impl SessionGuard<'_> {
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }
}

impl Deref for SessionGuard<'_> {
    type Target = Option<VerificationSession>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.guard.is_none() {
            self.store.prune(&self.chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn session(chat: i64) -> VerificationSession {
        VerificationSession::issue(ChatId::from(chat), "user@example.org")
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = SessionStore::new();
        let chat = ChatId::from(1);
        assert!(store.get(&chat).await.is_none());

        let issued = session(1);
        *store.lock(&chat).await = Some(issued.clone());

        let stored = store.get(&chat).await.unwrap();
        assert_eq!(stored.code, issued.code);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn at_most_one_session_per_chat() {
        let store = SessionStore::new();
        let chat = ChatId::from(1);

        *store.lock(&chat).await = Some(session(1));
        let replacement = session(1);
        *store.lock(&chat).await = Some(replacement.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&chat).await.unwrap().code, replacement.code);
    }

    #[tokio::test]
    async fn remove_prunes_slot() {
        let store = SessionStore::new();
        let chat = ChatId::from(1);
        *store.lock(&chat).await = Some(session(1));

        assert!(store.remove(&chat).await.is_some());
        assert!(store.get(&chat).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn looking_up_absent_chat_leaves_no_slot() {
        let store = SessionStore::new();
        assert!(store.get(&ChatId::from(99)).await.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn chats_are_independent() {
        let store = SessionStore::new();
        *store.lock(&ChatId::from(1)).await = Some(session(1));
        *store.lock(&ChatId::from(2)).await = Some(session(2));

        store.remove(&ChatId::from(1)).await;
        assert!(store.get(&ChatId::from(2)).await.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn same_chat_is_serialized() {
        let store = SessionStore::new();
        let chat = ChatId::from(1);

        let guard = store.lock(&chat).await;

        let contender = {
            let store = Arc::clone(&store);
            let chat = chat.clone();
            tokio::spawn(async move {
                let mut guard = store.lock(&chat).await;
                // Sees the first holder's write, proving it waited.
                let seen = guard.is_some();
                *guard = None;
                seen
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let mut guard = guard;
        *guard = Some(session(1));
        drop(guard);

        assert!(contender.await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn other_chat_is_not_blocked() {
        let store = SessionStore::new();
        let _held = store.lock(&ChatId::from(1)).await;

        let other = tokio::time::timeout(Duration::from_millis(200), store.lock(&ChatId::from(2))).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn waiting_task_keeps_slot_alive() {
        let store = SessionStore::new();
        let chat = ChatId::from(5);

        let guard = store.lock(&chat).await;
        let waiter = {
            let store = Arc::clone(&store);
            let chat = chat.clone();
            tokio::spawn(async move {
                let mut guard = store.lock(&chat).await;
                *guard = Some(session(5));
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Empty guard dropped while a waiter holds the slot: slot must survive.
        drop(guard);
        waiter.await.unwrap();

        assert!(store.get(&chat).await.is_some());
        assert_eq!(store.len(), 1);
    }
}
