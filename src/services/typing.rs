//! Typing presence tracker.
//!
//! DESIGN
//! ======
//! One entry per user: `user_id -> conversation_id`. A `true` event upserts
//! the entry and arms a fresh expiry task; a `false` event removes it at
//! once. Each user has at most one pending expiry. Re-arming aborts the
//! previous task, and every entry carries a generation so a task that fires
//! after being superseded (abort raced the timer) removes nothing.
//!
//! The map lives behind a `std::sync::Mutex`: critical sections are short
//! and never await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::frame::TypingPayload;

struct TypingEntry {
    conversation_id: Uuid,
    generation: u64,
    expiry: JoinHandle<()>,
}

#[derive(Default)]
struct TypingMap {
    entries: HashMap<Uuid, TypingEntry>,
    next_generation: u64,
}

#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<Mutex<TypingMap>>,
    expiry: Duration,
}

impl TypingTracker {
    #[must_use]
    pub fn new(expiry: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(TypingMap::default())), expiry }
    }

    /// Apply one inbound typing event. Must be called inside a tokio runtime.
    pub fn handle_event(&self, event: TypingPayload) {
        if event.is_typing {
            self.start(event.user_id, event.conversation_id);
        } else {
            self.stop(event.user_id);
        }
    }

    fn start(&self, user_id: Uuid, conversation_id: Uuid) {
        let mut map = self.lock();
        let generation = map.next_generation;
        map.next_generation += 1;

        if let Some(previous) = map.entries.remove(&user_id) {
            previous.expiry.abort();
        }

        let inner = Arc::clone(&self.inner);
        let ttl = self.expiry;
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut map = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.entries.get(&user_id).is_some_and(|e| e.generation == generation) {
                map.entries.remove(&user_id);
                debug!(%user_id, "typing: expired");
            }
        });

        map.entries.insert(user_id, TypingEntry { conversation_id, generation, expiry });
    }

    fn stop(&self, user_id: Uuid) {
        if let Some(entry) = self.lock().entries.remove(&user_id) {
            entry.expiry.abort();
        }
    }

    /// Snapshot of `user_id -> conversation_id` for everyone typing.
    #[must_use]
    pub fn users(&self) -> HashMap<Uuid, Uuid> {
        self.lock().entries.iter().map(|(user, e)| (*user, e.conversation_id)).collect()
    }

    /// Users currently typing in one conversation.
    #[must_use]
    pub fn typing_in(&self, conversation_id: Uuid) -> Vec<Uuid> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, e)| e.conversation_id == conversation_id)
            .map(|(user, _)| *user)
            .collect()
    }

    #[must_use]
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.lock().entries.contains_key(&user_id)
    }

    /// Abort every pending expiry and forget all entries.
    pub fn shutdown(&self) {
        let mut map = self.lock();
        for (_, entry) in map.entries.drain() {
            entry.expiry.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TypingMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "typing_test.rs"]
mod tests;
