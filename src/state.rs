//! Shared session state.
//!
//! DESIGN
//! ======
//! `SessionState` is the single owned container for everything the services
//! mutate: the conversation cache, the active conversation pointer, the open
//! message list, and the unread badge. It is shared as
//! `Arc<RwLock<SessionState>>`; event handlers always read through that
//! handle, so they see the cache as of the last reload rather than a copy
//! captured when they were registered.
//!
//! Locks are never held across a network await.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{Conversation, Message};

pub type SharedState = Arc<RwLock<SessionState>>;

// =============================================================================
// SESSION STATE
// =============================================================================

#[derive(Debug)]
pub struct SessionState {
    /// Sorted by `updated_at` descending, unique by id.
    pub conversations: Vec<Conversation>,
    /// True until the first successful conversation load.
    pub loading: bool,
    pub active_conversation: Option<Uuid>,
    /// Open conversation's messages, ascending by `created_at`.
    pub messages: Vec<Message>,
    /// Server-reported unread total.
    pub unread_count: u64,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            loading: true,
            active_conversation: None,
            messages: Vec::new(),
            unread_count: 0,
        }
    }

    #[must_use]
    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    #[must_use]
    pub fn conversation(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn contains_conversation(&self, id: Uuid) -> bool {
        self.conversation(id).is_some()
    }

    #[must_use]
    pub fn is_active(&self, id: Uuid) -> bool {
        self.active_conversation == Some(id)
    }

    /// Swap in a freshly loaded, already sorted conversation list.
    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.loading = false;
    }

    /// Close the open view if it shows `id`. Returns whether it did.
    pub fn close_if_active(&mut self, id: Uuid) -> bool {
        if !self.is_active(id) {
            return false;
        }
        self.active_conversation = None;
        self.messages.clear();
        true
    }

    /// Append to the open list unless a message with the same id is already
    /// there. Returns whether the message was added.
    pub fn append_message(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Tombstone a message in place. Returns whether it was found.
    pub fn mark_deleted(&mut self, message_id: Uuid, at: OffsetDateTime) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        message.deleted_at = Some(at);
        true
    }

    /// Messages that should be rendered (soft-deleted ones are skipped).
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_visible())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "test_helpers.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
