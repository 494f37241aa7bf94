//! Conversation store: the canonical, recency-sorted conversation cache.
//!
//! DESIGN
//! ======
//! The server is the authority. Every mutation is a remote call followed by
//! a full reload, so concurrent mutations and push events converge on
//! whatever the server reports last. A failed call returns its error and
//! leaves the cache alone.
//!
//! Loading without a kind filter fetches personal and group lists
//! concurrently and merges them by id (a later duplicate overwrites the
//! earlier one), then sorts by `updated_at` descending.
//!
//! Archiving, deleting, or leaving the open conversation closes the view and
//! refreshes the unread badge.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::error::ApiError;
use crate::model::{Conversation, ConversationKind, Participant};
use crate::services::unread::UnreadCounter;
use crate::state::SharedState;

#[derive(Clone)]
pub struct ConversationStore {
    api: Arc<dyn ChatApi>,
    state: SharedState,
    unread: UnreadCounter,
    kind: Option<ConversationKind>,
}

impl ConversationStore {
    #[must_use]
    pub fn new(
        api: Arc<dyn ChatApi>,
        state: SharedState,
        unread: UnreadCounter,
        kind: Option<ConversationKind>,
    ) -> Self {
        Self { api, state, unread, kind }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Fetch the conversation list and replace the cache.
    ///
    /// # Errors
    ///
    /// Returns the first API error; the cache is left unchanged.
    pub async fn load(&self) -> Result<usize, ApiError> {
        let lists = match self.kind {
            Some(kind) => vec![self.api.list_conversations(kind).await?],
            None => {
                let (personal, group) = tokio::join!(
                    self.api.list_conversations(ConversationKind::Personal),
                    self.api.list_conversations(ConversationKind::Group),
                );
                vec![personal?, group?]
            }
        };

        let merged = merge_conversations(lists);
        let count = merged.len();
        self.state.write().await.replace_conversations(merged);
        Ok(count)
    }

    /// Reload, logging failure instead of returning it.
    pub async fn reload_logged(&self) {
        if let Err(e) = self.load().await {
            warn!(error = %e, "conversations: reload failed");
        }
    }

    pub async fn contains(&self, conversation_id: Uuid) -> bool {
        self.state.read().await.contains_conversation(conversation_id)
    }

    pub async fn get(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.state.read().await.conversation(conversation_id).cloned()
    }

    /// Fetch a single conversation straight from the server.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn fetch(&self, conversation_id: Uuid) -> Result<Conversation, ApiError> {
        self.api.get_conversation(conversation_id).await
    }

    /// # Errors
    ///
    /// Returns the API error.
    pub async fn group_members(&self, conversation_id: Uuid) -> Result<Vec<Participant>, ApiError> {
        self.api.get_group_members(conversation_id).await
    }

    /// # Errors
    ///
    /// Returns the API error.
    pub async fn contacts(&self) -> Result<Vec<Participant>, ApiError> {
        self.api.list_contacts().await
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn archive(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.api.archive_conversation(conversation_id).await?;
        info!(%conversation_id, "conversation archived");
        self.after_departure(conversation_id).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn unarchive(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.api.unarchive_conversation(conversation_id).await?;
        self.reload_logged().await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn delete(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.api.delete_conversation(conversation_id).await?;
        info!(%conversation_id, "conversation deleted");
        self.after_departure(conversation_id).await;
        Ok(())
    }

    /// Open (or create) the personal conversation with `recipient_id`.
    ///
    /// # Errors
    ///
    /// Returns the API error.
    pub async fn start_conversation(&self, recipient_id: Uuid) -> Result<Conversation, ApiError> {
        let conversation = self.api.get_or_create_conversation(recipient_id).await?;
        self.reload_logged().await;
        Ok(conversation)
    }

    /// # Errors
    ///
    /// Returns the API error.
    pub async fn create_group(&self, name: &str, member_ids: &[Uuid]) -> Result<Conversation, ApiError> {
        let conversation = self.api.create_group(name, member_ids).await?;
        info!(conversation_id = %conversation.id, members = member_ids.len(), "group created");
        self.reload_logged().await;
        Ok(conversation)
    }

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn add_members(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> Result<(), ApiError> {
        self.api.add_group_members(conversation_id, user_ids).await?;
        self.reload_logged().await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn remove_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.api.remove_group_member(conversation_id, user_id).await?;
        self.reload_logged().await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn leave_group(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.api.leave_group(conversation_id).await?;
        info!(%conversation_id, "left group");
        self.after_departure(conversation_id).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the API error; nothing local changes.
    pub async fn rename_group(&self, conversation_id: Uuid, name: &str) -> Result<(), ApiError> {
        self.api.update_group_name(conversation_id, name).await?;
        self.reload_logged().await;
        Ok(())
    }

    async fn after_departure(&self, conversation_id: Uuid) {
        self.state.write().await.close_if_active(conversation_id);
        self.reload_logged().await;
        self.unread.refresh_logged().await;
    }
}

/// Merge fetched lists by id in first-seen order, later duplicates winning,
/// then sort most recently updated first.
#[must_use]
pub fn merge_conversations(lists: Vec<Vec<Conversation>>) -> Vec<Conversation> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut merged: Vec<Conversation> = Vec::new();
    for conversation in lists.into_iter().flatten() {
        match index.get(&conversation.id) {
            Some(&slot) => merged[slot] = conversation,
            None => {
                index.insert(conversation.id, merged.len());
                merged.push(conversation);
            }
        }
    }
    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    merged
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
