//! Message sync for the open conversation.
//!
//! DESIGN
//! ======
//! At most one conversation is open. Loading it fetches the first page
//! (newest first from the server), decodes and reverses it into ascending
//! order, resolves attachment metadata for the whole page in one batch, and
//! replaces the open list. It then marks the conversation read and refreshes
//! the unread badge and the conversation list.
//!
//! A load for an id the cache does not know is treated as stale: the list is
//! reloaded and no messages are fetched. A load whose conversation stopped
//! being active while the page was in flight leaves the list alone.
//!
//! Sends append the server's echo of the message to the open list. Appends
//! are de-duplicated by id, so a push of the same message is a no-op.
//!
//! TRADE-OFFS
//! ==========
//! Deletes are soft: the tombstoned message keeps its slot so indices held by
//! a renderer stay valid. Only `clear_chat` empties the list.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::content::{EntityRef, build_message_content};
use crate::error::ApiError;
use crate::model::{AttachmentMeta, AttachmentUpload, Message};
use crate::services::attachment::{AttachmentResolver, project};
use crate::services::conversation::ConversationStore;
use crate::services::unread::UnreadCounter;
use crate::state::SharedState;

/// Result of [`MessageSyncEngine::load_messages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The open list now holds this many messages.
    Loaded(usize),
    /// The id was not in the conversation cache; the cache was reloaded.
    StaleConversation,
    /// Another conversation was opened before the page arrived.
    Superseded,
}

#[derive(Clone)]
pub struct MessageSyncEngine {
    api: Arc<dyn ChatApi>,
    state: SharedState,
    store: ConversationStore,
    unread: UnreadCounter,
    attachments: AttachmentResolver,
}

impl MessageSyncEngine {
    #[must_use]
    pub fn new(
        api: Arc<dyn ChatApi>,
        state: SharedState,
        store: ConversationStore,
        unread: UnreadCounter,
        attachments: AttachmentResolver,
    ) -> Self {
        Self { api, state, store, unread, attachments }
    }

    // =========================================================================
    // LOAD
    // =========================================================================

    /// Open `conversation_id` and load its first page of messages.
    ///
    /// # Errors
    ///
    /// Returns the API error if the page fetch fails. A failed reload of the
    /// open conversation keeps its list; a failed switch leaves the list
    /// empty. Mark-read and refresh failures are logged, not returned.
    pub async fn load_messages(&self, conversation_id: Uuid) -> Result<LoadOutcome, ApiError> {
        if !self.store.contains(conversation_id).await {
            warn!(%conversation_id, "messages: conversation not in cache, reloading list");
            self.store.reload_logged().await;
            return Ok(LoadOutcome::StaleConversation);
        }

        let previous = self.state.write().await.active_conversation.replace(conversation_id);

        let page = match self.api.list_messages(conversation_id).await {
            Ok(page) => page,
            Err(e) => {
                if previous != Some(conversation_id) {
                    self.clear_if_active(conversation_id).await;
                }
                return Err(e);
            }
        };
        let mut messages: Vec<Message> = page.into_iter().rev().map(Message::from_raw).collect();
        messages.sort_by_key(|m| m.created_at);
        self.enrich(&mut messages).await;

        let count = messages.len();
        {
            let mut state = self.state.write().await;
            if !state.is_active(conversation_id) {
                debug!(%conversation_id, "messages: load superseded");
                return Ok(LoadOutcome::Superseded);
            }
            state.messages = messages;
        }
        debug!(%conversation_id, count, "messages: loaded");

        if let Err(e) = self.api.mark_conversation_read(conversation_id).await {
            warn!(%conversation_id, error = %e, "messages: mark read failed");
        }
        self.unread.refresh_logged().await;
        self.store.reload_logged().await;

        Ok(LoadOutcome::Loaded(count))
    }

    /// The open list must never hold another conversation's messages.
    async fn clear_if_active(&self, conversation_id: Uuid) {
        let mut state = self.state.write().await;
        if state.is_active(conversation_id) {
            state.messages.clear();
        }
    }

    async fn enrich(&self, messages: &mut [Message]) {
        let ids: Vec<Uuid> = messages
            .iter()
            .flat_map(|m| m.parsed_content.attachments.iter().copied())
            .collect();
        if ids.is_empty() {
            return;
        }

        let resolved = self.attachments.resolve(&ids).await;
        for message in messages.iter_mut().filter(|m| !m.parsed_content.attachments.is_empty()) {
            message.attachment_metas = Some(project(&message.parsed_content.attachments, &resolved));
        }
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Send a message and append the server's copy to the open list.
    ///
    /// `attachment_metas` is what the caller already knows about the files it
    /// uploaded; it is attached to the appended message as-is.
    ///
    /// # Errors
    ///
    /// Returns the API error; nothing is appended.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        text: &str,
        attachment_ids: &[Uuid],
        entity_refs: &[EntityRef],
        attachment_metas: Option<Vec<AttachmentMeta>>,
    ) -> Result<Message, ApiError> {
        let content = build_message_content(text, attachment_ids, entity_refs);
        let raw = self.api.send_message(conversation_id, &content, attachment_ids).await?;

        let mut message = Message::from_raw(raw);
        message.attachment_metas = attachment_metas;
        {
            let mut state = self.state.write().await;
            if state.is_active(conversation_id) {
                state.append_message(message.clone());
            }
        }
        info!(%conversation_id, message_id = %message.id, "message sent");

        self.store.reload_logged().await;
        Ok(message)
    }

    /// Soft-delete a message.
    ///
    /// # Errors
    ///
    /// Returns the API error; the local copy is untouched.
    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError> {
        self.api.delete_message(message_id).await?;
        self.state.write().await.mark_deleted(message_id, OffsetDateTime::now_utc());
        self.store.reload_logged().await;
        Ok(())
    }

    /// Remove every message in a conversation.
    ///
    /// # Errors
    ///
    /// Returns the API error; the local list is untouched.
    pub async fn clear_chat(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.api.clear_messages(conversation_id).await?;
        {
            let mut state = self.state.write().await;
            if state.is_active(conversation_id) {
                state.messages.clear();
            }
        }
        info!(%conversation_id, "chat cleared");
        self.store.reload_logged().await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the API error.
    pub async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        upload: AttachmentUpload,
    ) -> Result<AttachmentMeta, ApiError> {
        self.api.upload_attachment(conversation_id, upload).await
    }

    /// Snapshot of the open list, tombstones included.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    /// Snapshot of the open list without soft-deleted messages.
    pub async fn visible_messages(&self) -> Vec<Message> {
        self.state.read().await.visible_messages().cloned().collect()
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
