//! Chat session: the facade that wires the services together.
//!
//! LIFECYCLE
//! =========
//! `start` subscribes the router to the push topics first, so no frame that
//! arrives during the initial load is lost, then loads the conversation list,
//! refreshes the unread badge, and spawns the poll task. `shutdown` closes
//! the bus, aborts every background task, and cancels pending typing expiry.
//!
//! A failed initial load is logged and the session still starts with an
//! empty, still-loading list; the next reload or push event fills it in.
//!
//! ERROR HANDLING
//! ==============
//! Every operation hands back the service's error as is. A failed mutation
//! changes nothing locally.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::config::SyncConfig;
use crate::content::EntityRef;
use crate::error::{ApiError, TransportError};
use crate::model::{AttachmentMeta, AttachmentUpload, Conversation, Message, Participant};
use crate::notify::Notifier;
use crate::services::attachment::AttachmentResolver;
use crate::services::conversation::ConversationStore;
use crate::services::message::{LoadOutcome, MessageSyncEngine};
use crate::services::router::RealtimeEventRouter;
use crate::services::typing::TypingTracker;
use crate::services::unread::UnreadCounter;
use crate::state::{SessionState, SharedState};
use crate::transport::{EventBus, Transport};

pub struct ChatSession {
    state: SharedState,
    bus: EventBus,
    store: ConversationStore,
    messages: MessageSyncEngine,
    unread: UnreadCounter,
    typing: TypingTracker,
    router: RealtimeEventRouter,
    router_tasks: Vec<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Build every service, subscribe to push topics, and run the initial
    /// load.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadySubscribed`] if another live session
    /// already holds the bus topics.
    pub async fn start(
        config: &SyncConfig,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn Transport>,
        bus: EventBus,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, TransportError> {
        let state = SessionState::shared();
        let unread = UnreadCounter::new(Arc::clone(&api), state.clone());
        let store =
            ConversationStore::new(Arc::clone(&api), state.clone(), unread.clone(), config.conversation_kind);
        let messages = MessageSyncEngine::new(
            Arc::clone(&api),
            state.clone(),
            store.clone(),
            unread.clone(),
            AttachmentResolver::new(Arc::clone(&api)),
        );
        let typing = TypingTracker::new(config.typing_expiry);
        let router = RealtimeEventRouter {
            api,
            state: state.clone(),
            store: store.clone(),
            unread: unread.clone(),
            typing: typing.clone(),
            notifier,
            transport,
            user_id: config.user_id,
        };

        let router_tasks = router.spawn(&bus)?;

        match store.load().await {
            Ok(count) => info!(count, "session: conversations loaded"),
            Err(e) => warn!(error = %e, "session: initial conversation load failed"),
        }
        unread.refresh_logged().await;
        let poll_task = unread.spawn_poll_task(config.unread_poll);

        info!(user_id = %config.user_id, "session started");
        Ok(Self { state, bus, store, messages, unread, typing, router, router_tasks, poll_task })
    }

    /// Stop background work. The session's state stays readable.
    pub fn shutdown(&mut self) {
        self.bus.close();
        for task in self.router_tasks.drain(..).chain(self.poll_task.take()) {
            task.abort();
        }
        self.typing.shutdown();
        info!("session stopped");
    }

    /// Close the bus, let the router finish every frame already published,
    /// then shut down.
    pub async fn drain(&mut self) {
        self.bus.close();
        for task in self.router_tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "session: router task failed");
            }
        }
        self.shutdown();
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.read().await.conversations.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn active_conversation(&self) -> Option<Uuid> {
        self.state.read().await.active_conversation
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.messages().await
    }

    pub async fn visible_messages(&self) -> Vec<Message> {
        self.messages.visible_messages().await
    }

    pub async fn unread_count(&self) -> u64 {
        self.unread.count().await
    }

    #[must_use]
    pub fn typing_users(&self) -> HashMap<Uuid, Uuid> {
        self.typing.users()
    }

    #[must_use]
    pub fn typing_in(&self, conversation_id: Uuid) -> Vec<Uuid> {
        self.typing.typing_in(conversation_id)
    }
}

#[allow(clippy::missing_errors_doc)]
impl ChatSession {
    // =========================================================================
    // CONVERSATIONS
    // =========================================================================

    /// # Errors
    ///
    /// Returns the API error; the cache is unchanged.
    pub async fn load_conversations(&self) -> Result<usize, ApiError> {
        self.store.load().await
    }

    /// Fetch one conversation from the server, bypassing the cache.
    pub async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, ApiError> {
        self.store.fetch(conversation_id).await
    }

    /// Closes the view if it is open.
    pub async fn archive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.store.archive(conversation_id).await
    }

    pub async fn unarchive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.store.unarchive(conversation_id).await
    }

    pub async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.store.delete(conversation_id).await
    }

    /// Get or create the personal conversation with `recipient_id`.
    pub async fn start_conversation(&self, recipient_id: Uuid) -> Result<Conversation, ApiError> {
        self.store.start_conversation(recipient_id).await
    }

    pub async fn create_group(&self, name: &str, member_ids: &[Uuid]) -> Result<Conversation, ApiError> {
        self.store.create_group(name, member_ids).await
    }

    pub async fn add_group_members(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> Result<(), ApiError> {
        self.store.add_members(conversation_id, user_ids).await
    }

    pub async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.store.remove_member(conversation_id, user_id).await
    }

    pub async fn leave_group(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.store.leave_group(conversation_id).await
    }

    pub async fn rename_group(&self, conversation_id: Uuid, name: &str) -> Result<(), ApiError> {
        self.store.rename_group(conversation_id, name).await
    }

    pub async fn group_members(&self, conversation_id: Uuid) -> Result<Vec<Participant>, ApiError> {
        self.store.group_members(conversation_id).await
    }

    pub async fn contacts(&self) -> Result<Vec<Participant>, ApiError> {
        self.store.contacts().await
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// # Errors
    ///
    /// Returns the API error if the page fetch fails. A failed switch leaves
    /// the new conversation active with an empty list.
    pub async fn open_conversation(&self, conversation_id: Uuid) -> Result<LoadOutcome, ApiError> {
        self.messages.load_messages(conversation_id).await
    }

    /// Close the open view without touching the server.
    pub async fn close_conversation(&self) {
        let mut state = self.state.write().await;
        state.active_conversation = None;
        state.messages.clear();
    }

    /// # Errors
    ///
    /// Returns the API error; nothing is appended.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        text: &str,
        attachment_ids: &[Uuid],
        entity_refs: &[EntityRef],
        attachment_metas: Option<Vec<AttachmentMeta>>,
    ) -> Result<Message, ApiError> {
        self.messages.send(conversation_id, text, attachment_ids, entity_refs, attachment_metas).await
    }

    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError> {
        self.messages.delete_message(message_id).await
    }

    /// Empties the open list if the conversation is active.
    pub async fn clear_chat(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.messages.clear_chat(conversation_id).await
    }

    pub async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        upload: AttachmentUpload,
    ) -> Result<AttachmentMeta, ApiError> {
        self.messages.upload_attachment(conversation_id, upload).await
    }

    // =========================================================================
    // UNREAD / TYPING
    // =========================================================================

    /// # Errors
    ///
    /// Returns the API error; the cached count is kept.
    pub async fn refresh_unread(&self) -> Result<u64, ApiError> {
        self.unread.refresh().await
    }

    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be queued.
    pub fn notify_typing(&self, conversation_id: Uuid, is_typing: bool) -> Result<(), TransportError> {
        self.router.notify_typing(conversation_id, is_typing)
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
