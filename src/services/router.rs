//! Realtime event router. Turns push frames into local state changes.
//!
//! ARCHITECTURE
//! ============
//! At session start the router takes the single live subscription for each
//! push topic on the [`EventBus`] and consumes it in its own task:
//!
//! ```text
//! transport -> EventBus -> chat_message task ------> open list / notifier / refresh
//!                       \-> typing_indicator task -> TypingTracker
//! ```
//!
//! Handlers read the active conversation and the conversation cache through
//! the shared state on every event, never a copy taken at subscribe time.
//!
//! ERROR HANDLING
//! ==============
//! Malformed payloads are logged and dropped. Notifier failures are
//! swallowed. Refresh failures are logged; the next event or poll repairs
//! the view.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::error::TransportError;
use crate::frame::{ChatMessagePayload, EventKind, Frame, TypingPayload};
use crate::notify::Notifier;
use crate::services::conversation::ConversationStore;
use crate::services::typing::TypingTracker;
use crate::services::unread::UnreadCounter;
use crate::state::SharedState;
use crate::transport::{EventBus, Subscription, Transport};

#[derive(Clone)]
pub struct RealtimeEventRouter {
    pub(crate) api: Arc<dyn ChatApi>,
    pub(crate) state: SharedState,
    pub(crate) store: ConversationStore,
    pub(crate) unread: UnreadCounter,
    pub(crate) typing: TypingTracker,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) transport: Arc<dyn Transport>,
    /// The signed-in user; their own messages are never notified.
    pub(crate) user_id: Uuid,
}

impl RealtimeEventRouter {
    // =========================================================================
    // SUBSCRIPTION
    // =========================================================================

    /// Subscribe to both push topics and spawn one handler task per topic.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadySubscribed`] if either topic is
    /// already held by a live subscription. Nothing is spawned in that case.
    pub fn spawn(&self, bus: &EventBus) -> Result<Vec<JoinHandle<()>>, TransportError> {
        let chat = bus.subscribe(EventKind::ChatMessage)?;
        let typing = bus.subscribe(EventKind::TypingIndicator)?;
        Ok(vec![self.spawn_topic(chat), self.spawn_topic(typing)])
    }

    fn spawn_topic(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = subscription.recv().await {
                router.dispatch(&frame).await;
            }
            debug!(topic = subscription.kind().as_str(), "router: subscription closed");
        })
    }

    /// Route one frame to its handler.
    pub async fn dispatch(&self, frame: &Frame) {
        match frame.kind() {
            Some(EventKind::ChatMessage) => match frame.decode::<ChatMessagePayload>() {
                Ok(payload) => self.handle_chat_message(payload).await,
                Err(e) => warn!(error = %e, "router: malformed chat_message"),
            },
            Some(EventKind::TypingIndicator) => match frame.decode::<TypingPayload>() {
                Ok(payload) => self.handle_typing(payload),
                Err(e) => warn!(error = %e, "router: malformed typing_indicator"),
            },
            None => debug!(event = %frame.event, "router: unhandled event"),
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply an inbound message.
    pub async fn handle_chat_message(&self, payload: ChatMessagePayload) {
        let message = payload.into_message();
        let conversation_id = message.conversation_id;

        let active = {
            let mut state = self.state.write().await;
            let active = state.is_active(conversation_id);
            if active && !state.append_message(message.clone()) {
                debug!(message_id = %message.id, "router: duplicate message ignored");
            }
            active
        };

        if active {
            if let Err(e) = self.api.mark_conversation_read(conversation_id).await {
                warn!(%conversation_id, error = %e, "router: mark read failed");
            }
        }

        if message.sender_id != self.user_id {
            if let Err(e) = self.notifier.notify(&message) {
                debug!(error = %e, "router: notifier failed");
            }
        }

        self.store.reload_logged().await;
        self.unread.refresh_logged().await;
    }

    pub fn handle_typing(&self, payload: TypingPayload) {
        self.typing.handle_event(payload);
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Tell the other participants whether the current user is typing.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame cannot be queued.
    pub fn notify_typing(&self, conversation_id: Uuid, is_typing: bool) -> Result<(), TransportError> {
        self.transport.send(&Frame::typing(conversation_id, is_typing))
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
