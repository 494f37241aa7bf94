//! Frame, the push-channel envelope.
//!
//! ARCHITECTURE
//! ============
//! Every push-channel message is a Frame: an event name plus a JSON payload.
//! The transport publishes inbound frames to the event bus, which routes on
//! `type` alone and never inspects `payload`. Typed payloads are decoded by
//! the handler that owns the topic.
//!
//! DESIGN
//! ======
//! - Inbound topics: `chat_message`, `typing_indicator`.
//! - Outbound topics: `typing_indicator` (conversation + flag only; the server
//!   stamps the user).
//! - Chat payloads decode straight into a `Message` with no REST round trip.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::content::parse_message_content;
use crate::model::{AttachmentMeta, Message};

// =============================================================================
// EVENT KINDS
// =============================================================================

/// Topic name for inbound chat messages.
pub const EVENT_CHAT_MESSAGE: &str = "chat_message";

/// Topic name for typing indicators, both directions.
pub const EVENT_TYPING_INDICATOR: &str = "typing_indicator";

/// Push topics the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChatMessage,
    TypingIndicator,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatMessage => EVENT_CHAT_MESSAGE,
            Self::TypingIndicator => EVENT_TYPING_INDICATOR,
        }
    }

    #[must_use]
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            EVENT_CHAT_MESSAGE => Some(Self::ChatMessage),
            EVENT_TYPING_INDICATOR => Some(Self::TypingIndicator),
            _ => None,
        }
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// Push-channel envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { event: event.into(), payload }
    }

    /// Outbound typing indicator for the current user.
    #[must_use]
    pub fn typing(conversation_id: Uuid, is_typing: bool) -> Self {
        Self::new(
            EVENT_TYPING_INDICATOR,
            serde_json::json!({ "conversation_id": conversation_id, "is_typing": is_typing }),
        )
    }

    /// Known topic of this frame, if any.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_event(&self.event)
    }

    /// Decode the payload into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the payload does not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Inline attachment summary carried by a `chat_message` push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSummary {
    pub id: Uuid,
    pub file_name: String,
    pub original_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub file_category: String,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub url: String,
}

/// Payload of an inbound `chat_message` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub encrypted_content: String,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub sender_public_key_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub sender_username: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<AttachmentSummary>>,
}

impl ChatMessagePayload {
    /// Decode into the engine's message shape, mapping attachment summaries
    /// into full metadata records.
    #[must_use]
    pub fn into_message(self) -> Message {
        let conversation_id = self.conversation_id;
        let sender_id = self.sender_id;
        let created_at = self.created_at;
        let attachment_metas = self.attachments.map(|items| {
            items
                .into_iter()
                .map(|a| AttachmentMeta {
                    id: a.id,
                    conversation_id,
                    uploader_id: sender_id,
                    file_name: a.file_name,
                    original_name: a.original_name,
                    content_type: a.content_type,
                    file_size: a.file_size,
                    storage_key: String::new(),
                    file_category: a.file_category,
                    width: a.width,
                    height: a.height,
                    created_at,
                    url: a.url,
                })
                .collect()
        });

        let plaintext = self.encrypted_content.clone();
        let parsed_content = parse_message_content(&plaintext);

        Message {
            id: self.message_id,
            conversation_id,
            sender_id,
            encrypted_content: self.encrypted_content,
            nonce: self.nonce.unwrap_or_default(),
            sender_public_key_id: self.sender_public_key_id,
            created_at,
            deleted_at: None,
            sender_username: self.sender_username,
            plaintext,
            parsed_content,
            attachment_metas,
        }
    }
}

/// Payload of an inbound `typing_indicator` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub is_typing: bool,
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
