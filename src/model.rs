//! Domain records shared by the REST client, the push channel, and the
//! services.
//!
//! DESIGN
//! ======
//! Wire shapes mirror the messaging backend's JSON. `RawMessage` is what the
//! server returns; `Message` is the decoded form the engine keeps in its open
//! list, with plaintext and structured content derived once at decode time.
//! Message bodies arrive as usable plaintext in `encrypted_content`; key
//! management and decryption live outside this crate.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::content::{ParsedContent, parse_message_content};

// =============================================================================
// CONVERSATION
// =============================================================================

/// Personal (1:1) or group thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Personal,
    Group,
}

impl ConversationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Group => "group",
        }
    }
}

impl std::str::FromStr for ConversationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "group" => Ok(Self::Group),
            other => Err(format!("unknown conversation kind '{other}'")),
        }
    }
}

/// Conversation member or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Cached copy of a server conversation. The server is the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub name: Option<String>,
    /// Group members. Empty for personal conversations.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// The peer of a personal conversation.
    #[serde(default)]
    pub other_user: Option<Participant>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Drives the recency sort of the conversation list.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Unread messages for the current user, computed by the server.
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<RawMessage>,
}

impl Conversation {
    #[must_use]
    pub fn kind(&self) -> ConversationKind {
        if self.is_group { ConversationKind::Group } else { ConversationKind::Personal }
    }

    #[must_use]
    pub fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// Message as returned by the REST backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub encrypted_content: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub sender_public_key_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub sender_username: Option<String>,
}

/// Decoded message held in the open conversation's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub encrypted_content: String,
    pub nonce: String,
    pub sender_public_key_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Soft-delete tombstone. The message keeps its index in the list.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    pub sender_username: Option<String>,
    pub plaintext: String,
    pub parsed_content: ParsedContent,
    pub attachment_metas: Option<Vec<AttachmentMeta>>,
}

impl Message {
    /// Decode a server message. Content is already plaintext at this layer.
    #[must_use]
    pub fn from_raw(raw: RawMessage) -> Self {
        let plaintext = raw.encrypted_content.clone();
        let parsed_content = parse_message_content(&plaintext);
        Self {
            id: raw.id,
            conversation_id: raw.conversation_id,
            sender_id: raw.sender_id,
            encrypted_content: raw.encrypted_content,
            nonce: raw.nonce,
            sender_public_key_id: raw.sender_public_key_id,
            created_at: raw.created_at,
            deleted_at: raw.deleted_at,
            sender_username: raw.sender_username,
            plaintext,
            parsed_content,
            attachment_metas: None,
        }
    }

    /// Soft-deleted messages are kept but not rendered.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Resolved descriptive record for a file referenced by id in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub uploader_id: Uuid,
    pub file_name: String,
    pub original_name: String,
    pub content_type: String,
    pub file_size: i64,
    #[serde(default)]
    pub storage_key: String,
    pub file_category: String,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub url: String,
}

/// File handed to `upload_attachment`.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
