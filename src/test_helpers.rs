//! In-memory backend and fixtures shared by the service tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use time::{Duration, OffsetDateTime};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::api::ChatApi;
use crate::error::{ApiError, NotifyError};
use crate::frame::{EVENT_CHAT_MESSAGE, Frame};
use crate::model::{AttachmentMeta, AttachmentUpload, Conversation, ConversationKind, Message, Participant, RawMessage};
use crate::notify::Notifier;

/// Fixed reference instant so ordering in tests is deterministic.
#[must_use]
pub fn base_time() -> OffsetDateTime {
    time::macros::datetime!(2025-03-01 12:00 UTC)
}

#[must_use]
pub fn participant(user_id: Uuid, username: &str) -> Participant {
    Participant { user_id, username: username.into(), email: None, full_name: None, role: None }
}

#[must_use]
pub fn conversation(id: Uuid, is_group: bool, updated_at: OffsetDateTime) -> Conversation {
    Conversation {
        id,
        is_group,
        name: is_group.then(|| "group".to_string()),
        participants: Vec::new(),
        other_user: None,
        created_at: base_time(),
        updated_at,
        unread_count: 0,
        last_message: None,
    }
}

#[must_use]
pub fn raw_message(conversation_id: Uuid, sender_id: Uuid, content: &str, created_at: OffsetDateTime) -> RawMessage {
    RawMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        encrypted_content: content.into(),
        nonce: String::new(),
        sender_public_key_id: None,
        created_at,
        deleted_at: None,
        sender_username: Some("someone".into()),
    }
}

#[must_use]
pub fn attachment(id: Uuid, conversation_id: Uuid) -> AttachmentMeta {
    AttachmentMeta {
        id,
        conversation_id,
        uploader_id: Uuid::nil(),
        file_name: format!("{id}.png"),
        original_name: "photo.png".into(),
        content_type: "image/png".into(),
        file_size: 2048,
        storage_key: format!("attachments/{id}"),
        file_category: "image".into(),
        width: Some(640),
        height: Some(480),
        created_at: base_time(),
        url: format!("https://files.test/{id}"),
    }
}

/// Build the `chat_message` push frame the backend would emit for `raw`.
#[must_use]
pub fn chat_frame(raw: &RawMessage) -> Frame {
    Frame::new(
        EVENT_CHAT_MESSAGE,
        serde_json::json!({
            "message_id": raw.id,
            "conversation_id": raw.conversation_id,
            "sender_id": raw.sender_id,
            "encrypted_content": raw.encrypted_content,
            "nonce": raw.nonce,
            "created_at": raw.created_at.format(&time::format_description::well_known::Rfc3339).unwrap(),
            "sender_username": raw.sender_username,
        }),
    )
}

// =============================================================================
// MOCK BACKEND
// =============================================================================

/// Server-side state held by [`MockApi`].
pub struct MockServer {
    pub conversations: Vec<Conversation>,
    pub archived: HashSet<Uuid>,
    /// Per conversation, oldest first.
    pub messages: HashMap<Uuid, Vec<RawMessage>>,
    pub attachments: HashMap<Uuid, AttachmentMeta>,
    pub failing_attachments: HashSet<Uuid>,
    pub members: HashMap<Uuid, Vec<Participant>>,
    pub contacts: Vec<Participant>,
    /// Operations that fail with the given error until cleared.
    pub failures: HashMap<&'static str, ApiError>,
    /// When set, `list_messages` waits for a notification before answering.
    pub message_gate: Option<Arc<Notify>>,
    /// Every call in order, by operation name.
    pub calls: Vec<&'static str>,
    /// Instant of the most recent server-side write.
    pub clock: OffsetDateTime,
}

impl Default for MockServer {
    fn default() -> Self {
        Self {
            conversations: Vec::default(),
            archived: HashSet::default(),
            messages: HashMap::default(),
            attachments: HashMap::default(),
            failing_attachments: HashSet::default(),
            members: HashMap::default(),
            contacts: Vec::default(),
            failures: HashMap::default(),
            message_gate: None,
            calls: Vec::default(),
            clock: base_time(),
        }
    }
}

/// In-memory `ChatApi` with a deterministic clock and injectable failures.
pub struct MockApi {
    pub user_id: Uuid,
    server: Mutex<MockServer>,
}

impl MockApi {
    #[must_use]
    pub fn new(user_id: Uuid) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            server: Mutex::new(MockServer { clock: base_time(), ..MockServer::default() }),
        })
    }

    /// Direct access to the backing state.
    pub fn with<R>(&self, f: impl FnOnce(&mut MockServer) -> R) -> R {
        let mut server = self.server.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut server)
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.with(|s| {
            s.clock = s.clock.max(conversation.updated_at);
            s.conversations.push(conversation);
        });
    }

    pub fn add_attachment(&self, meta: AttachmentMeta) {
        self.with(|s| s.attachments.insert(meta.id, meta));
    }

    pub fn fail(&self, op: &'static str, error: ApiError) {
        self.with(|s| s.failures.insert(op, error));
    }

    pub fn heal(&self, op: &'static str) {
        self.with(|s| s.failures.remove(op));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.with(|s| s.calls.clone())
    }

    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| **c == op).count())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Store an incoming message from `sender` the way the backend does:
    /// bump the conversation to the top and count it unread.
    pub fn deliver(&self, conversation_id: Uuid, sender: Uuid, content: &str) -> RawMessage {
        self.with(|s| {
            let at = s.tick();
            let raw = raw_message(conversation_id, sender, content, at);
            s.messages.entry(conversation_id).or_default().push(raw.clone());
            if let Some(conv) = s.conversations.iter_mut().find(|c| c.id == conversation_id) {
                conv.updated_at = at;
                conv.unread_count += 1;
                conv.last_message = Some(raw.clone());
            }
            raw
        })
    }

    /// Seed history without touching unread counters.
    pub fn seed_message(&self, raw: RawMessage) {
        self.with(|s| s.messages.entry(raw.conversation_id).or_default().push(raw));
    }

    #[must_use]
    pub fn server_unread(&self) -> u64 {
        self.with(|s| s.unread_total())
    }

    fn enter(&self, op: &'static str) -> Result<(), ApiError> {
        self.with(|s| {
            s.calls.push(op);
            s.failures.get(op).cloned().map_or(Ok(()), Err)
        })
    }
}

impl MockServer {
    fn tick(&mut self) -> OffsetDateTime {
        self.clock += Duration::minutes(1);
        self.clock
    }

    fn unread_total(&self) -> u64 {
        self.conversations
            .iter()
            .filter(|c| !self.archived.contains(&c.id))
            .map(|c| u64::from(c.unread_count))
            .sum()
    }

    fn find(&mut self, id: Uuid) -> Result<&mut Conversation, ApiError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ApiError::NotFound("Conversation not found".into()))
    }

    fn remove(&mut self, id: Uuid) -> Result<(), ApiError> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return Err(ApiError::NotFound("Conversation not found".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatApi for MockApi {
    async fn list_conversations(&self, kind: ConversationKind) -> Result<Vec<Conversation>, ApiError> {
        self.enter("list_conversations")?;
        Ok(self.with(|s| {
            s.conversations
                .iter()
                .filter(|c| c.kind() == kind && !s.archived.contains(&c.id))
                .cloned()
                .collect()
        }))
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, ApiError> {
        self.enter("get_conversation")?;
        self.with(|s| s.find(conversation_id).map(|c| c.clone()))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<RawMessage>, ApiError> {
        self.enter("list_messages")?;
        let gate = self.with(|s| s.message_gate.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.with(|s| {
            let mut page = s.messages.get(&conversation_id).cloned().unwrap_or_default();
            page.reverse();
            page
        }))
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        _attachment_ids: &[Uuid],
    ) -> Result<RawMessage, ApiError> {
        self.enter("send_message")?;
        let user_id = self.user_id;
        self.with(|s| {
            let at = s.tick();
            let conv = s.find(conversation_id)?;
            conv.updated_at = at;
            let mut raw = raw_message(conversation_id, user_id, content, at);
            raw.sender_username = Some("me".into());
            conv.last_message = Some(raw.clone());
            s.messages.entry(conversation_id).or_default().push(raw.clone());
            Ok(raw)
        })
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.enter("mark_conversation_read")?;
        self.with(|s| {
            s.find(conversation_id)?.unread_count = 0;
            Ok(())
        })
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError> {
        self.enter("delete_message")?;
        self.with(|s| {
            let at = s.tick();
            let message = s
                .messages
                .values_mut()
                .flat_map(|list| list.iter_mut())
                .find(|m| m.id == message_id)
                .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;
            message.deleted_at = Some(at);
            Ok(())
        })
    }

    async fn clear_messages(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.enter("clear_messages")?;
        self.with(|s| {
            s.find(conversation_id)?;
            s.messages.remove(&conversation_id);
            Ok(())
        })
    }

    async fn archive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.enter("archive_conversation")?;
        self.with(|s| {
            s.find(conversation_id)?;
            s.archived.insert(conversation_id);
            Ok(())
        })
    }

    async fn unarchive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.enter("unarchive_conversation")?;
        self.with(|s| {
            s.find(conversation_id)?;
            s.archived.remove(&conversation_id);
            Ok(())
        })
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.enter("delete_conversation")?;
        self.with(|s| s.remove(conversation_id))
    }

    async fn get_or_create_conversation(&self, recipient_id: Uuid) -> Result<Conversation, ApiError> {
        self.enter("get_or_create_conversation")?;
        Ok(self.with(|s| {
            if let Some(existing) = s
                .conversations
                .iter()
                .find(|c| !c.is_group && c.other_user.as_ref().is_some_and(|u| u.user_id == recipient_id))
            {
                return existing.clone();
            }
            let at = s.tick();
            let mut conv = conversation(Uuid::new_v4(), false, at);
            conv.created_at = at;
            conv.other_user = Some(participant(recipient_id, "peer"));
            s.conversations.push(conv.clone());
            conv
        }))
    }

    async fn create_group(&self, name: &str, member_ids: &[Uuid]) -> Result<Conversation, ApiError> {
        self.enter("create_group")?;
        let user_id = self.user_id;
        Ok(self.with(|s| {
            let at = s.tick();
            let mut conv = conversation(Uuid::new_v4(), true, at);
            conv.created_at = at;
            conv.name = Some(name.to_string());
            conv.participants = std::iter::once(user_id)
                .chain(member_ids.iter().copied())
                .map(|id| participant(id, "member"))
                .collect();
            s.members.insert(conv.id, conv.participants.clone());
            s.conversations.push(conv.clone());
            conv
        }))
    }

    async fn get_group_members(&self, conversation_id: Uuid) -> Result<Vec<Participant>, ApiError> {
        self.enter("get_group_members")?;
        self.with(|s| {
            s.find(conversation_id)?;
            Ok(s.members.get(&conversation_id).cloned().unwrap_or_default())
        })
    }

    async fn add_group_members(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> Result<(), ApiError> {
        self.enter("add_group_members")?;
        self.with(|s| {
            let at = s.tick();
            s.find(conversation_id)?.updated_at = at;
            let members = s.members.entry(conversation_id).or_default();
            members.extend(user_ids.iter().map(|id| participant(*id, "member")));
            Ok(())
        })
    }

    async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.enter("remove_group_member")?;
        self.with(|s| {
            s.find(conversation_id)?;
            if let Some(members) = s.members.get_mut(&conversation_id) {
                members.retain(|m| m.user_id != user_id);
            }
            Ok(())
        })
    }

    async fn leave_group(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.enter("leave_group")?;
        self.with(|s| s.remove(conversation_id))
    }

    async fn update_group_name(&self, conversation_id: Uuid, name: &str) -> Result<(), ApiError> {
        self.enter("update_group_name")?;
        self.with(|s| {
            s.find(conversation_id)?.name = Some(name.to_string());
            Ok(())
        })
    }

    async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        upload: AttachmentUpload,
    ) -> Result<AttachmentMeta, ApiError> {
        self.enter("upload_attachment")?;
        let user_id = self.user_id;
        Ok(self.with(|s| {
            let mut meta = attachment(Uuid::new_v4(), conversation_id);
            meta.uploader_id = user_id;
            meta.original_name = upload.file_name;
            meta.content_type = upload.content_type;
            meta.file_size = i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX);
            s.attachments.insert(meta.id, meta.clone());
            meta
        }))
    }

    async fn get_attachment(&self, attachment_id: Uuid) -> Result<AttachmentMeta, ApiError> {
        self.enter("get_attachment")?;
        self.with(|s| {
            if s.failing_attachments.contains(&attachment_id) {
                return Err(ApiError::Status { status: 500, body: "storage unavailable".into() });
            }
            s.attachments
                .get(&attachment_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound("Attachment not found".into()))
        })
    }

    async fn get_unread_count(&self) -> Result<u64, ApiError> {
        self.enter("get_unread_count")?;
        Ok(self.server_unread())
    }

    async fn list_contacts(&self) -> Result<Vec<Participant>, ApiError> {
        self.enter("list_contacts")?;
        Ok(self.with(|s| s.contacts.clone()))
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

/// Notifier that records every message it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    pub seen: Mutex<Vec<Uuid>>,
    pub fail: bool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &Message) -> Result<(), NotifyError> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).push(message.id);
        if self.fail {
            return Err(NotifyError("audio device busy".into()));
        }
        Ok(())
    }
}
