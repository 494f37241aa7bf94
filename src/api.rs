//! REST surface of the messaging backend.
//!
//! DESIGN
//! ======
//! `ChatApi` is the seam between the engine and the backend: services only
//! ever talk to `Arc<dyn ChatApi>`, so tests swap in an in-memory mock.
//! `HttpChatApi` is a thin `reqwest` wrapper over `/api/v1/messaging`. Route
//! mapping, status mapping and body parsing are pure functions.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::model::{AttachmentMeta, AttachmentUpload, Conversation, ConversationKind, Participant, RawMessage};

const API_PREFIX: &str = "/api/v1/messaging";

// =============================================================================
// TRAIT
// =============================================================================

/// Async REST surface consumed by the engine. Enables mocking in tests.
///
/// Success-only endpoints return `Ok(())`; every failure carries an
/// [`ApiError`] kind instead of a bare boolean.
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self, kind: ConversationKind) -> Result<Vec<Conversation>, ApiError>;

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, ApiError>;

    /// First page of messages, newest first.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<RawMessage>, ApiError>;

    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        attachment_ids: &[Uuid],
    ) -> Result<RawMessage, ApiError>;

    async fn mark_conversation_read(&self, conversation_id: Uuid) -> Result<(), ApiError>;

    async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError>;

    async fn clear_messages(&self, conversation_id: Uuid) -> Result<(), ApiError>;

    async fn archive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError>;

    async fn unarchive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError>;

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError>;

    /// Idempotent: returns the existing personal conversation if there is one.
    async fn get_or_create_conversation(&self, recipient_id: Uuid) -> Result<Conversation, ApiError>;

    async fn create_group(&self, name: &str, member_ids: &[Uuid]) -> Result<Conversation, ApiError>;

    async fn get_group_members(&self, conversation_id: Uuid) -> Result<Vec<Participant>, ApiError>;

    async fn add_group_members(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> Result<(), ApiError>;

    async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), ApiError>;

    async fn leave_group(&self, conversation_id: Uuid) -> Result<(), ApiError>;

    async fn update_group_name(&self, conversation_id: Uuid, name: &str) -> Result<(), ApiError>;

    async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        upload: AttachmentUpload,
    ) -> Result<AttachmentMeta, ApiError>;

    async fn get_attachment(&self, attachment_id: Uuid) -> Result<AttachmentMeta, ApiError>;

    async fn get_unread_count(&self) -> Result<u64, ApiError>;

    /// Users the current user can start a conversation with.
    async fn list_contacts(&self) -> Result<Vec<Participant>, ApiError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpChatApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatApi {
    /// Build an HTTP client from session config.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest` client fails to build.
    pub fn new(config: &SyncConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: format!("{}{API_PREFIX}", config.api_base_url), token: config.api_token.clone() })
    }

    fn request(&self, endpoint: &Endpoint) -> reqwest::RequestBuilder {
        let (method, path) = endpoint.route();
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| ApiError::Network(e.to_string()))?;
        check_status(status, text)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ApiError> {
        let text = self.execute(self.with_body(&endpoint, body)).await?;
        parse_body(&text)
    }

    /// Call a success-only endpoint; the body is ignored.
    async fn send_ok(&self, endpoint: Endpoint, body: Option<&serde_json::Value>) -> Result<(), ApiError> {
        self.execute(self.with_body(&endpoint, body)).await.map(|_| ())
    }

    fn with_body(&self, endpoint: &Endpoint, body: Option<&serde_json::Value>) -> reqwest::RequestBuilder {
        let builder = self.request(endpoint);
        match body {
            Some(body) => builder.json(body),
            None => builder,
        }
    }
}

#[async_trait::async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self, kind: ConversationKind) -> Result<Vec<Conversation>, ApiError> {
        self.fetch(Endpoint::ListConversations(kind), None).await
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Conversation, ApiError> {
        self.fetch(Endpoint::GetConversation(conversation_id), None).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<RawMessage>, ApiError> {
        self.fetch(Endpoint::ListMessages(conversation_id), None).await
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        attachment_ids: &[Uuid],
    ) -> Result<RawMessage, ApiError> {
        let mut body = serde_json::json!({ "content": content });
        if !attachment_ids.is_empty() {
            body["attachment_ids"] = serde_json::json!(attachment_ids);
        }
        self.fetch(Endpoint::SendMessage(conversation_id), Some(&body)).await
    }

    async fn mark_conversation_read(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::MarkRead(conversation_id), None).await
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::DeleteMessage(message_id), None).await
    }

    async fn clear_messages(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::ClearMessages(conversation_id), None).await
    }

    async fn archive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::Archive(conversation_id), None).await
    }

    async fn unarchive_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::Unarchive(conversation_id), None).await
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::DeleteConversation(conversation_id), None).await
    }

    async fn get_or_create_conversation(&self, recipient_id: Uuid) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({ "recipient_id": recipient_id });
        self.fetch(Endpoint::GetOrCreateConversation, Some(&body)).await
    }

    async fn create_group(&self, name: &str, member_ids: &[Uuid]) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({ "name": name, "participant_ids": member_ids });
        self.fetch(Endpoint::CreateGroup, Some(&body)).await
    }

    async fn get_group_members(&self, conversation_id: Uuid) -> Result<Vec<Participant>, ApiError> {
        self.fetch(Endpoint::GroupMembers(conversation_id), None).await
    }

    async fn add_group_members(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> Result<(), ApiError> {
        let body = serde_json::json!({ "user_ids": user_ids });
        self.send_ok(Endpoint::AddMembers(conversation_id), Some(&body)).await
    }

    async fn remove_group_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let body = serde_json::json!({ "user_id": user_id });
        self.send_ok(Endpoint::RemoveMember(conversation_id), Some(&body)).await
    }

    async fn leave_group(&self, conversation_id: Uuid) -> Result<(), ApiError> {
        self.send_ok(Endpoint::LeaveGroup(conversation_id), None).await
    }

    async fn update_group_name(&self, conversation_id: Uuid, name: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "name": name });
        self.send_ok(Endpoint::RenameGroup(conversation_id), Some(&body)).await
    }

    async fn upload_attachment(
        &self,
        conversation_id: Uuid,
        upload: AttachmentUpload,
    ) -> Result<AttachmentMeta, ApiError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .map_err(|e| ApiError::Decode(format!("invalid content type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let builder = self.request(&Endpoint::UploadAttachment(conversation_id)).multipart(form);
        let text = self.execute(builder).await?;
        parse_body(&text)
    }

    async fn get_attachment(&self, attachment_id: Uuid) -> Result<AttachmentMeta, ApiError> {
        self.fetch(Endpoint::GetAttachment(attachment_id), None).await
    }

    async fn get_unread_count(&self) -> Result<u64, ApiError> {
        let body: UnreadCountBody = self.fetch(Endpoint::UnreadCount, None).await?;
        Ok(body.count)
    }

    async fn list_contacts(&self) -> Result<Vec<Participant>, ApiError> {
        self.fetch(Endpoint::Contacts, None).await
    }
}

// =============================================================================
// ROUTES
// =============================================================================

/// One backend route. Paths are relative to the messaging prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    ListConversations(ConversationKind),
    GetConversation(Uuid),
    GetOrCreateConversation,
    MarkRead(Uuid),
    ListMessages(Uuid),
    SendMessage(Uuid),
    DeleteMessage(Uuid),
    ClearMessages(Uuid),
    Archive(Uuid),
    Unarchive(Uuid),
    DeleteConversation(Uuid),
    CreateGroup,
    GroupMembers(Uuid),
    AddMembers(Uuid),
    RemoveMember(Uuid),
    LeaveGroup(Uuid),
    RenameGroup(Uuid),
    UploadAttachment(Uuid),
    GetAttachment(Uuid),
    UnreadCount,
    Contacts,
}

impl Endpoint {
    /// HTTP method and path. Every mutation is a `POST`; the backend has no
    /// `PUT` or `DELETE` routes.
    pub(crate) fn route(self) -> (Method, String) {
        match self {
            Self::ListConversations(kind) => (Method::GET, format!("/conversations?type={}", kind.as_str())),
            Self::GetConversation(id) => (Method::GET, format!("/conversations/{id}")),
            Self::GetOrCreateConversation => (Method::POST, "/conversations".to_owned()),
            Self::MarkRead(id) => (Method::POST, format!("/conversations/{id}/read")),
            Self::ListMessages(id) => (Method::GET, format!("/conversations/{id}/messages")),
            Self::SendMessage(id) => (Method::POST, format!("/conversations/{id}/messages")),
            Self::DeleteMessage(id) => (Method::POST, format!("/messages/{id}/delete")),
            Self::ClearMessages(id) => (Method::POST, format!("/conversations/{id}/clear")),
            Self::Archive(id) => (Method::POST, format!("/conversations/{id}/archive")),
            Self::Unarchive(id) => (Method::POST, format!("/conversations/{id}/unarchive")),
            Self::DeleteConversation(id) => (Method::POST, format!("/conversations/{id}/delete")),
            Self::CreateGroup => (Method::POST, "/conversations/group".to_owned()),
            Self::GroupMembers(id) => (Method::GET, format!("/conversations/{id}/members")),
            Self::AddMembers(id) => (Method::POST, format!("/conversations/{id}/members")),
            Self::RemoveMember(id) => (Method::POST, format!("/conversations/{id}/members/remove")),
            Self::LeaveGroup(id) => (Method::POST, format!("/conversations/{id}/leave")),
            Self::RenameGroup(id) => (Method::POST, format!("/conversations/{id}/name")),
            Self::UploadAttachment(id) => (Method::POST, format!("/conversations/{id}/attachments")),
            Self::GetAttachment(id) => (Method::GET, format!("/attachments/{id}")),
            Self::UnreadCount => (Method::GET, "/unread-count".to_owned()),
            Self::Contacts => (Method::GET, "/users".to_owned()),
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct UnreadCountBody {
    count: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// PARSING
// =============================================================================

/// Pass 2xx bodies through; map everything else to an error kind, preferring
/// the backend's `{"error": ...}` message over the raw body.
pub(crate) fn check_status(status: u16, text: String) -> Result<String, ApiError> {
    if (200..300).contains(&status) {
        return Ok(text);
    }
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);
    Err(ApiError::from_status(status, message))
}

pub(crate) fn parse_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
