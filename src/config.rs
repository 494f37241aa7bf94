//! Session configuration parsed from environment variables.

use std::time::Duration;

use uuid::Uuid;

use crate::error::ConfigError;
use crate::model::ConversationKind;

pub const DEFAULT_TYPING_EXPIRY_MS: u64 = 3000;
pub const DEFAULT_UNREAD_POLL_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the backend, without the `/api/v1/messaging` suffix.
    pub api_base_url: String,
    /// Bearer token for REST calls.
    pub api_token: Option<String>,
    /// The signed-in user. Messages from this id never trigger notifications.
    pub user_id: Uuid,
    /// Restrict the conversation list to one kind; `None` loads both.
    pub conversation_kind: Option<ConversationKind>,
    pub typing_expiry: Duration,
    /// Background unread refresh interval. Zero disables the poll.
    pub unread_poll: Duration,
    pub timeouts: HttpTimeouts,
}

impl SyncConfig {
    /// Config with defaults for everything but the endpoint and the user.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            user_id,
            conversation_kind: None,
            typing_expiry: Duration::from_millis(DEFAULT_TYPING_EXPIRY_MS),
            unread_poll: Duration::from_secs(DEFAULT_UNREAD_POLL_SECS),
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
        }
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `CHATSYNC_API_BASE_URL`
    /// - `CHATSYNC_USER_ID`
    ///
    /// Optional:
    /// - `CHATSYNC_API_TOKEN`
    /// - `CHATSYNC_CONVERSATION_KIND`: `personal` or `group` (default: both)
    /// - `CHATSYNC_TYPING_EXPIRY_MS`: default 3000
    /// - `CHATSYNC_UNREAD_POLL_SECS`: default 60, `0` disables
    /// - `CHATSYNC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CHATSYNC_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a set variable
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = require("CHATSYNC_API_BASE_URL")?;
        let raw_user = require("CHATSYNC_USER_ID")?;
        let user_id = raw_user
            .parse::<Uuid>()
            .map_err(|_| ConfigError::Invalid { var: "CHATSYNC_USER_ID", value: raw_user.clone() })?;

        let conversation_kind = match std::env::var("CHATSYNC_CONVERSATION_KIND").ok().as_deref() {
            None | Some("" | "all") => None,
            Some(raw) => Some(raw.parse::<ConversationKind>().map_err(|_| ConfigError::Invalid {
                var: "CHATSYNC_CONVERSATION_KIND",
                value: raw.to_string(),
            })?),
        };

        let mut config = Self::new(api_base_url, user_id);
        config.api_token = std::env::var("CHATSYNC_API_TOKEN").ok().filter(|t| !t.is_empty());
        config.conversation_kind = conversation_kind;
        config.typing_expiry =
            Duration::from_millis(env_parse("CHATSYNC_TYPING_EXPIRY_MS", DEFAULT_TYPING_EXPIRY_MS));
        config.unread_poll = Duration::from_secs(env_parse("CHATSYNC_UNREAD_POLL_SECS", DEFAULT_UNREAD_POLL_SECS));
        config.timeouts = HttpTimeouts {
            request_secs: env_parse("CHATSYNC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("CHATSYNC_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { var })
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
