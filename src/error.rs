//! Error types for the sync engine.
//!
//! DESIGN
//! ======
//! Mutating operations are fail-soft: they return `Result` and never panic,
//! so one failed background refresh cannot take the session down. Each error
//! carries an explicit kind so callers can tell "retry later" apart from
//! "retry is pointless".

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// API ERROR
// =============================================================================

/// Errors produced by REST calls against the messaging backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, reset).
    #[error("network request failed: {0}")]
    Network(String),

    /// The backend rejected the credentials (401/403).
    #[error("unauthorized (status {status})")]
    Unauthorized { status: u16 },

    /// The addressed resource does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with current server state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other non-success status.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("API response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Status { .. } => "E_API_STATUS",
            Self::Decode(_) => "E_API_DECODE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

impl ApiError {
    /// Map a non-success HTTP status and its body to an error kind.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            404 => Self::NotFound(body),
            409 => Self::Conflict(body),
            _ => Self::Status { status, body },
        }
    }
}

// =============================================================================
// TRANSPORT ERROR
// =============================================================================

/// Errors produced by the push-channel transport and the event bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The outbound side of the transport is gone.
    #[error("transport closed")]
    Closed,

    /// A frame could not be encoded for sending.
    #[error("frame encode failed: {0}")]
    Encode(String),

    /// A topic already has a live subscriber.
    #[error("topic '{0}' already has a live subscription")]
    AlreadySubscribed(&'static str),
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Closed => "E_TRANSPORT_CLOSED",
            Self::Encode(_) => "E_FRAME_ENCODE",
            Self::AlreadySubscribed(_) => "E_ALREADY_SUBSCRIBED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

// =============================================================================
// NOTIFY ERROR
// =============================================================================

/// Failure of a local notification side effect. Always swallowed by callers.
#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

// =============================================================================
// CONFIG ERROR
// =============================================================================

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required env var {var}")]
    Missing { var: &'static str },

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
