//! chatsync: real-time conversation and message sync engine.
//!
//! ARCHITECTURE
//! ============
//! The engine keeps one user's view of their conversations consistent with a
//! REST backend (pull) and a push channel (push):
//!
//! ```text
//! ChatApi (REST) ----> ConversationStore / MessageSyncEngine / UnreadCounter
//!                                  ^
//! Transport -> EventBus -> RealtimeEventRouter -> TypingTracker
//! ```
//!
//! Everything is wired together by [`session::ChatSession`].

pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod frame;
pub mod model;
pub mod notify;
pub mod services;
pub mod session;
pub mod state;
pub mod transport;

pub use api::{ChatApi, HttpChatApi};
pub use config::SyncConfig;
pub use error::{ApiError, ConfigError, ErrorCode, TransportError};
pub use services::message::LoadOutcome;
pub use session::ChatSession;
pub use transport::{ChannelTransport, EventBus, Transport};
