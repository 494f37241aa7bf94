//! Local "new message" notification hook.
//!
//! Playing a sound, bumping a dock badge, and similar side effects are
//! non-critical: the router calls the notifier for messages from other users
//! and swallows any error it returns.

use tracing::info;

use crate::error::NotifyError;
use crate::model::Message;

pub trait Notifier: Send + Sync {
    /// Signal that a message from another user arrived.
    ///
    /// # Errors
    ///
    /// Implementations may fail freely; callers ignore the error.
    fn notify(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Default notifier: a structured log line.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &Message) -> Result<(), NotifyError> {
        info!(
            conversation_id = %message.conversation_id,
            sender = message.sender_username.as_deref().unwrap_or("unknown"),
            "new message"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
