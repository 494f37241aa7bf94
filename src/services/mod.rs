pub mod attachment;
pub mod conversation;
pub mod message;
pub mod router;
pub mod typing;
pub mod unread;
