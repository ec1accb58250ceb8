// crates/types/src/lib.rs
//! Shared data model for the teamline inbox engine.
//!
//! These are the canonical in-memory types every other crate speaks:
//! conversations, messages, normalized push events, and the injected
//! session context. Wire adapters (REST and push) deserialize into these
//! and nothing else reaches the core.

mod conversation;
mod event;
mod message;
mod session;

pub use conversation::{Conversation, ConversationStatus, Tab};
pub use event::{NewMessageEvent, PushEvent, UnreadItem, UnreadUpdate};
pub use message::{Direction, Message, MessageStatus};
pub use session::SessionContext;
