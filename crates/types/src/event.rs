// crates/types/src/event.rs
//! Normalized push events.
//!
//! The channel's normalization boundary maps every wire-payload variant onto
//! these types before anything reaches the core. The core never inspects raw
//! JSON.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A new message arrived on some conversation.
///
/// Identity fields are all optional on the wire; the directory resolves the
/// target by conversation id, then contact id, then contact phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    pub message: Message,
    pub is_inbound: bool,
}

/// One entry of a bulk unread update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadItem {
    pub conversation_id: String,
    pub count: u32,
}

/// The three shapes an unread-changed event takes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadUpdate {
    /// Set one conversation's count.
    Single { conversation_id: String, count: u32 },
    /// Bulk-set a batch of counts.
    Batch { items: Vec<UnreadItem> },
    /// Local counts are stale; re-fetch authoritative counts from the
    /// snapshot endpoint.
    Refresh,
}

/// Canonical tagged union of everything the push channel can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    NewMessage(NewMessageEvent),
    UnreadChanged(UnreadUpdate),
}
