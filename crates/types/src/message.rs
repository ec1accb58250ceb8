// crates/types/src/message.rs
//! Message records for the open-conversation timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Delivery lifecycle of a message.
///
/// `Sending` is the optimistic client-only state; everything else comes from
/// the server. A message never returns to `Sending` once reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Terminal statuses never transition again (except Failed, which a
    /// retry re-sends as a fresh message with a new temp id).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Sending)
    }
}

/// One timeline entry.
///
/// `id` may be a client-generated temp id while the message is `Sending`;
/// reconciliation replaces the fields in place with the server record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
