// crates/types/src/conversation.rs
//! Conversation records and inbox tab predicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Pending,
    Closed,
}

/// A single contact's thread plus its status, window, and assignment
/// metadata.
///
/// Created on the first snapshot fetch or the first inbound event for an
/// unknown contact; mutated in place by directory merges; never deleted
/// within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub contact_id: String,
    pub contact_phone: String,
    #[serde(default)]
    pub contact_name: String,
    /// Truncated text of the most recent message, for list rendering.
    #[serde(default)]
    pub last_message_preview: String,
    pub last_message_at: DateTime<Utc>,
    /// Unread inbound messages. Never negative; zeroed by mark-read.
    #[serde(default)]
    pub unread_count: u32,
    pub status: ConversationStatus,
    /// The business phone number this thread belongs to.
    #[serde(default)]
    pub number_id: String,
    /// Server-derived send-eligibility. Trusted as-is; the client does not
    /// recompute elapsed time from `last_inbound_at` (clock-drift trade-off,
    /// see WindowPolicy).
    #[serde(rename = "within24h", default)]
    pub within_24h: bool,
    #[serde(default)]
    pub assigned_to_user_id: Option<String>,
    #[serde(default)]
    pub assigned_to_user_name: Option<String>,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub mode: String,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub last_inbound_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_outbound_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Whether this conversation has anything unread.
    pub fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}

/// Inbox tabs. Each tab is a predicate over the conversation set; the
/// directory applies them before sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    /// Everything matching the number/search filters.
    #[default]
    All,
    /// Conversations still inside the 24-hour reply window.
    Live,
    /// Conversations with no assignee.
    Unassigned,
    /// Conversations assigned to the session user.
    Mine,
}

impl Tab {
    /// Query-string value understood by the conversations endpoint.
    pub fn as_query(&self) -> &'static str {
        match self {
            Tab::All => "all",
            Tab::Live => "live",
            Tab::Unassigned => "unassigned",
            Tab::Mine => "my",
        }
    }
}
