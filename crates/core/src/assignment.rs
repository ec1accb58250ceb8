// crates/core/src/assignment.rs
//! Per-conversation assignment state and the optimistic-mutation snapshot.
//!
//! Local UI actions only ever assign to the session user or unassign;
//! `AssignedToOther` is reachable exclusively through a fetch or push from
//! the server.

use teamline_types::Conversation;

/// Derived assignment state, relative to the session user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Unassigned,
    AssignedToSelf,
    /// Someone else on the team owns this thread.
    AssignedToOther { user_id: String },
}

impl Assignment {
    /// Derive from the conversation record and the session user.
    pub fn of(conversation: &Conversation, current_user_id: &str) -> Self {
        match conversation.assigned_to_user_id.as_deref() {
            None => Assignment::Unassigned,
            Some(uid) if uid == current_user_id => Assignment::AssignedToSelf,
            Some(uid) => Assignment::AssignedToOther {
                user_id: uid.to_string(),
            },
        }
    }
}

/// Pre-mutation snapshot taken when an optimistic assign/unassign is applied.
///
/// On network failure the directory restores this instead of leaving the UI
/// and server inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAssignment {
    pub conversation_id: String,
    pub prev_user_id: Option<String>,
    pub prev_user_name: Option<String>,
}

impl PendingAssignment {
    pub fn capture(conversation: &Conversation) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            prev_user_id: conversation.assigned_to_user_id.clone(),
            prev_user_name: conversation.assigned_to_user_name.clone(),
        }
    }

    /// Put the captured values back on the conversation.
    pub fn restore(&self, conversation: &mut Conversation) {
        conversation.assigned_to_user_id = self.prev_user_id.clone();
        conversation.assigned_to_user_name = self.prev_user_name.clone();
    }
}
