// crates/core/src/unread.rs
//! Unread-count application.
//!
//! Counts live inside `Conversation` records (single source of truth); this
//! module only knows how to apply the three push shapes to the directory's
//! map. The at-most-one-counting rule for `NewMessage` events lives in the
//! directory, next to the selection state it depends on.

use std::collections::HashMap;

use teamline_types::{Conversation, UnreadUpdate};
use tracing::debug;

/// What the caller must do after applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadOutcome {
    /// Counts were set locally; nothing else to do.
    Applied,
    /// The server invalidated local counts; re-fetch the authoritative
    /// snapshot and overwrite everything.
    RefreshRequired,
}

/// Apply an unread update to the conversation map.
///
/// Updates for unknown conversations are dropped; the next snapshot or
/// `NewMessage` event will introduce them with a correct count.
pub fn apply(
    conversations: &mut HashMap<String, Conversation>,
    update: &UnreadUpdate,
) -> UnreadOutcome {
    match update {
        UnreadUpdate::Single {
            conversation_id,
            count,
        } => {
            if let Some(conv) = conversations.get_mut(conversation_id) {
                conv.unread_count = *count;
            } else {
                debug!(conversation_id = %conversation_id, "unread update for unknown conversation");
            }
            UnreadOutcome::Applied
        }
        UnreadUpdate::Batch { items } => {
            for item in items {
                if let Some(conv) = conversations.get_mut(&item.conversation_id) {
                    conv.unread_count = item.count;
                }
            }
            UnreadOutcome::Applied
        }
        UnreadUpdate::Refresh => UnreadOutcome::RefreshRequired,
    }
}
