// crates/core/src/window.rs
//! Send-eligibility policy for the 24-hour reply window.
//!
//! The server derives `within_24h` from its own clock and the last inbound
//! message; the client trusts that boolean rather than recomputing elapsed
//! time from `last_inbound_at`, which would diverge under client/server
//! clock drift. The cost is staleness between refreshes.

use teamline_types::Conversation;

use crate::error::ValidationError;

/// Whether free-form outbound replies are currently allowed.
pub fn is_send_allowed(conversation: &Conversation) -> bool {
    conversation.within_24h
}

/// Pre-flight check for the composer. Rejects before any network call:
/// empty/whitespace-only text, a closed window, or a conversation that was
/// never linked to a contact.
pub fn validate_send(conversation: &Conversation, text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if conversation.contact_id.is_empty() {
        return Err(ValidationError::NoLinkedContact);
    }
    if !is_send_allowed(conversation) {
        return Err(ValidationError::OutsideWindow);
    }
    Ok(())
}
