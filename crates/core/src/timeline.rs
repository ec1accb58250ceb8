// crates/core/src/timeline.rs
//! The open conversation's message log.
//!
//! Only one timeline is materialized at a time. Selection changes clear it
//! synchronously (before the replacement fetch resolves) and every in-flight
//! load is tagged with a `LoadTicket` so a response for a conversation that
//! is no longer selected is discarded on arrival.

use chrono::{DateTime, Utc};
use teamline_types::{Direction, Message, MessageStatus, NewMessageEvent};
use tracing::{debug, warn};
use uuid::Uuid;

/// Tags an in-flight `load` with the selection it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub conversation_id: String,
    generation: u64,
}

/// What `apply_push` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushApplied {
    /// Appended as a new entry.
    Appended,
    /// Matched a pending optimistic send and reconciled it in place.
    Reconciled,
    /// Duplicate or different conversation; dropped.
    Ignored,
}

#[derive(Default)]
pub struct MessageTimeline {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    /// Bumped on every selection change; stale tickets are refused.
    generation: u64,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Switch to a conversation. The visible log is cleared synchronously:
    /// the previous conversation's messages must never flash under the new
    /// header while the fetch is in flight.
    pub fn select(&mut self, conversation_id: impl Into<String>) -> LoadTicket {
        let conversation_id = conversation_id.into();
        self.messages.clear();
        self.generation += 1;
        self.conversation_id = Some(conversation_id.clone());
        LoadTicket {
            conversation_id,
            generation: self.generation,
        }
    }

    /// Close the detail view.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.conversation_id = None;
        self.generation += 1;
    }

    /// Install a fetched snapshot. Returns false (and changes nothing) when
    /// the ticket is stale, i.e. the selection moved on while the fetch was
    /// in flight. The server returns newest-first; the log is chronological.
    /// Entries that landed while the fetch was in flight (optimistic sends,
    /// pushes) are newer than the snapshot and are carried over, not wiped.
    pub fn apply_loaded(&mut self, ticket: &LoadTicket, mut messages: Vec<Message>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                conversation_id = %ticket.conversation_id,
                "discarding stale timeline load"
            );
            return false;
        }
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        for local in std::mem::take(&mut self.messages) {
            if !messages.iter().any(|m| m.id == local.id) {
                messages.push(local);
            }
        }
        self.messages = messages;
        true
    }

    /// Append an optimistic outbound message and return its temp id.
    pub fn send_optimistic(&mut self, text: impl Into<String>, now: DateTime<Utc>) -> String {
        let temp_id = format!("tmp-{}", Uuid::new_v4());
        let conversation_id = self.conversation_id.clone().unwrap_or_default();
        self.messages.push(Message {
            id: temp_id.clone(),
            conversation_id,
            direction: Direction::Outbound,
            text: text.into(),
            sent_at: now,
            status: MessageStatus::Sending,
            error_message: None,
        });
        temp_id
    }

    /// Replace the Sending entry's fields with the server-confirmed record.
    /// The entry keeps its position; it is never deleted and re-inserted.
    pub fn reconcile_sent(&mut self, temp_id: &str, server_message: Message) {
        match self.messages.iter_mut().find(|m| m.id == temp_id) {
            Some(entry) => *entry = server_message,
            None => warn!(temp_id, "reconcile for unknown temp id, dropped"),
        }
    }

    /// The send failed: keep the bubble, flip it to Failed with the error.
    /// The original text is preserved; a failed send is never silently
    /// dropped.
    pub fn fail_send(&mut self, temp_id: &str, error: impl Into<String>) {
        if let Some(entry) = self.messages.iter_mut().find(|m| m.id == temp_id) {
            entry.status = MessageStatus::Failed;
            entry.error_message = Some(error.into());
        }
    }

    /// Apply a push event to the open timeline.
    ///
    /// Dropped unless the event names the open conversation directly. Events
    /// that carry only contact identity go through [`apply_push_resolved`]
    /// with the id the directory resolved.
    ///
    /// [`apply_push_resolved`]: MessageTimeline::apply_push_resolved
    pub fn apply_push(&mut self, event: &NewMessageEvent) -> PushApplied {
        let Some(open) = self.conversation_id.as_deref() else {
            return PushApplied::Ignored;
        };
        let matches_open = event.conversation_id.as_deref() == Some(open)
            || event.message.conversation_id == open;
        if !matches_open {
            return PushApplied::Ignored;
        }
        self.ingest(event)
    }

    /// Apply a push event whose conversation identity was already resolved
    /// (by contact id or phone) against the directory.
    pub fn apply_push_resolved(
        &mut self,
        resolved_id: &str,
        event: &NewMessageEvent,
    ) -> PushApplied {
        if self.conversation_id.as_deref() != Some(resolved_id) {
            return PushApplied::Ignored;
        }
        self.ingest(event)
    }

    /// Dedup is by identity membership: an id already present is ignored,
    /// and an outbound echo that corresponds to a still-pending optimistic
    /// entry reconciles that entry in place instead of appending a
    /// duplicate.
    fn ingest(&mut self, event: &NewMessageEvent) -> PushApplied {
        if self.messages.iter().any(|m| m.id == event.message.id) {
            return PushApplied::Ignored;
        }
        if !event.is_inbound {
            // Server echo of our own send racing the REST confirmation.
            if let Some(pending) = self
                .messages
                .iter_mut()
                .find(|m| m.status == MessageStatus::Sending)
            {
                *pending = event.message.clone();
                return PushApplied::Reconciled;
            }
        }
        self.messages.push(event.message.clone());
        PushApplied::Appended
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
