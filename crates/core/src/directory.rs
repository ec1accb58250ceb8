// crates/core/src/directory.rs
//! The conversation set: REST snapshots merged with push deltas.
//!
//! `ConversationDirectory` exclusively owns the conversation records. The
//! engine feeds it snapshots (full or silent), normalized push events, and
//! user actions; it answers with sorted/filtered views. All mutation happens
//! on one cooperative task, so there is no interior locking here.

use std::collections::HashMap;

use chrono::Utc;
use teamline_types::{
    Conversation, ConversationStatus, NewMessageEvent, SessionContext, Tab, UnreadUpdate,
};
use tracing::{debug, warn};

use crate::assignment::PendingAssignment;
use crate::unread::{self, UnreadOutcome};

/// Maximum characters kept in `last_message_preview`.
const PREVIEW_MAX_CHARS: usize = 80;

/// How a REST snapshot is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Initial or forced load: replaces records wholesale and clears the
    /// loading flag. Unread counts in the snapshot are authoritative.
    Replace,
    /// Background poll: never touches the loading flag and merges instead of
    /// replacing, so an older fetch cannot clobber newer push-derived state.
    Silent,
}

pub struct ConversationDirectory {
    conversations: HashMap<String, Conversation>,
    /// The currently open conversation; gates unread increments.
    selected: Option<String>,
    current_user_id: String,
    current_user_name: String,
    loading: bool,
    /// In-flight optimistic assign/unassign snapshots, keyed by conversation.
    pending_assignments: HashMap<String, PendingAssignment>,
}

impl ConversationDirectory {
    pub fn new(ctx: &SessionContext) -> Self {
        Self {
            conversations: HashMap::new(),
            selected: None,
            current_user_id: ctx.user_id.clone(),
            current_user_name: ctx.user_name.clone(),
            loading: false,
            pending_assignments: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Flipped by the engine when a non-silent fetch starts.
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Record which conversation is open. `None` closes the detail view.
    pub fn select(&mut self, id: Option<String>) {
        self.selected = id;
    }

    // -----------------------------------------------------------------------
    // Snapshot installation
    // -----------------------------------------------------------------------

    /// Install a REST snapshot.
    ///
    /// Replace mode takes every incoming record as-is. Silent mode keeps the
    /// local record whenever its `last_message_at` is at least as new as the
    /// incoming one: a push event we already applied is newer truth than a
    /// fetch that started before it. Conversations absent from the snapshot
    /// are never deleted within a session.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Conversation>, mode: SnapshotMode) {
        for incoming in snapshot {
            match self.conversations.get_mut(&incoming.id) {
                None => {
                    self.conversations.insert(incoming.id.clone(), incoming);
                }
                Some(existing) => {
                    let stale =
                        mode == SnapshotMode::Silent && incoming.last_message_at <= existing.last_message_at;
                    if stale {
                        continue;
                    }
                    let keep_assignment = self.pending_assignments.contains_key(&incoming.id);
                    let (local_uid, local_uname) = (
                        existing.assigned_to_user_id.clone(),
                        existing.assigned_to_user_name.clone(),
                    );
                    *existing = incoming;
                    // An optimistic assign is still in flight; the snapshot
                    // predates it. Reconciliation happens on commit/rollback.
                    if keep_assignment {
                        existing.assigned_to_user_id = local_uid;
                        existing.assigned_to_user_name = local_uname;
                    }
                }
            }
        }
        if mode == SnapshotMode::Replace {
            self.loading = false;
        }
    }

    // -----------------------------------------------------------------------
    // Push deltas
    // -----------------------------------------------------------------------

    /// Apply a `NewMessage` push event.
    ///
    /// Resolves the target by conversation id, then contact id, then contact
    /// phone; creates a new entry for an unknown contact. Increments the
    /// unread badge by exactly one iff the message is inbound AND its
    /// conversation is not the one currently open. Outbound echoes and
    /// messages for the active conversation never bump the badge.
    ///
    /// Returns the resolved conversation id so the caller can route the
    /// event to the open timeline even when the payload carried only
    /// contact identity. `None` means the event was unusable and dropped.
    pub fn apply_new_message(&mut self, event: &NewMessageEvent) -> Option<String> {
        let Some(id) = self.resolve_conversation_id(event) else {
            warn!("new-message event carried no usable conversation identity, dropped");
            return None;
        };

        let is_selected = self.selected.as_deref() == Some(id.as_str());
        let msg = &event.message;

        match self.conversations.get_mut(&id) {
            Some(conv) => {
                conv.last_message_preview = preview_of(&msg.text);
                conv.last_message_at = msg.sent_at;
                if event.is_inbound {
                    conv.last_inbound_at = Some(msg.sent_at);
                    if !is_selected {
                        conv.unread_count += 1;
                    }
                } else {
                    conv.last_outbound_at = Some(msg.sent_at);
                }
            }
            None => {
                debug!(conversation_id = %id, "first inbound event for unknown contact, creating entry");
                let conv = Conversation {
                    id: id.clone(),
                    contact_id: event.contact_id.clone().unwrap_or_default(),
                    contact_phone: event.contact_phone.clone().unwrap_or_default(),
                    contact_name: String::new(),
                    last_message_preview: preview_of(&msg.text),
                    last_message_at: msg.sent_at,
                    unread_count: u32::from(event.is_inbound && !is_selected),
                    status: ConversationStatus::Open,
                    number_id: String::new(),
                    // A fresh inbound message opens the reply window; the
                    // next snapshot overwrites with the server-derived value.
                    within_24h: event.is_inbound,
                    assigned_to_user_id: None,
                    assigned_to_user_name: None,
                    source_type: String::new(),
                    mode: String::new(),
                    first_seen_at: Utc::now(),
                    last_inbound_at: event.is_inbound.then_some(msg.sent_at),
                    last_outbound_at: (!event.is_inbound).then_some(msg.sent_at),
                };
                self.conversations.insert(id.clone(), conv);
            }
        }
        Some(id)
    }

    /// Apply an `UnreadChanged` push event. A `RefreshRequired` outcome means
    /// local counts are stale and the caller must re-fetch the snapshot.
    pub fn apply_unread(&mut self, update: &UnreadUpdate) -> UnreadOutcome {
        unread::apply(&mut self.conversations, update)
    }

    /// Map a new-message event onto a conversation id we track.
    fn resolve_conversation_id(&self, event: &NewMessageEvent) -> Option<String> {
        if let Some(id) = &event.conversation_id {
            return Some(id.clone());
        }
        if let Some(contact_id) = &event.contact_id {
            if let Some(conv) = self
                .conversations
                .values()
                .find(|c| &c.contact_id == contact_id)
            {
                return Some(conv.id.clone());
            }
        }
        if let Some(phone) = &event.contact_phone {
            if let Some(conv) = self
                .conversations
                .values()
                .find(|c| &c.contact_phone == phone)
            {
                return Some(conv.id.clone());
            }
        }
        // Unknown contact with no conversation id: key the new entry by
        // whatever identity the event carried.
        event
            .contact_id
            .clone()
            .or_else(|| event.contact_phone.clone())
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Optimistically zero the unread badge. Idempotent; safe to re-fire on
    /// every retry path.
    pub fn mark_read(&mut self, conversation_id: &str) {
        if let Some(conv) = self.conversations.get_mut(conversation_id) {
            conv.unread_count = 0;
        }
    }

    /// Optimistically assign the conversation to the session user, capturing
    /// a pre-mutation snapshot for rollback. Returns `None` for an unknown
    /// conversation.
    pub fn begin_assign(&mut self, conversation_id: &str) -> Option<PendingAssignment> {
        let conv = self.conversations.get_mut(conversation_id)?;
        let snapshot = PendingAssignment::capture(conv);
        conv.assigned_to_user_id = Some(self.current_user_id.clone());
        conv.assigned_to_user_name = Some(self.current_user_name.clone());
        self.pending_assignments
            .insert(conversation_id.to_string(), snapshot.clone());
        Some(snapshot)
    }

    /// Optimistically clear the assignment, capturing a rollback snapshot.
    pub fn begin_unassign(&mut self, conversation_id: &str) -> Option<PendingAssignment> {
        let conv = self.conversations.get_mut(conversation_id)?;
        let snapshot = PendingAssignment::capture(conv);
        conv.assigned_to_user_id = None;
        conv.assigned_to_user_name = None;
        self.pending_assignments
            .insert(conversation_id.to_string(), snapshot.clone());
        Some(snapshot)
    }

    /// The server confirmed the in-flight assignment; drop the marker.
    pub fn commit_assignment(&mut self, conversation_id: &str) {
        self.pending_assignments.remove(conversation_id);
    }

    /// The network call failed; restore the pre-mutation snapshot.
    pub fn rollback_assignment(&mut self, conversation_id: &str) {
        if let Some(snapshot) = self.pending_assignments.remove(conversation_id) {
            if let Some(conv) = self.conversations.get_mut(conversation_id) {
                snapshot.restore(conv);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Sorted, filtered view of the conversation set.
    ///
    /// Comparator: has-unread descending, then `last_message_at` descending,
    /// then id for determinism. Filters: tab predicate, number equality,
    /// case-insensitive substring search over name/phone/preview.
    pub fn sorted(
        &self,
        tab: Tab,
        number_filter: Option<&str>,
        search: Option<&str>,
    ) -> Vec<&Conversation> {
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut view: Vec<&Conversation> = self
            .conversations
            .values()
            .filter(|c| self.tab_matches(tab, c))
            .filter(|c| number_filter.is_none_or(|n| c.number_id == n))
            .filter(|c| needle.as_deref().is_none_or(|n| search_matches(c, n)))
            .collect();

        view.sort_by(|a, b| {
            b.has_unread()
                .cmp(&a.has_unread())
                .then(b.last_message_at.cmp(&a.last_message_at))
                .then(a.id.cmp(&b.id))
        });
        view
    }

    fn tab_matches(&self, tab: Tab, conv: &Conversation) -> bool {
        match tab {
            Tab::All => true,
            Tab::Live => conv.within_24h,
            Tab::Unassigned => conv.assigned_to_user_id.is_none(),
            Tab::Mine => conv.assigned_to_user_id.as_deref() == Some(&self.current_user_id),
        }
    }
}

fn search_matches(conv: &Conversation, needle: &str) -> bool {
    conv.contact_name.to_lowercase().contains(needle)
        || conv.contact_phone.to_lowercase().contains(needle)
        || conv.last_message_preview.to_lowercase().contains(needle)
}

fn preview_of(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
