// crates/channel/src/registry.rs
//! Reference-counted handler registry.
//!
//! The push connection is one shared, process-scoped resource; several
//! components subscribe to it and may attach/detach repeatedly across their
//! own lifetimes. Registration is keyed by subscriber identity: attaching
//! the same identity twice for the same event kind bumps a refcount instead
//! of registering a second handler, so no event is ever delivered twice to
//! one subscriber.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::manager::{ChannelEvent, EventKind};

struct Entry {
    sender: mpsc::UnboundedSender<ChannelEvent>,
    refs: usize,
}

#[derive(Default)]
pub struct HandlerRegistry {
    entries: HashMap<(EventKind, String), Entry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber. Returns true when this identity was newly
    /// registered for the kind; false when it was already attached (the
    /// refcount is bumped and the existing handler kept).
    pub fn attach(
        &mut self,
        kind: EventKind,
        subscriber: impl Into<String>,
        sender: mpsc::UnboundedSender<ChannelEvent>,
    ) -> bool {
        let key = (kind, subscriber.into());
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.refs += 1;
                debug!(subscriber = %key.1, ?kind, refs = entry.refs, "duplicate attach, refcount bumped");
                false
            }
            None => {
                self.entries.insert(key, Entry { sender, refs: 1 });
                true
            }
        }
    }

    /// Detach once. The handler is removed only when the refcount reaches
    /// zero; returns true on full removal.
    pub fn detach(&mut self, kind: EventKind, subscriber: &str) -> bool {
        let key = (kind, subscriber.to_string());
        match self.entries.get_mut(&key) {
            Some(entry) if entry.refs > 1 => {
                entry.refs -= 1;
                false
            }
            Some(_) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every live subscriber of its kind. Subscribers
    /// whose receiving side is gone are pruned.
    pub fn dispatch(&mut self, event: &ChannelEvent) {
        let kind = event.kind();
        self.entries.retain(|(entry_kind, _), entry| {
            if *entry_kind != kind {
                return true;
            }
            entry.sender.send(event.clone()).is_ok()
        });
    }

    /// Drop every registration. Called by `disconnect`.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<ChannelEvent>,
        mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_duplicate_attach_is_idempotent() {
        let mut reg = HandlerRegistry::new();
        let (tx, mut rx) = channel();

        assert!(reg.attach(EventKind::Connection, "inbox-list", tx.clone()));
        // Remount attaches again with the same identity.
        assert!(!reg.attach(EventKind::Connection, "inbox-list", tx));
        assert_eq!(reg.len(), 1);

        reg.dispatch(&ChannelEvent::Up);
        assert_eq!(rx.try_recv().unwrap(), ChannelEvent::Up);
        // Exactly one delivery despite two attaches.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_detach_exactly_once_per_identity() {
        let mut reg = HandlerRegistry::new();
        let (tx, mut rx) = channel();
        reg.attach(EventKind::Connection, "inbox-list", tx.clone());
        reg.attach(EventKind::Connection, "inbox-list", tx);

        // First detach only drops a reference.
        assert!(!reg.detach(EventKind::Connection, "inbox-list"));
        reg.dispatch(&ChannelEvent::Up);
        assert!(rx.try_recv().is_ok());

        // Second detach removes the handler.
        assert!(reg.detach(EventKind::Connection, "inbox-list"));
        reg.dispatch(&ChannelEvent::Up);
        assert!(rx.try_recv().is_err());

        // Detaching an unknown identity is a no-op.
        assert!(!reg.detach(EventKind::Connection, "inbox-list"));
    }

    #[test]
    fn test_dispatch_filters_by_kind() {
        let mut reg = HandlerRegistry::new();
        let (conn_tx, mut conn_rx) = channel();
        let (msg_tx, mut msg_rx) = channel();
        reg.attach(EventKind::Connection, "a", conn_tx);
        reg.attach(EventKind::NewMessage, "b", msg_tx);

        reg.dispatch(&ChannelEvent::Down);
        assert_eq!(conn_rx.try_recv().unwrap(), ChannelEvent::Down);
        assert!(msg_rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_subscribers_are_pruned() {
        let mut reg = HandlerRegistry::new();
        let (tx, rx) = channel();
        reg.attach(EventKind::Connection, "gone", tx);
        drop(rx);

        reg.dispatch(&ChannelEvent::Up);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut reg = HandlerRegistry::new();
        let (tx, _rx) = channel();
        reg.attach(EventKind::Connection, "a", tx.clone());
        reg.attach(EventKind::NewMessage, "a", tx);
        assert_eq!(reg.len(), 2);
        reg.clear();
        assert!(reg.is_empty());
    }
}
