// crates/channel/src/normalize.rs
//! The single normalization boundary for push payloads.
//!
//! Server deployments disagree on field casing (`contactId`, `ContactId`,
//! `contact_id`) and on event-name spelling. All of that probing lives here
//! and nowhere else: the output is the canonical [`PushEvent`] union, and
//! the core never sees a raw payload.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use teamline_types::{
    Direction, Message, MessageStatus, NewMessageEvent, PushEvent, UnreadItem, UnreadUpdate,
};
use tracing::warn;

/// Map a wire event onto the canonical union. `None` means the event is not
/// one we consume, or was too malformed to normalize (logged, not fatal).
pub fn normalize_event(name: &str, payload: &Value) -> Option<PushEvent> {
    match canonical_name(name) {
        Some("new_message") => match new_message(payload) {
            Some(ev) => Some(PushEvent::NewMessage(ev)),
            None => {
                warn!(event = name, "unusable new-message payload, dropped");
                None
            }
        },
        Some("unread_changed") => match unread_changed(payload) {
            Some(update) => Some(PushEvent::UnreadChanged(update)),
            None => {
                warn!(event = name, "unusable unread payload, dropped");
                None
            }
        },
        _ => None,
    }
}

fn canonical_name(name: &str) -> Option<&'static str> {
    match name {
        "NewMessage" | "newMessage" | "new_message" | "message" => Some("new_message"),
        "UnreadChanged" | "unreadChanged" | "unread_changed" | "unread" => Some("unread_changed"),
        _ => None,
    }
}

/// First value present under any of the candidate keys.
fn pick<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| {
        let v = payload.get(k)?;
        (!v.is_null()).then_some(v)
    })
}

fn pick_str(payload: &Value, keys: &[&str]) -> Option<String> {
    pick(payload, keys)?.as_str().map(String::from)
}

fn pick_bool(payload: &Value, keys: &[&str]) -> Option<bool> {
    pick(payload, keys)?.as_bool()
}

/// Timestamps arrive as RFC 3339 strings or epoch milliseconds.
fn pick_time(payload: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    let v = pick(payload, keys)?;
    if let Some(s) = v.as_str() {
        return s.parse().ok();
    }
    v.as_i64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn new_message(payload: &Value) -> Option<NewMessageEvent> {
    // The message record is nested under "message" on most deployments, but
    // some flatten it onto the event payload itself.
    let body = pick(payload, &["message", "Message", "msg"]).unwrap_or(payload);

    let text = pick_str(body, &["text", "Text", "body", "Body"])?;
    let id = pick_str(body, &["id", "Id", "messageId", "MessageId"])?;
    let sent_at = pick_time(body, &["sentAt", "SentAt", "sent_at", "timestamp", "Timestamp"])
        .unwrap_or_else(Utc::now);

    let conversation_id = pick_str(
        payload,
        &["conversationId", "ConversationId", "conversation_id"],
    );
    let is_inbound = pick_bool(payload, &["isInbound", "IsInbound", "is_inbound"])
        .or_else(|| pick_bool(body, &["isInbound", "IsInbound", "is_inbound"]))
        .or_else(|| {
            pick_str(body, &["direction", "Direction"]).map(|d| d.eq_ignore_ascii_case("inbound"))
        })?;

    let direction = if is_inbound {
        Direction::Inbound
    } else {
        Direction::Outbound
    };
    let status = pick_str(body, &["status", "Status"])
        .and_then(|s| parse_status(&s))
        .unwrap_or(if is_inbound {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        });

    Some(NewMessageEvent {
        conversation_id: conversation_id.clone(),
        contact_id: pick_str(payload, &["contactId", "ContactId", "contact_id"]),
        contact_phone: pick_str(
            payload,
            &["contactPhone", "ContactPhone", "contact_phone", "phone"],
        ),
        message: Message {
            id,
            conversation_id: conversation_id.unwrap_or_default(),
            direction,
            text,
            sent_at,
            status,
            error_message: None,
        },
        is_inbound,
    })
}

fn parse_status(s: &str) -> Option<MessageStatus> {
    match s.to_ascii_lowercase().as_str() {
        "sending" => Some(MessageStatus::Sending),
        "sent" => Some(MessageStatus::Sent),
        "delivered" => Some(MessageStatus::Delivered),
        "read" => Some(MessageStatus::Read),
        "failed" => Some(MessageStatus::Failed),
        _ => None,
    }
}

fn unread_changed(payload: &Value) -> Option<UnreadUpdate> {
    if pick_bool(payload, &["refresh", "Refresh"]) == Some(true) {
        return Some(UnreadUpdate::Refresh);
    }
    if let Some(items) = pick(payload, &["items", "Items"]).and_then(Value::as_array) {
        let items = items
            .iter()
            .filter_map(|item| {
                Some(UnreadItem {
                    conversation_id: pick_str(
                        item,
                        &["conversationId", "ConversationId", "conversation_id"],
                    )?,
                    count: pick(item, &["count", "Count"])?.as_u64()? as u32,
                })
            })
            .collect();
        return Some(UnreadUpdate::Batch { items });
    }
    Some(UnreadUpdate::Single {
        conversation_id: pick_str(
            payload,
            &["conversationId", "ConversationId", "conversation_id"],
        )?,
        count: pick(payload, &["count", "Count"])?.as_u64()? as u32,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
