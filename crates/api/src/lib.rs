// crates/api/src/lib.rs
//! REST surface of the inbox backend.
//!
//! The engine talks to the [`InboxApi`] trait; [`RestClient`] is the reqwest
//! implementation. REST failures carry the server-provided message when one
//! exists and are surfaced, never auto-retried.

mod client;
mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use teamline_types::{Conversation, Message, Tab};

pub use client::RestClient;
pub use error::RequestError;

/// Body of `POST send-message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub contact_id: String,
    /// Destination phone number.
    pub to: String,
    pub text: String,
    pub number_id: String,
}

/// What the engine needs from the backend. A trait seam so engine tests run
/// against a counting mock instead of a live server.
#[async_trait]
pub trait InboxApi: Send + Sync {
    /// Conversation snapshots for one tab. The server applies the same tab
    /// predicates the directory does; the client still re-filters locally so
    /// push-created entries obey the active view.
    async fn conversations(
        &self,
        tab: Tab,
        number_id: Option<&str>,
        search: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Conversation>, RequestError>;

    /// Message snapshots for one contact, newest-first as the server returns
    /// them. The timeline re-orders to chronological.
    async fn messages(&self, contact_phone: &str, limit: u32)
        -> Result<Vec<Message>, RequestError>;

    /// Send a message; the response is the confirmed server record.
    async fn send_message(&self, req: &SendMessageRequest) -> Result<Message, RequestError>;

    async fn mark_read(&self, contact_id: &str) -> Result<(), RequestError>;

    async fn assign(&self, contact_id: &str, user_id: &str) -> Result<(), RequestError>;

    async fn unassign(&self, contact_id: &str) -> Result<(), RequestError>;
}
