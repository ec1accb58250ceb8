// crates/types/src/session.rs
//! Explicit session context.
//!
//! The channel manager and the directory receive this by injection instead
//! of reading token/business id out of ambient shared storage.

use serde::{Deserialize, Serialize};

/// Who is logged in and which business inbox they are looking at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub business_id: String,
    pub user_id: String,
    pub user_name: String,
    /// Restrict the inbox to one business phone number, when set.
    #[serde(default)]
    pub number_id: Option<String>,
    /// Bearer token for the push channel and REST calls. Absence is a hard
    /// precondition failure for `connect`; no connection is attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SessionContext {
    pub fn new(business_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            user_id: user_id.into(),
            user_name: String::new(),
            number_id: None,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}
