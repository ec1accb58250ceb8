// crates/api/src/client.rs
//! reqwest implementation of [`InboxApi`].

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use teamline_types::{Conversation, Message, SessionContext, Tab};
use tracing::debug;

use crate::error::RequestError;
use crate::{InboxApi, SendMessageRequest};

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    ctx: SessionContext,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, ctx: SessionContext) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            ctx,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match &self.ctx.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RequestError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "rest call failed");
            return Err(RequestError::from_response(status.as_u16(), &body));
        }
        Ok(response.json().await?)
    }

    /// Fire-and-check for endpoints whose response body we don't consume.
    async fn execute_ok(&self, builder: RequestBuilder) -> Result<(), RequestError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::from_response(status.as_u16(), &body));
        }
        Ok(())
    }
}

#[async_trait]
impl InboxApi for RestClient {
    async fn conversations(
        &self,
        tab: Tab,
        number_id: Option<&str>,
        search: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Conversation>, RequestError> {
        let mut builder = self.request(Method::GET, "conversations").query(&[
            ("businessId", self.ctx.business_id.as_str()),
            ("tab", tab.as_query()),
        ]);
        if let Some(number_id) = number_id {
            builder = builder.query(&[("numberId", number_id)]);
        }
        if let Some(search) = search {
            builder = builder.query(&[("search", search)]);
        }
        builder = builder.query(&[("limit", limit)]);
        self.execute(builder).await
    }

    async fn messages(
        &self,
        contact_phone: &str,
        limit: u32,
    ) -> Result<Vec<Message>, RequestError> {
        let builder = self
            .request(Method::GET, "messages")
            .query(&[
                ("businessId", self.ctx.business_id.as_str()),
                ("contactPhone", contact_phone),
            ])
            .query(&[("limit", limit)]);
        self.execute(builder).await
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<Message, RequestError> {
        let builder = self.request(Method::POST, "send-message").json(req);
        self.execute(builder).await
    }

    async fn mark_read(&self, contact_id: &str) -> Result<(), RequestError> {
        let body = json!({
            "businessId": self.ctx.business_id,
            "contactId": contact_id,
            "userId": self.ctx.user_id,
        });
        self.execute_ok(self.request(Method::POST, "mark-read").json(&body))
            .await
    }

    async fn assign(&self, contact_id: &str, user_id: &str) -> Result<(), RequestError> {
        let body = json!({
            "businessId": self.ctx.business_id,
            "contactId": contact_id,
            "userId": user_id,
        });
        self.execute_ok(self.request(Method::POST, "assign").json(&body))
            .await
    }

    async fn unassign(&self, contact_id: &str) -> Result<(), RequestError> {
        let body = json!({
            "businessId": self.ctx.business_id,
            "contactId": contact_id,
        });
        self.execute_ok(self.request(Method::POST, "unassign").json(&body))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
