// crates/engine/src/engine.rs
//! `InboxEngine`, the top-level aggregate.
//!
//! One cooperative task owns all mutable state. Mutations happen inside
//! discrete handlers driven by a `select!` over the command mailbox, the
//! push-event stream, in-flight timeline loads, and the poll interval; the
//! only suspension points are the network awaits. No cross-source ordering
//! is enforced beyond apply-as-received; the directory's timestamp merge
//! and the timeline's load tickets close the stale-data races that policy
//! would otherwise admit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use teamline_api::{InboxApi, RequestError, SendMessageRequest};
use teamline_channel::ChannelEvent;
use teamline_core::{
    validate_send, ConversationDirectory, LoadTicket, MessageTimeline, SnapshotMode, UnreadOutcome,
};
use teamline_types::{
    Conversation, Message, NewMessageEvent, PushEvent, SessionContext, Tab,
};

use crate::invoker::PushInvoker;

/// In-flight timeline fetches, tagged with the ticket they were issued for.
pub type TimelineLoads =
    FuturesUnordered<BoxFuture<'static, (LoadTicket, Result<Vec<Message>, RequestError>)>>;

/// User actions accepted by the engine's mailbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Full re-fetch with the loading flag.
    Refresh,
    /// Open a conversation (or close the detail view with `None`).
    Select(Option<String>),
    /// Send to the selected conversation.
    Send { text: String },
    MarkRead { conversation_id: String },
    Assign { conversation_id: String },
    Unassign { conversation_id: String },
    SetTab(Tab),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Silent-refresh cadence.
    pub poll_interval: Duration,
    /// Page size for snapshot fetches.
    pub page_limit: u32,
    pub initial_tab: Tab,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            page_limit: 100,
            initial_tab: Tab::All,
        }
    }
}

pub struct InboxEngine {
    ctx: SessionContext,
    config: EngineConfig,
    api: Arc<dyn InboxApi>,
    invoker: Arc<dyn PushInvoker>,
    directory: ConversationDirectory,
    timeline: MessageTimeline,
    tab: Tab,
    online: bool,
    /// User-visible transient notices (failed sends, rollbacks, ...).
    notices: Vec<String>,
}

impl InboxEngine {
    pub fn new(
        ctx: SessionContext,
        api: Arc<dyn InboxApi>,
        invoker: Arc<dyn PushInvoker>,
        config: EngineConfig,
    ) -> Self {
        let directory = ConversationDirectory::new(&ctx);
        Self {
            tab: config.initial_tab,
            ctx,
            config,
            api,
            invoker,
            directory,
            timeline: MessageTimeline::new(),
            online: false,
            notices: Vec::new(),
        }
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn timeline(&self) -> &MessageTimeline {
        &self.timeline
    }

    /// Connection state for the composer / offline indicator.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Drain pending user-visible notices.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// The sorted, filtered inbox for the active tab.
    pub fn view(&self, search: Option<&str>) -> Vec<&Conversation> {
        self.directory
            .sorted(self.tab, self.ctx.number_id.as_deref(), search)
    }

    /// Drive the engine until the command mailbox closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let mut loads = TimelineLoads::new();
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.refresh().await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd, &mut loads).await,
                    None => break,
                },
                ev = events.recv() => {
                    if let Some(ev) = ev {
                        self.handle_channel_event(ev).await;
                    }
                }
                Some(completed) = loads.next(), if !loads.is_empty() => {
                    self.apply_load(completed);
                }
                _ = poll.tick() => self.silent_refresh().await,
            }
        }
        info!("engine mailbox closed, shutting down");
    }

    pub async fn handle_command(&mut self, cmd: Command, loads: &mut TimelineLoads) {
        match cmd {
            Command::Refresh => self.refresh().await,
            Command::Select(id) => self.select_conversation(id, loads).await,
            Command::Send { text } => self.send_message(text).await,
            Command::MarkRead { conversation_id } => self.mark_read(&conversation_id).await,
            Command::Assign { conversation_id } => self.assign(&conversation_id).await,
            Command::Unassign { conversation_id } => self.unassign(&conversation_id).await,
            Command::SetTab(tab) => self.tab = tab,
        }
    }

    pub async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Up => {
                self.online = true;
                // Events during the outage were lost, not replayed: the
                // snapshot is the only way back to truth.
                self.refresh().await;
            }
            ChannelEvent::Down => {
                self.online = false;
            }
            ChannelEvent::Push(PushEvent::NewMessage(ev)) => {
                // The directory resolves contact-only identity; the timeline
                // needs that id to accept events for the open conversation.
                match self.directory.apply_new_message(&ev) {
                    Some(id) => {
                        self.timeline.apply_push_resolved(&id, &ev);
                    }
                    None => {
                        self.timeline.apply_push(&ev);
                    }
                }
            }
            ChannelEvent::Push(PushEvent::UnreadChanged(update)) => {
                if self.directory.apply_unread(&update) == UnreadOutcome::RefreshRequired {
                    self.refetch_counts().await;
                }
            }
        }
    }

    /// Resolution of one timeline fetch. Stale tickets are refused by the
    /// timeline itself; errors for a selection that moved on are dropped.
    pub fn apply_load(
        &mut self,
        (ticket, result): (LoadTicket, Result<Vec<Message>, RequestError>),
    ) {
        match result {
            Ok(messages) => {
                self.timeline.apply_loaded(&ticket, messages);
            }
            Err(e) => {
                if self.timeline.conversation_id() == Some(ticket.conversation_id.as_str()) {
                    self.notices.push(format!("could not load messages: {e}"));
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Snapshot fetches
    // -----------------------------------------------------------------------

    async fn refresh(&mut self) {
        self.directory.set_loading(true);
        match self
            .api
            .conversations(
                self.tab,
                self.ctx.number_id.as_deref(),
                None,
                self.config.page_limit,
            )
            .await
        {
            Ok(snapshot) => {
                debug!(count = snapshot.len(), "directory refreshed");
                self.directory.apply_snapshot(snapshot, SnapshotMode::Replace);
            }
            Err(e) => {
                self.directory.set_loading(false);
                self.notices.push(format!("could not load inbox: {e}"));
            }
        }
    }

    /// Poll-interval variant: no loading flag, merge instead of replace, and
    /// failures only logged since the next tick retries anyway.
    async fn silent_refresh(&mut self) {
        match self
            .api
            .conversations(
                self.tab,
                self.ctx.number_id.as_deref(),
                None,
                self.config.page_limit,
            )
            .await
        {
            Ok(snapshot) => self.directory.apply_snapshot(snapshot, SnapshotMode::Silent),
            Err(e) => warn!("silent refresh failed: {e}"),
        }
    }

    /// The server told us local unread counts are garbage: re-fetch and
    /// overwrite them all with the authoritative snapshot.
    async fn refetch_counts(&mut self) {
        match self
            .api
            .conversations(
                self.tab,
                self.ctx.number_id.as_deref(),
                None,
                self.config.page_limit,
            )
            .await
        {
            Ok(snapshot) => self.directory.apply_snapshot(snapshot, SnapshotMode::Replace),
            Err(e) => warn!("unread refetch failed: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    async fn select_conversation(&mut self, id: Option<String>, loads: &mut TimelineLoads) {
        let Some(id) = id else {
            self.directory.select(None);
            self.timeline.clear();
            return;
        };

        self.directory.select(Some(id.clone()));
        // Synchronous clear: the old conversation must never flash under
        // the new header.
        let ticket = self.timeline.select(id.clone());

        // Opening a thread reads it.
        self.mark_read(&id).await;

        let Some(conv) = self.directory.get(&id) else {
            warn!(conversation_id = %id, "selected unknown conversation");
            return;
        };
        let phone = conv.contact_phone.clone();
        let limit = self.config.page_limit;
        let api = Arc::clone(&self.api);
        loads.push(
            async move {
                let result = api.messages(&phone, limit).await;
                (ticket, result)
            }
            .boxed(),
        );
    }

    async fn send_message(&mut self, text: String) {
        let Some(selected) = self.directory.selected().map(String::from) else {
            self.notices.push("no conversation selected".into());
            return;
        };
        let Some(conv) = self.directory.get(&selected).cloned() else {
            self.notices.push("conversation not found".into());
            return;
        };

        // Pre-flight: a closed window or empty text issues zero network
        // calls.
        if let Err(e) = validate_send(&conv, &text) {
            self.notices.push(e.to_string());
            return;
        }

        let temp_id = self.timeline.send_optimistic(&text, Utc::now());
        let req = SendMessageRequest {
            conversation_id: conv.id.clone(),
            contact_id: conv.contact_id.clone(),
            to: conv.contact_phone.clone(),
            text,
            number_id: conv.number_id.clone(),
        };

        match self.api.send_message(&req).await {
            Ok(confirmed) => {
                self.timeline.reconcile_sent(&temp_id, confirmed.clone());
                // Move the directory forward too; the push echo (if any)
                // dedups by id.
                self.directory.apply_new_message(&NewMessageEvent {
                    conversation_id: Some(conv.id),
                    contact_id: Some(conv.contact_id),
                    contact_phone: Some(conv.contact_phone),
                    message: confirmed,
                    is_inbound: false,
                });
            }
            Err(e) => {
                self.timeline.fail_send(&temp_id, e.to_string());
                self.notices.push(format!("send failed: {e}"));
            }
        }
    }

    /// Optimistic zero plus a double-fire to the server: the push invoke AND
    /// the HTTP call. Mark-read is idempotent server-side, so firing both is
    /// safe and covers either transport being down.
    async fn mark_read(&mut self, conversation_id: &str) {
        self.directory.mark_read(conversation_id);
        let Some(conv) = self.directory.get(conversation_id) else {
            return;
        };
        let contact_id = conv.contact_id.clone();

        if let Err(e) = self
            .invoker
            .invoke("MarkAsRead", json!({ "contactId": contact_id.clone() }))
            .await
        {
            debug!("mark-read invoke failed, HTTP still fires: {e}");
        }
        if let Err(e) = self.api.mark_read(&contact_id).await {
            warn!("mark-read HTTP failed (will retry on next open): {e}");
        }
    }

    async fn assign(&mut self, conversation_id: &str) {
        let Some(_snapshot) = self.directory.begin_assign(conversation_id) else {
            self.notices.push("conversation not found".into());
            return;
        };
        let contact_id = self
            .directory
            .get(conversation_id)
            .map(|c| c.contact_id.clone())
            .unwrap_or_default();
        let user_id = self.ctx.user_id.clone();

        let result = self
            .invoke_with_http_fallback(
                "Assign",
                json!({ "contactId": contact_id.clone(), "userId": user_id.clone() }),
                |api| {
                    let contact_id = contact_id.clone();
                    let user_id = user_id.clone();
                    async move { api.assign(&contact_id, &user_id).await }.boxed()
                },
            )
            .await;

        match result {
            Ok(()) => self.directory.commit_assignment(conversation_id),
            Err(message) => {
                self.directory.rollback_assignment(conversation_id);
                self.notices.push(format!("assign failed: {message}"));
            }
        }
    }

    async fn unassign(&mut self, conversation_id: &str) {
        let Some(_snapshot) = self.directory.begin_unassign(conversation_id) else {
            self.notices.push("conversation not found".into());
            return;
        };
        let contact_id = self
            .directory
            .get(conversation_id)
            .map(|c| c.contact_id.clone())
            .unwrap_or_default();

        let result = self
            .invoke_with_http_fallback("Unassign", json!({ "contactId": contact_id.clone() }), |api| {
                let contact_id = contact_id.clone();
                async move { api.unassign(&contact_id).await }.boxed()
            })
            .await;

        match result {
            Ok(()) => self.directory.commit_assignment(conversation_id),
            Err(message) => {
                self.directory.rollback_assignment(conversation_id);
                self.notices.push(format!("unassign failed: {message}"));
            }
        }
    }

    /// Push invoke first; on invoke failure fall back to the HTTP
    /// equivalent. Only when both fail does the caller roll back.
    async fn invoke_with_http_fallback<F>(
        &self,
        method: &str,
        args: serde_json::Value,
        http: F,
    ) -> Result<(), String>
    where
        F: FnOnce(Arc<dyn InboxApi>) -> BoxFuture<'static, Result<(), RequestError>>,
    {
        match self.invoker.invoke(method, args).await {
            Ok(_) => Ok(()),
            Err(invoke_err) => {
                debug!("invoke failed, falling back to HTTP: {invoke_err}");
                http(Arc::clone(&self.api))
                    .await
                    .map_err(|e| e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use teamline_channel::ChannelError;
    use teamline_types::{
        ConversationStatus, Direction, MessageStatus, UnreadItem, UnreadUpdate,
    };

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, hour, 0, 0).unwrap()
    }

    fn conv(id: &str, unread: u32, within_24h: bool) -> Conversation {
        Conversation {
            id: id.into(),
            contact_id: format!("ct-{id}"),
            contact_phone: format!("+1555000{id}"),
            contact_name: format!("Contact {id}"),
            last_message_preview: "hello".into(),
            last_message_at: at(10),
            unread_count: unread,
            status: ConversationStatus::Open,
            number_id: "n1".into(),
            within_24h,
            assigned_to_user_id: None,
            assigned_to_user_name: None,
            source_type: "whatsapp".into(),
            mode: "manual".into(),
            first_seen_at: at(0),
            last_inbound_at: Some(at(10)),
            last_outbound_at: None,
        }
    }

    fn server_message(id: &str, conversation_id: &str, text: &str) -> Message {
        Message {
            id: id.into(),
            conversation_id: conversation_id.into(),
            direction: Direction::Outbound,
            text: text.into(),
            sent_at: at(11),
            status: MessageStatus::Sent,
            error_message: None,
        }
    }

    /// Counting mock backend. Every endpoint tallies calls; failure modes
    /// are scripted per test.
    #[derive(Default)]
    struct MockApi {
        conversations: Mutex<Vec<Conversation>>,
        messages: Mutex<Vec<Message>>,
        conversations_calls: AtomicUsize,
        messages_calls: AtomicUsize,
        send_calls: AtomicUsize,
        mark_read_calls: AtomicUsize,
        assign_calls: AtomicUsize,
        unassign_calls: AtomicUsize,
        fail_send: AtomicBool,
        fail_assign: AtomicBool,
    }

    #[async_trait::async_trait]
    impl InboxApi for MockApi {
        async fn conversations(
            &self,
            _tab: Tab,
            _number_id: Option<&str>,
            _search: Option<&str>,
            _limit: u32,
        ) -> Result<Vec<Conversation>, RequestError> {
            self.conversations_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.conversations.lock().unwrap().clone())
        }

        async fn messages(
            &self,
            _contact_phone: &str,
            _limit: u32,
        ) -> Result<Vec<Message>, RequestError> {
            self.messages_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.messages.lock().unwrap().clone())
        }

        async fn send_message(&self, req: &SendMessageRequest) -> Result<Message, RequestError> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(RequestError::Api {
                    status: 500,
                    message: "send exploded".into(),
                });
            }
            Ok(server_message("m99", &req.conversation_id, &req.text))
        }

        async fn mark_read(&self, _contact_id: &str) -> Result<(), RequestError> {
            self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn assign(&self, _contact_id: &str, _user_id: &str) -> Result<(), RequestError> {
            self.assign_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_assign.load(Ordering::SeqCst) {
                return Err(RequestError::Api {
                    status: 409,
                    message: "already assigned".into(),
                });
            }
            Ok(())
        }

        async fn unassign(&self, _contact_id: &str) -> Result<(), RequestError> {
            self.unassign_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Scripted push invoker: succeed or fail wholesale, record every call.
    #[derive(Default)]
    struct MockInvoker {
        fail: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PushInvoker for MockInvoker {
        async fn invoke(
            &self,
            method: &str,
            _args: serde_json::Value,
        ) -> Result<serde_json::Value, ChannelError> {
            self.calls.lock().unwrap().push(method.to_string());
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChannelError::Invoke {
                    method: method.into(),
                    reason: "offline".into(),
                });
            }
            Ok(serde_json::Value::Null)
        }
    }

    struct Harness {
        engine: InboxEngine,
        api: Arc<MockApi>,
        invoker: Arc<MockInvoker>,
        loads: TimelineLoads,
    }

    async fn harness(conversations: Vec<Conversation>) -> Harness {
        let api = Arc::new(MockApi {
            conversations: Mutex::new(conversations),
            ..MockApi::default()
        });
        let invoker = Arc::new(MockInvoker::default());
        let mut ctx = SessionContext::new("biz1", "u1").with_token("secret");
        ctx.user_name = "Me".into();

        let mut engine = InboxEngine::new(
            ctx,
            Arc::clone(&api) as Arc<dyn InboxApi>,
            Arc::clone(&invoker) as Arc<dyn PushInvoker>,
            EngineConfig::default(),
        );
        let mut loads = TimelineLoads::new();
        engine
            .handle_command(Command::Refresh, &mut loads)
            .await;
        Harness {
            engine,
            api,
            invoker,
            loads,
        }
    }

    /// Pump every outstanding timeline load to completion.
    async fn drain_loads(h: &mut Harness) {
        while let Some(completed) = h.loads.next().await {
            h.engine.apply_load(completed);
        }
    }

    // Closed reply window: composer blocked with zero network calls.
    #[tokio::test]
    async fn test_send_outside_window_issues_no_network_calls() {
        let mut h = harness(vec![conv("c1", 0, false)]).await;
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut TimelineLoads::new())
            .await;

        h.engine
            .handle_command(
                Command::Send { text: "hi".into() },
                &mut TimelineLoads::new(),
            )
            .await;

        assert_eq!(h.api.send_calls.load(Ordering::SeqCst), 0);
        let notices = h.engine.take_notices();
        assert_eq!(
            notices,
            vec!["conversation is outside the 24-hour reply window".to_string()]
        );
        // No optimistic bubble either.
        assert!(h.engine.timeline().is_empty());
    }

    #[tokio::test]
    async fn test_send_empty_text_blocked_preflight() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut TimelineLoads::new())
            .await;
        h.engine
            .handle_command(
                Command::Send { text: "   ".into() },
                &mut TimelineLoads::new(),
            )
            .await;
        assert_eq!(h.api.send_calls.load(Ordering::SeqCst), 0);
    }

    // One Sending bubble, reconciled in place to one Sent bubble.
    #[tokio::test]
    async fn test_send_reconciles_to_single_bubble() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;
        drain_loads(&mut h).await;

        h.engine
            .handle_command(
                Command::Send { text: "hi".into() },
                &mut TimelineLoads::new(),
            )
            .await;

        let timeline = h.engine.timeline();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].id, "m99");
        assert_eq!(timeline.messages()[0].status, MessageStatus::Sent);
        assert_eq!(timeline.messages()[0].text, "hi");
        // Directory preview moved forward without badging.
        let c1 = h.engine.directory().get("c1").unwrap();
        assert_eq!(c1.last_message_preview, "hi");
        assert_eq!(c1.unread_count, 0);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_failed_bubble() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.api.fail_send.store(true, Ordering::SeqCst);
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;
        drain_loads(&mut h).await;

        h.engine
            .handle_command(
                Command::Send { text: "hi".into() },
                &mut TimelineLoads::new(),
            )
            .await;

        let timeline = h.engine.timeline();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].status, MessageStatus::Failed);
        assert_eq!(timeline.messages()[0].text, "hi");
        assert!(h.engine.take_notices()[0].starts_with("send failed"));
    }

    // Selection marks read, double-firing both
    // transports, and stays at zero on repeat.
    #[tokio::test]
    async fn test_mark_read_double_fires_and_is_idempotent() {
        let mut h = harness(vec![conv("c1", 4, true)]).await;
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;
        drain_loads(&mut h).await;

        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 0);
        assert_eq!(h.invoker.calls.lock().unwrap().as_slice(), ["MarkAsRead"]);
        assert_eq!(h.api.mark_read_calls.load(Ordering::SeqCst), 1);

        // Retry is independently safe.
        h.engine
            .handle_command(
                Command::MarkRead {
                    conversation_id: "c1".into(),
                },
                &mut TimelineLoads::new(),
            )
            .await;
        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 0);
        assert_eq!(h.api.mark_read_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mark_read_invoke_failure_still_fires_http() {
        let mut h = harness(vec![conv("c1", 2, true)]).await;
        h.invoker.fail.store(true, Ordering::SeqCst);

        h.engine
            .handle_command(
                Command::MarkRead {
                    conversation_id: "c1".into(),
                },
                &mut TimelineLoads::new(),
            )
            .await;

        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 0);
        assert_eq!(h.api.mark_read_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_assign_over_invoke_skips_http() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.engine
            .handle_command(
                Command::Assign {
                    conversation_id: "c1".into(),
                },
                &mut TimelineLoads::new(),
            )
            .await;

        let c1 = h.engine.directory().get("c1").unwrap();
        assert_eq!(c1.assigned_to_user_id.as_deref(), Some("u1"));
        assert_eq!(h.api.assign_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.invoker.calls.lock().unwrap().as_slice(), ["Assign"]);
    }

    #[tokio::test]
    async fn test_assign_falls_back_to_http_on_invoke_failure() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.invoker.fail.store(true, Ordering::SeqCst);

        h.engine
            .handle_command(
                Command::Assign {
                    conversation_id: "c1".into(),
                },
                &mut TimelineLoads::new(),
            )
            .await;

        let c1 = h.engine.directory().get("c1").unwrap();
        assert_eq!(c1.assigned_to_user_id.as_deref(), Some("u1"));
        assert_eq!(h.api.assign_calls.load(Ordering::SeqCst), 1);
        assert!(h.engine.take_notices().is_empty());
    }

    // Rollback contract: both transports fail → optimistic assign reverts
    // and the user sees an error.
    #[tokio::test]
    async fn test_assign_rolls_back_when_both_transports_fail() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.invoker.fail.store(true, Ordering::SeqCst);
        h.api.fail_assign.store(true, Ordering::SeqCst);

        h.engine
            .handle_command(
                Command::Assign {
                    conversation_id: "c1".into(),
                },
                &mut TimelineLoads::new(),
            )
            .await;

        let c1 = h.engine.directory().get("c1").unwrap();
        assert_eq!(c1.assigned_to_user_id, None);
        let notices = h.engine.take_notices();
        assert_eq!(notices, vec!["assign failed: already assigned".to_string()]);
    }

    #[tokio::test]
    async fn test_unassign_commit() {
        let mut assigned = conv("c1", 0, true);
        assigned.assigned_to_user_id = Some("u1".into());
        let mut h = harness(vec![assigned]).await;

        h.engine
            .handle_command(
                Command::Unassign {
                    conversation_id: "c1".into(),
                },
                &mut TimelineLoads::new(),
            )
            .await;
        assert_eq!(h.engine.directory().get("c1").unwrap().assigned_to_user_id, None);
    }

    // A Refresh unread update forces an authoritative re-fetch that
    // overwrites local counts.
    #[tokio::test]
    async fn test_unread_refresh_refetches_and_overwrites() {
        let mut h = harness(vec![conv("c1", 9, true)]).await;
        let calls_before = h.api.conversations_calls.load(Ordering::SeqCst);

        // Server now says c1 has 2 unread.
        *h.api.conversations.lock().unwrap() = vec![conv("c1", 2, true)];
        h.engine
            .handle_channel_event(ChannelEvent::Push(PushEvent::UnreadChanged(
                UnreadUpdate::Refresh,
            )))
            .await;

        assert_eq!(
            h.api.conversations_calls.load(Ordering::SeqCst),
            calls_before + 1
        );
        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 2);
    }

    #[tokio::test]
    async fn test_unread_batch_applies_without_refetch() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        let calls_before = h.api.conversations_calls.load(Ordering::SeqCst);

        h.engine
            .handle_channel_event(ChannelEvent::Push(PushEvent::UnreadChanged(
                UnreadUpdate::Batch {
                    items: vec![UnreadItem {
                        conversation_id: "c1".into(),
                        count: 6,
                    }],
                },
            )))
            .await;

        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 6);
        assert_eq!(h.api.conversations_calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_reconnect_triggers_full_refetch() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        let calls_before = h.api.conversations_calls.load(Ordering::SeqCst);

        h.engine.handle_channel_event(ChannelEvent::Down).await;
        assert!(!h.engine.is_online());

        h.engine.handle_channel_event(ChannelEvent::Up).await;
        assert!(h.engine.is_online());
        assert_eq!(
            h.api.conversations_calls.load(Ordering::SeqCst),
            calls_before + 1
        );
    }

    // Stale-response guard end to end: two selections, both fetches land,
    // only the second sticks.
    #[tokio::test]
    async fn test_stale_timeline_load_is_discarded() {
        let mut h = harness(vec![conv("c1", 0, true), conv("c2", 0, true)]).await;
        *h.api.messages.lock().unwrap() = vec![Message {
            id: "m-c1".into(),
            conversation_id: "c1".into(),
            direction: Direction::Inbound,
            text: "for c1".into(),
            sent_at: at(9),
            status: MessageStatus::Read,
            error_message: None,
        }];

        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;

        *h.api.messages.lock().unwrap() = vec![Message {
            id: "m-c2".into(),
            conversation_id: "c2".into(),
            direction: Direction::Inbound,
            text: "for c2".into(),
            sent_at: at(9),
            status: MessageStatus::Read,
            error_message: None,
        }];
        h.engine
            .handle_command(Command::Select(Some("c2".into())), &mut h.loads)
            .await;

        // Both loads resolve, in issue order; the stale one is refused.
        drain_loads(&mut h).await;

        let ids: Vec<&str> = h
            .engine
            .timeline()
            .messages()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m-c2"]);
        assert_eq!(h.engine.timeline().conversation_id(), Some("c2"));
    }

    // Push events badge unselected conversations only.
    #[tokio::test]
    async fn test_push_message_badges_and_view_sorts() {
        let mut h = harness(vec![conv("c1", 0, true), conv("c2", 0, true)]).await;
        h.engine
            .handle_command(Command::Select(Some("c2".into())), &mut h.loads)
            .await;
        drain_loads(&mut h).await;

        let ev = NewMessageEvent {
            conversation_id: Some("c1".into()),
            contact_id: None,
            contact_phone: None,
            message: Message {
                id: "m1".into(),
                conversation_id: "c1".into(),
                direction: Direction::Inbound,
                text: "ping".into(),
                sent_at: at(12),
                status: MessageStatus::Delivered,
                error_message: None,
            },
            is_inbound: true,
        };
        h.engine
            .handle_channel_event(ChannelEvent::Push(PushEvent::NewMessage(ev)))
            .await;

        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 1);
        let view = h.engine.view(None);
        assert_eq!(view[0].id, "c1");
        // Not the open conversation: timeline untouched.
        assert!(h.engine.timeline().is_empty());
    }

    #[tokio::test]
    async fn test_push_message_for_open_conversation_lands_in_timeline() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;
        drain_loads(&mut h).await;

        let ev = NewMessageEvent {
            conversation_id: Some("c1".into()),
            contact_id: None,
            contact_phone: None,
            message: Message {
                id: "m1".into(),
                conversation_id: "c1".into(),
                direction: Direction::Inbound,
                text: "ping".into(),
                sent_at: at(12),
                status: MessageStatus::Delivered,
                error_message: None,
            },
            is_inbound: true,
        };
        h.engine
            .handle_channel_event(ChannelEvent::Push(PushEvent::NewMessage(ev)))
            .await;

        assert_eq!(h.engine.timeline().len(), 1);
        // Open conversation: badge stays at zero.
        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 0);
    }

    // A push identifying the thread only by contact id/phone still lands in
    // the open timeline and does not badge it.
    #[tokio::test]
    async fn test_contact_only_push_lands_in_open_timeline() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;
        drain_loads(&mut h).await;

        let ev = NewMessageEvent {
            conversation_id: None,
            contact_id: Some("ct-c1".into()),
            contact_phone: Some("+1555000c1".into()),
            message: Message {
                id: "m1".into(),
                conversation_id: String::new(),
                direction: Direction::Inbound,
                text: "contact only".into(),
                sent_at: at(12),
                status: MessageStatus::Delivered,
                error_message: None,
            },
            is_inbound: true,
        };
        h.engine
            .handle_channel_event(ChannelEvent::Push(PushEvent::NewMessage(ev)))
            .await;

        assert_eq!(h.engine.timeline().len(), 1);
        assert_eq!(h.engine.timeline().messages()[0].text, "contact only");
        assert_eq!(h.engine.directory().get("c1").unwrap().unread_count, 0);
    }

    // Sending while the selection's fetch is still in flight keeps the
    // optimistic bubble when the snapshot lands.
    #[tokio::test]
    async fn test_send_during_inflight_load_survives_snapshot() {
        let mut h = harness(vec![conv("c1", 0, true)]).await;
        *h.api.messages.lock().unwrap() = vec![Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            direction: Direction::Inbound,
            text: "history".into(),
            sent_at: at(9),
            status: MessageStatus::Read,
            error_message: None,
        }];

        h.engine
            .handle_command(Command::Select(Some("c1".into())), &mut h.loads)
            .await;
        // Send resolves before the timeline fetch does.
        h.engine
            .handle_command(
                Command::Send { text: "hi".into() },
                &mut TimelineLoads::new(),
            )
            .await;
        drain_loads(&mut h).await;

        let ids: Vec<&str> = h
            .engine
            .timeline()
            .messages()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "m99"]);
        assert_eq!(h.engine.timeline().messages()[1].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_set_tab_changes_view() {
        let mut mine = conv("c1", 0, true);
        mine.assigned_to_user_id = Some("u1".into());
        let mut h = harness(vec![mine, conv("c2", 0, true)]).await;

        h.engine
            .handle_command(Command::SetTab(Tab::Mine), &mut TimelineLoads::new())
            .await;
        let view = h.engine.view(None);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "c1");
    }
}
