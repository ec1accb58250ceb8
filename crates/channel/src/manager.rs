// crates/channel/src/manager.rs
//! Connection lifecycle for the push channel.
//!
//! One `ChannelManager` per process. `connect` spawns a background task that
//! owns the socket: authenticate, stream events, heartbeat, and reconnect
//! with exponential backoff when the transport drops. Consumers subscribe
//! through the ref-counted registry and receive [`ChannelEvent`]s on their
//! own mpsc receivers; `invoke` runs correlation-id RPCs over the same
//! socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use teamline_types::{PushEvent, SessionContext};

use crate::error::ChannelError;
use crate::frame::Frame;
use crate::normalize::normalize_event;
use crate::registry::HandlerRegistry;

/// Which registry bucket a subscriber listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Up/Down transitions of the connection itself.
    Connection,
    NewMessage,
    UnreadChanged,
}

/// What subscribers receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connected (or reconnected; consumers should re-fetch the directory,
    /// events during the outage window are lost, not replayed).
    Up,
    /// Connection lost; the backoff loop is retrying.
    Down,
    Push(PushEvent),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Up | ChannelEvent::Down => EventKind::Connection,
            ChannelEvent::Push(PushEvent::NewMessage(_)) => EventKind::NewMessage,
            ChannelEvent::Push(PushEvent::UnreadChanged(_)) => EventKind::UnreadChanged,
        }
    }
}

/// Tunables for the connection task.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// wss://host/ws
    pub ws_url: String,
    pub heartbeat_interval: Duration,
    pub max_reconnect_delay: Duration,
    pub invoke_timeout: Duration,
}

impl ChannelConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            heartbeat_interval: Duration::from_secs(30),
            max_reconnect_delay: Duration::from_secs(30),
            invoke_timeout: Duration::from_secs(10),
        }
    }
}

type PendingInvokes = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

pub struct ChannelManager {
    config: ChannelConfig,
    ctx: SessionContext,
    registry: Arc<Mutex<HandlerRegistry>>,
    connected: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedSender<Frame>,
    /// Taken by `connect`; the background task owns it afterwards.
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    pending: PendingInvokes,
    next_invoke_id: AtomicU64,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig, ctx: SessionContext) -> Self {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        Self {
            config,
            ctx,
            registry: Arc::new(Mutex::new(HandlerRegistry::new())),
            connected: Arc::new(AtomicBool::new(false)),
            outgoing,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_invoke_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Observable connection state; drives composer and offline indicators.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register a subscriber. Idempotent per (kind, identity), see
    /// [`HandlerRegistry::attach`].
    pub fn on(
        &self,
        kind: EventKind,
        subscriber: impl Into<String>,
        sender: mpsc::UnboundedSender<ChannelEvent>,
    ) -> bool {
        self.registry
            .lock()
            .expect("registry poisoned")
            .attach(kind, subscriber, sender)
    }

    /// Deregister a subscriber once.
    pub fn off(&self, kind: EventKind, subscriber: &str) -> bool {
        self.registry
            .lock()
            .expect("registry poisoned")
            .detach(kind, subscriber)
    }

    /// Start the connection task.
    ///
    /// Hard precondition: the session must carry a token. Without one no
    /// connection is attempted and the caller is expected to prompt for
    /// re-authentication. Calling `connect` on an already-running manager is
    /// a no-op, and the manager is single-shot: after `disconnect` a later
    /// `connect` is also a no-op (the cancellation is permanent). A new
    /// session gets a new manager.
    pub fn connect(&self) -> Result<(), ChannelError> {
        let Some(token) = self.ctx.token.clone() else {
            return Err(ChannelError::Auth);
        };
        let mut task = self.task.lock().expect("task poisoned");
        if task.is_some() {
            return Ok(());
        }
        let Some(outgoing_rx) = self
            .outgoing_rx
            .lock()
            .expect("outgoing poisoned")
            .take()
        else {
            return Ok(());
        };

        info!(ws_url = %self.config.ws_url, "push channel starting");
        let worker = ConnectionWorker {
            config: self.config.clone(),
            token,
            business_id: self.ctx.business_id.clone(),
            registry: Arc::clone(&self.registry),
            connected: Arc::clone(&self.connected),
            pending: Arc::clone(&self.pending),
            shutdown: self.shutdown.clone(),
        };
        *task = Some(tokio::spawn(worker.run(outgoing_rx)));
        Ok(())
    }

    /// RPC over the socket: correlation-id frame out, oneshot completion in,
    /// bounded by the invoke timeout. State-changing callers with an HTTP
    /// equivalent fall back to it on failure.
    pub async fn invoke(&self, method: &str, args: Value) -> Result<Value, ChannelError> {
        let invoke_err = |reason: &str| ChannelError::Invoke {
            method: method.to_string(),
            reason: reason.to_string(),
        };
        if !self.is_connected() {
            return Err(invoke_err("offline"));
        }

        let id = self.next_invoke_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending poisoned")
            .insert(id, tx);

        let frame = Frame::Invoke {
            id,
            method: method.to_string(),
            args,
        };
        if self.outgoing.send(frame).is_err() {
            self.pending.lock().expect("pending poisoned").remove(&id);
            return Err(invoke_err("connection task gone"));
        }

        match tokio::time::timeout(self.config.invoke_timeout, rx).await {
            Ok(Ok(Ok(payload))) => Ok(payload),
            Ok(Ok(Err(reason))) => Err(invoke_err(&reason)),
            Ok(Err(_)) => Err(invoke_err("connection dropped")),
            Err(_) => {
                self.pending.lock().expect("pending poisoned").remove(&id);
                Err(invoke_err("timeout"))
            }
        }
    }

    /// Release the connection: cancel the task, deregister every handler,
    /// fail anything still pending. Safe to call on every exit path,
    /// including error paths and double-calls.
    pub async fn disconnect(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().expect("task poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.registry.lock().expect("registry poisoned").clear();
        fail_pending(&self.pending, "disconnected");
    }
}

/// Everything the background task needs, detached from the manager so the
/// manager stays usable while the task runs.
struct ConnectionWorker {
    config: ChannelConfig,
    token: String,
    business_id: String,
    registry: Arc<Mutex<HandlerRegistry>>,
    connected: Arc<AtomicBool>,
    pending: PendingInvokes,
    shutdown: CancellationToken,
}

impl ConnectionWorker {
    /// Reconnect loop: 1s backoff doubling to the cap, reset after a clean
    /// session.
    async fn run(self, mut outgoing_rx: mpsc::UnboundedReceiver<Frame>) {
        let mut backoff = Duration::from_secs(1);
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            match self.session(&mut outgoing_rx).await {
                Ok(()) => {
                    info!("push connection closed cleanly");
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(backoff_secs = backoff.as_secs(), "push connection failed: {e}");
                }
            }
            if self.shutdown.is_cancelled() {
                return;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.config.max_reconnect_delay);
        }
    }

    /// One connection: handshake, then stream until the socket drops or the
    /// manager shuts down. Flips the connected flag and emits Up/Down around
    /// the streaming phase on every exit path.
    async fn session(
        &self,
        outgoing_rx: &mut mpsc::UnboundedReceiver<Frame>,
    ) -> Result<(), String> {
        let (ws_stream, _) = connect_async(&self.config.ws_url)
            .await
            .map_err(|e| format!("connect failed: {e}"))?;
        let (mut sink, mut stream) = ws_stream.split();

        let auth = Frame::Auth {
            token: self.token.clone(),
            business_id: self.business_id.clone(),
        };
        send_frame(&mut sink, &auth)
            .await
            .map_err(|e| format!("auth send failed: {e}"))?;

        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<Frame>(&text) {
                Ok(Frame::AuthOk) => {}
                Ok(Frame::AuthError { message }) => return Err(format!("auth rejected: {message}")),
                other => return Err(format!("unexpected auth response: {other:?}")),
            },
            other => return Err(format!("unexpected auth response: {other:?}")),
        }

        info!("push channel authenticated");
        self.connected.store(true, Ordering::SeqCst);
        self.dispatch(ChannelEvent::Up);

        let result = self.stream_loop(&mut sink, &mut stream, outgoing_rx).await;

        self.connected.store(false, Ordering::SeqCst);
        self.dispatch(ChannelEvent::Down);
        fail_pending(&self.pending, "connection closed");
        result
    }

    async fn stream_loop<Sink, Stream>(
        &self,
        sink: &mut Sink,
        stream: &mut Stream,
        outgoing_rx: &mut mpsc::UnboundedReceiver<Frame>,
    ) -> Result<(), String>
    where
        Sink: SinkExt<WsMessage> + Unpin,
        Sink::Error: std::fmt::Display,
        Stream: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(());
                }
                frame = outgoing_rx.recv() => {
                    let Some(frame) = frame else { return Ok(()) };
                    if let Err(e) = send_frame(sink, &frame).await {
                        return Err(format!("send failed: {e}"));
                    }
                }
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {
                    if sink.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        return Ok(());
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(&text),
                        Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(format!("stream error: {e}")),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let frame = match serde_json::from_str::<Frame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("unparseable frame dropped: {e}");
                return;
            }
        };
        match frame {
            Frame::Event { name, payload } => {
                if let Some(event) = normalize_event(&name, &payload) {
                    self.dispatch(ChannelEvent::Push(event));
                }
            }
            Frame::InvokeResult {
                id,
                ok,
                payload,
                error,
            } => {
                complete_invoke(&self.pending, id, ok, payload, error);
            }
            other => debug!(?other, "unexpected frame from server, dropped"),
        }
    }

    fn dispatch(&self, event: ChannelEvent) {
        self.registry
            .lock()
            .expect("registry poisoned")
            .dispatch(&event);
    }
}

async fn send_frame<Sink>(sink: &mut Sink, frame: &Frame) -> Result<(), String>
where
    Sink: SinkExt<WsMessage> + Unpin,
    Sink::Error: std::fmt::Display,
{
    let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    sink.send(WsMessage::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Resolve one pending invoke by correlation id.
fn complete_invoke(pending: &PendingInvokes, id: u64, ok: bool, payload: Value, error: Option<String>) {
    let Some(tx) = pending.lock().expect("pending poisoned").remove(&id) else {
        debug!(id, "invoke result for unknown id (timed out?), dropped");
        return;
    };
    let result = if ok {
        Ok(payload)
    } else {
        Err(error.unwrap_or_else(|| "server error".to_string()))
    };
    let _ = tx.send(result);
}

/// Fail every pending invoke with one reason.
fn fail_pending(pending: &PendingInvokes, reason: &str) {
    let drained: Vec<_> = pending
        .lock()
        .expect("pending poisoned")
        .drain()
        .collect();
    for (_, tx) in drained {
        let _ = tx.send(Err(reason.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
