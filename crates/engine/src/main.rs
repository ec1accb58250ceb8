// crates/engine/src/main.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use teamline_api::RestClient;
use teamline_channel::{ChannelConfig, ChannelManager, EventKind};
use teamline_engine::{Command, EngineConfig, InboxEngine, PushInvoker};
use teamline_types::SessionContext;

#[derive(Parser, Debug)]
#[command(name = "teamline", about = "Team inbox synchronization engine")]
struct Args {
    /// REST API base, e.g. https://api.example.com/v1
    #[arg(long, env = "TEAMLINE_API_URL")]
    api_url: String,

    /// Push channel endpoint, e.g. wss://api.example.com/ws
    #[arg(long, env = "TEAMLINE_WS_URL")]
    ws_url: String,

    #[arg(long, env = "TEAMLINE_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "TEAMLINE_BUSINESS_ID")]
    business_id: String,

    #[arg(long, env = "TEAMLINE_USER_ID")]
    user_id: String,

    /// Restrict the inbox to one business phone number.
    #[arg(long, env = "TEAMLINE_NUMBER_ID")]
    number_id: Option<String>,

    /// Silent-refresh cadence in seconds.
    #[arg(long, default_value_t = 15)]
    poll_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,teamline=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut ctx = SessionContext::new(args.business_id, args.user_id).with_token(args.token);
    ctx.number_id = args.number_id;

    let api = Arc::new(RestClient::new(args.api_url, ctx.clone()));
    let channel = Arc::new(ChannelManager::new(
        ChannelConfig::new(args.ws_url),
        ctx.clone(),
    ));

    // All three event kinds funnel into one receiver; the engine demuxes.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    for kind in [
        EventKind::Connection,
        EventKind::NewMessage,
        EventKind::UnreadChanged,
    ] {
        channel.on(kind, "engine", event_tx.clone());
    }
    channel.connect().context("push channel connect")?;

    let engine = InboxEngine::new(
        ctx,
        api,
        Arc::clone(&channel) as Arc<dyn PushInvoker>,
        EngineConfig {
            poll_interval: Duration::from_secs(args.poll_secs),
            ..EngineConfig::default()
        },
    );

    let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();
    let engine_task = tokio::spawn(engine.run(command_rx, event_rx));

    info!("teamline engine running, ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;

    // Closing the mailbox stops the run loop.
    drop(command_tx);
    channel.disconnect().await;
    if let Err(e) = engine_task.await {
        warn!("engine task panicked: {e}");
    }
    Ok(())
}
