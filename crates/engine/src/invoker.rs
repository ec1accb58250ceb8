// crates/engine/src/invoker.rs
//! Seam over the push channel's RPC surface.
//!
//! The engine only needs `invoke`; hiding the full `ChannelManager` behind
//! this trait lets tests substitute a scripted invoker.

use async_trait::async_trait;
use serde_json::Value;
use teamline_channel::{ChannelError, ChannelManager};

#[async_trait]
pub trait PushInvoker: Send + Sync {
    async fn invoke(&self, method: &str, args: Value) -> Result<Value, ChannelError>;
}

#[async_trait]
impl PushInvoker for ChannelManager {
    async fn invoke(&self, method: &str, args: Value) -> Result<Value, ChannelError> {
        ChannelManager::invoke(self, method, args).await
    }
}
