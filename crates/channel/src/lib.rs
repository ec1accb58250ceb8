// crates/channel/src/lib.rs
//! The push channel: a single shared, process-scoped WebSocket connection.
//!
//! `ChannelManager` owns the connection lifecycle (auth, connect, automatic
//! reconnect with backoff, RPC-style invoke) and fans events out through a
//! reference-counted handler registry. Raw wire payloads are mapped onto the
//! canonical [`teamline_types::PushEvent`] union by the `normalize` module;
//! nothing downstream ever sees a raw frame.

mod error;
mod frame;
mod manager;
pub mod normalize;
mod registry;

pub use error::ChannelError;
pub use frame::Frame;
pub use manager::{ChannelConfig, ChannelEvent, ChannelManager, EventKind};
pub use registry::HandlerRegistry;
