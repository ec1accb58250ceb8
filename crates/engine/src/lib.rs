// crates/engine/src/lib.rs
//! The inbox engine: one cooperative task that reconciles REST snapshots,
//! push events, and optimistic user actions into the core state.

mod engine;
mod invoker;

pub use engine::{Command, EngineConfig, InboxEngine, TimelineLoads};
pub use invoker::PushInvoker;
