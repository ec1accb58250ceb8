// crates/channel/src/error.rs
use thiserror::Error;

/// Push-channel failures.
///
/// `Auth` means the connection was never attempted. `Connection` is retried
/// by the backoff loop and only surfaces as the offline indicator. `Invoke`
/// callers fall back to the HTTP equivalent when one exists.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no session token; connection not attempted")]
    Auth,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invoke '{method}' failed: {reason}")]
    Invoke { method: String, reason: String },
}
