// crates/channel/src/frame.rs
//! Wire frames exchanged with the push server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every frame on the socket, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client → server, first frame after connect.
    Auth { token: String, business_id: String },
    /// Server → client, auth accepted.
    AuthOk,
    /// Server → client, auth rejected. The connection closes after this.
    AuthError { message: String },
    /// Server → client push event. `payload` is raw and goes through the
    /// normalization boundary before anything else touches it.
    Event { name: String, payload: Value },
    /// Client → server RPC request.
    Invoke { id: u64, method: String, args: Value },
    /// Server → client RPC response, correlated by `id`.
    InvokeResult {
        id: u64,
        ok: bool,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        error: Option<String>,
    },
}
