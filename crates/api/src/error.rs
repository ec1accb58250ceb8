// crates/api/src/error.rs
use serde::Deserialize;
use thiserror::Error;

/// A REST call failed.
///
/// `Api` carries the server-provided message when the body had one;
/// `Transport` is everything below HTTP (DNS, TLS, timeouts). Neither is
/// auto-retried: the caller surfaces the failure and, for optimistic
/// actions, rolls back.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },
}

/// Structured error body the backend sends on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl RequestError {
    /// Build from a non-success response, preferring the server's message.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => match parsed.details {
                Some(details) => format!("{}: {}", parsed.error, details),
                None => parsed.error,
            },
            Err(_) if !body.trim().is_empty() => body.trim().to_string(),
            Err(_) => format!("HTTP {status}"),
        };
        RequestError::Api { status, message }
    }
}
