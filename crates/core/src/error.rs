// crates/core/src/error.rs
//! Pre-flight validation failures.
//!
//! These are business-rule violations blocked client-side before any network
//! call is issued. Transport and REST failures live in the channel and api
//! crates respectively.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message text is empty")]
    EmptyMessage,

    #[error("conversation is outside the 24-hour reply window")]
    OutsideWindow,

    #[error("no business context for this session")]
    MissingBusinessContext,

    #[error("conversation has no linked contact")]
    NoLinkedContact,
}
