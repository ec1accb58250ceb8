// crates/core/src/lib.rs
//! Pure synchronization logic for the teamline inbox.
//!
//! No I/O lives here. The directory, timeline, and policy types are driven
//! by the engine crate, which feeds them REST snapshots, normalized push
//! events, and user actions, all on a single cooperative task.

pub mod assignment;
pub mod directory;
pub mod error;
pub mod separators;
pub mod timeline;
pub mod unread;
pub mod window;

pub use assignment::{Assignment, PendingAssignment};
pub use directory::{ConversationDirectory, SnapshotMode};
pub use error::ValidationError;
pub use separators::{day_label, DayGroup, DayLabel};
pub use timeline::{LoadTicket, MessageTimeline, PushApplied};
pub use unread::UnreadOutcome;
pub use window::{is_send_allowed, validate_send};
