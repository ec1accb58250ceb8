// crates/core/src/separators.rs
//! Date separators for the timeline view.
//!
//! Purely derived: recomputed on every read, never persisted. The caller
//! supplies "today" so the grouping stays deterministic under test.

use std::fmt;

use chrono::NaiveDate;
use teamline_types::Message;

/// Human label for one calendar day of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayLabel::Today => write!(f, "Today"),
            DayLabel::Yesterday => write!(f, "Yesterday"),
            DayLabel::Date(d) => write!(f, "{}", d.format("%B %-d, %Y")),
        }
    }
}

/// One rendered group: the separator label plus that day's messages.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup<'a> {
    pub label: DayLabel,
    pub day: NaiveDate,
    pub messages: &'a [Message],
}

/// Label a calendar day relative to `today`.
pub fn day_label(day: NaiveDate, today: NaiveDate) -> DayLabel {
    if day == today {
        DayLabel::Today
    } else if today.pred_opt() == Some(day) {
        DayLabel::Yesterday
    } else {
        DayLabel::Date(day)
    }
}

/// Lazily group a chronological message slice by calendar day.
pub fn date_separators(
    messages: &[Message],
    today: NaiveDate,
) -> impl Iterator<Item = DayGroup<'_>> {
    messages
        .chunk_by(|a, b| a.sent_at.date_naive() == b.sent_at.date_naive())
        .map(move |chunk| {
            let day = chunk[0].sent_at.date_naive();
            DayGroup {
                label: day_label(day, today),
                day,
                messages: chunk,
            }
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
