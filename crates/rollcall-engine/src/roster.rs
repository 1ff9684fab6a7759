//! Derived roster view: ordered display rows with computed statuses and
//! duration strings. Recomputed on demand, never stored.

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};
use rollcall_core::config::EngineConfig;
use rollcall_core::merge::derived_status;
use rollcall_core::types::{Category, DisplayStatus, SessionState};

/// One display row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub identity_key: String,
    pub display_name: String,
    pub category: Category,
    pub status: DisplayStatus,
    pub is_live: bool,
    pub source_trusted: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub duration_display: String,
}

/// Build the ordered roster for a session: hosts first, then verified,
/// then guests; within a category, currently-live first, then join time
/// ascending (unknown joins last), then name.
pub fn roster(state: &SessionState, config: &EngineConfig) -> Vec<RosterEntry> {
    let host_departed_at = state.host_departed_at();

    let mut entries: Vec<RosterEntry> = state
        .participants
        .values()
        .map(|record| RosterEntry {
            identity_key: record.identity_key.clone(),
            display_name: record.display_name.clone(),
            category: record.category,
            status: derived_status(record, host_departed_at, config),
            is_live: record.is_live,
            source_trusted: record.source_trusted,
            joined_at: record.joined_at,
            duration_secs: record.accumulated_secs,
            duration_display: format_duration(record.accumulated_secs),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.category
            .cmp(&a.category)
            .then_with(|| b.is_live.cmp(&a.is_live))
            .then_with(|| match (a.joined_at, b.joined_at) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    entries
}

/// Render accumulated seconds as `H:MM:SS`.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
