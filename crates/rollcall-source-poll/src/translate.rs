//! Response translation from the pull endpoint's format to
//! [`AttendanceEvent`]s, one full snapshot per active session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::types::{AttendanceEvent, EventPayload, RawParticipant, SourceKind};

/// Raw pull response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullResponse {
    pub has_active_sessions: bool,
    pub sessions: Vec<PullSession>,
    /// Server-side snapshot time, shared by every session in the
    /// response.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullSession {
    pub session_code: String,
    pub scope_id: Option<String>,
    pub participants: Vec<RawParticipant>,
}

/// Translate one pull response. Sessions without a code are skipped;
/// the endpoint is credentialed, so events carry full trust.
pub fn translate(
    response: &PullResponse,
    seq: u64,
    polled_at: DateTime<Utc>,
) -> Vec<AttendanceEvent> {
    if !response.has_active_sessions {
        return Vec::new();
    }
    let observed_at = response.timestamp.unwrap_or(polled_at);

    response
        .sessions
        .iter()
        .filter(|session| !session.session_code.trim().is_empty())
        .enumerate()
        .map(|(i, session)| AttendanceEvent {
            event_id: format!("poll-{seq}-{i}"),
            source: SourceKind::Poll,
            session_code: session.session_code.clone(),
            scope_id: session.scope_id.clone(),
            credentialed: true,
            observed_at,
            payload: EventPayload::ProgressSnapshot {
                participants: session.participants.clone(),
                host_lock: None,
            },
        })
        .collect()
}
