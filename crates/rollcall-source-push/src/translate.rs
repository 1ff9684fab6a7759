//! Frame translation from the push channel's wire format to
//! [`AttendanceEvent`].
//!
//! The push channel is credentialed by construction: frames arrive over
//! an authenticated connection and carry the viewer's scope id. A frame
//! may still mark itself uncredentialed explicitly, in which case its
//! records are flagged untrusted downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::types::{
    AttendanceEvent, EventPayload, RawParticipant, RollcallError, SourceKind,
};

/// Raw push frame. `type` selects the variant; unrelated fields default
/// so every frame kind deserializes through the same struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_code: String,
    #[serde(default)]
    pub scope_id: Option<String>,
    /// Server-side observation time. Absent on some legacy frames;
    /// translation falls back to receipt time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<RawParticipant>,
    /// Delta frames may carry a single participant instead of a list.
    #[serde(default)]
    pub participant: Option<RawParticipant>,
    /// Only on `membership_confirmed`.
    #[serde(default)]
    pub scope_ids: Vec<String>,
    /// Only on `session_ended`.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub credentialed: Option<bool>,
}

/// Translate one push frame. `seq` disambiguates frames that share a
/// timestamp.
pub fn translate(
    frame: &PushFrame,
    seq: u64,
    received_at: DateTime<Utc>,
) -> Result<AttendanceEvent, RollcallError> {
    if frame.session_code.trim().is_empty() {
        return Err(RollcallError::MalformedEvent(
            "push frame without session code".into(),
        ));
    }

    let mut participants = frame.participants.clone();
    if let Some(single) = &frame.participant {
        participants.push(single.clone());
    }

    let payload = match frame.kind.as_str() {
        "participant_change" => EventPayload::ParticipantChange { participants },
        "attendance_progress" => EventPayload::ProgressSnapshot {
            participants,
            host_lock: None,
        },
        "attendance_saved" => EventPayload::SavedRecord { participants },
        "membership_confirmed" => EventPayload::MembershipConfirmed {
            scope_ids: frame.scope_ids.clone(),
        },
        "session_ended" => EventPayload::SessionEnded {
            reason: frame
                .reason
                .clone()
                .unwrap_or_else(|| "unspecified".to_string()),
        },
        other => return Err(RollcallError::UnknownFrameType(other.to_string())),
    };

    Ok(AttendanceEvent {
        event_id: format!("push-{seq}"),
        source: SourceKind::Push,
        session_code: frame.session_code.clone(),
        scope_id: frame.scope_id.clone(),
        credentialed: frame.credentialed.unwrap_or(true),
        observed_at: frame.timestamp.unwrap_or(received_at),
        payload,
    })
}
