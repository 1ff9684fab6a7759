//! Message translation from the relay store's format to
//! [`AttendanceEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::types::{
    AttendanceEvent, EventPayload, HostLock, RawParticipant, RollcallError, SourceKind,
};

/// Raw relay store contents. `type` is `update`, `stale` or `empty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: BridgePayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgePayload {
    pub session_code: Option<String>,
    pub participants: Vec<RawParticipant>,
    /// Relay-side write timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// Only on `stale`: how old the store contents are.
    pub age_seconds: Option<u64>,
    /// Host-lock signal: while set, the host is known live even if the
    /// participant list flickers.
    pub host_locked: Option<bool>,
    pub locked_host_info: Option<RawParticipant>,
}

/// Translate one relay message. `seq` numbers successive reads.
pub fn translate(
    message: &BridgeMessage,
    seq: u64,
    read_at: DateTime<Utc>,
) -> Result<AttendanceEvent, RollcallError> {
    let session_code = message
        .payload
        .session_code
        .clone()
        .unwrap_or_default();

    let payload = match message.kind.as_str() {
        "update" => {
            if session_code.trim().is_empty() {
                return Err(RollcallError::MalformedEvent(
                    "relay update without session code".into(),
                ));
            }
            let host_lock = message.payload.host_locked.map(|locked| HostLock {
                locked,
                host: message.payload.locked_host_info.clone(),
            });
            EventPayload::ProgressSnapshot {
                participants: message.payload.participants.clone(),
                host_lock,
            }
        }
        "stale" => EventPayload::Stale {
            age_secs: message.payload.age_seconds.unwrap_or(0),
        },
        "empty" => EventPayload::Empty,
        other => return Err(RollcallError::UnknownFrameType(other.to_string())),
    };

    Ok(AttendanceEvent {
        event_id: format!("bridge-{seq}"),
        source: SourceKind::Bridge,
        session_code,
        scope_id: None,
        credentialed: false,
        observed_at: message.payload.timestamp.unwrap_or(read_at),
        payload,
    })
}
