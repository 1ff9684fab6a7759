use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ─── Source ───────────────────────────────────────────────────────

/// Which of the three independent producers delivered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SourceKind {
    Push,
    Bridge,
    Poll,
}

impl SourceKind {
    pub const ALL: [Self; 3] = [Self::Push, Self::Bridge, Self::Poll];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Bridge => "bridge",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Category ─────────────────────────────────────────────────────

/// Participant category. Ordered as an upgrade lattice: merges may only
/// move a record upward (`Guest < Verified < Host`), which makes the
/// host flag sticky and keeps merges order-independent.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Category {
    #[default]
    Guest = 0,
    Verified = 1,
    Host = 2,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Verified => "verified",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Host presence ────────────────────────────────────────────────

/// Host presence phase for a session.
///
/// `Present → Grace` the instant the host stops being observed live,
/// `Grace → Paused` once the grace window elapses, and any host-live
/// observation snaps back to `Present` immediately.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPhase {
    #[default]
    Present,
    Grace,
    Paused,
}

// ─── Display status ───────────────────────────────────────────────

/// Derived (never stored) display status for a non-host participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Present,
    Late,
    /// Departed while the host is still around; final disposition waits
    /// for the host's own departure.
    Pending,
    /// Departed well before the host did.
    Left,
}

// ─── Wire participant ─────────────────────────────────────────────

/// Participant payload as delivered by any of the three producers.
/// Every field except `name` can be absent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawParticipant {
    /// Stable visual fingerprint computed by the companion extension.
    pub fingerprint: Option<String>,
    /// Meeting-assigned participant id.
    pub participant_id: Option<String>,
    /// Platform account id.
    pub account_id: Option<String>,
    /// Course roster id.
    pub roster_id: Option<String>,
    pub name: String,
    pub is_host: bool,
    pub is_live: Option<bool>,
    pub has_left: Option<bool>,
    pub tardy: Option<bool>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<u64>,
}

impl RawParticipant {
    /// A roster-identifying field upgrades the participant to `Verified`.
    pub fn has_roster_identity(&self) -> bool {
        non_empty(&self.account_id) || non_empty(&self.roster_id)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

// ─── Host lock ────────────────────────────────────────────────────

/// Bridge-reported host lock: while locked, the sticky host record is
/// forced live regardless of flickering presence signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostLock {
    pub locked: bool,
    pub host: Option<RawParticipant>,
}

// ─── Normalized event ─────────────────────────────────────────────

/// Closed sum of everything the producers can deliver. Each adapter
/// translates its own wire shape into exactly one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Per-participant delta (push channel).
    ParticipantChange { participants: Vec<RawParticipant> },
    /// Full presence snapshot (bridge, poll, push progress frames).
    ProgressSnapshot {
        participants: Vec<RawParticipant>,
        host_lock: Option<HostLock>,
    },
    /// Server acknowledged a saved attendance record.
    SavedRecord { participants: Vec<RawParticipant> },
    /// The bridge store exists but its contents are too old to trust.
    Stale { age_secs: u64 },
    /// The bridge store is present but holds no session data.
    Empty,
    /// The authorized-scope set has been resolved.
    MembershipConfirmed { scope_ids: Vec<String> },
    /// External signal that the meeting ended; wipes session state.
    SessionEnded { reason: String },
}

impl EventPayload {
    /// Participants carried by this payload, if any.
    pub fn participants(&self) -> Option<&[RawParticipant]> {
        match self {
            Self::ParticipantChange { participants }
            | Self::ProgressSnapshot { participants, .. }
            | Self::SavedRecord { participants } => Some(participants),
            _ => None,
        }
    }

    /// Whether this payload carries fresh presence data. Stale/empty
    /// bridge reads and control frames do not reset the staleness
    /// watchdog.
    pub fn is_presence(&self) -> bool {
        self.participants().is_some()
    }
}

/// One normalized event, ready for `classify → merge → track`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub event_id: String,
    pub source: SourceKind,
    pub session_code: String,
    pub scope_id: Option<String>,
    /// False when the event arrived without scope credentials. Such
    /// events are always accepted and their records flagged untrusted.
    pub credentialed: bool,
    pub observed_at: DateTime<Utc>,
    pub payload: EventPayload,
}

// ─── Participant record ───────────────────────────────────────────

/// One reconciled row per distinct attendee in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Stable dedup key; decided once, re-targeted only by the
    /// similarity rule.
    pub identity_key: String,
    pub display_name: String,
    pub category: Category,
    pub is_live: bool,
    pub is_left: bool,
    pub tardy: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing elapsed seconds.
    pub accumulated_secs: u64,
    pub source_trusted: bool,
    pub last_seen_at: DateTime<Utc>,
    /// Observation time of the newest event that set the live/left
    /// registers; older events cannot overwrite them.
    pub status_observed_at: DateTime<Utc>,
}

// ─── Session state ────────────────────────────────────────────────

/// Reconciled state for one tracked meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_code: String,
    pub scope_id: Option<String>,
    pub participants: HashMap<String, ParticipantRecord>,
    /// Sticky pointer at the first host claimant for this session.
    pub host_key: Option<String>,
    /// Bridge-reported lock forcing the host live.
    pub host_locked: bool,
    pub host_phase: HostPhase,
    pub started_at: DateTime<Utc>,
    /// Newest presence-carrying event, for the staleness watchdog.
    pub last_presence_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_code: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_code: session_code.into(),
            scope_id: None,
            participants: HashMap::new(),
            host_key: None,
            host_locked: false,
            host_phase: HostPhase::Present,
            started_at: now,
            last_presence_at: now,
        }
    }

    /// The sticky host record, if one has claimed the session.
    pub fn host(&self) -> Option<&ParticipantRecord> {
        self.host_key
            .as_deref()
            .and_then(|key| self.participants.get(key))
    }

    /// Whether the host is currently observed live.
    pub fn host_live(&self) -> bool {
        self.host().is_some_and(|h| h.is_live)
    }

    /// When the host departed, if they have. `None` while the host is
    /// still live or has never been seen.
    pub fn host_departed_at(&self) -> Option<DateTime<Utc>> {
        let host = self.host()?;
        if host.is_live {
            return None;
        }
        if host.is_left {
            host.left_at.or(Some(host.last_seen_at))
        } else {
            None
        }
    }
}

// ─── Error ────────────────────────────────────────────────────────

/// Failures surfaced by translation and merge. Everything here is
/// recoverable; nothing in the pipeline raises a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollcallError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("invalid wire payload: {0}")]
    InvalidPayload(String),
}

// ─── Tests ────────────────────────────────────────────────────────
