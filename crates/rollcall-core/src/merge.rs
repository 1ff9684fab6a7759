//! Merge engine: folds one authorized event into the per-session
//! participant map.
//!
//! Order tolerance is structural, not incidental: every merged field is
//! either a join-semilattice value (category upgrade, sticky tardy, max
//! duration, earliest join) or a last-writer-wins register keyed on the
//! event's `observed_at` (live/left flags, display name). Replaying the
//! same facts in any adapter-consistent order reaches the same state, and
//! re-applying an already-merged event changes nothing.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::EngineConfig;
use crate::duration;
use crate::identity;
use crate::types::{
    AttendanceEvent, Category, DisplayStatus, EventPayload, ParticipantRecord, RawParticipant,
    SessionState,
};

/// Statistics from one event application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub malformed_dropped: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.created > 0 || self.updated > 0
    }
}

/// Fold one event into the session. Control payloads (membership,
/// session-ended) are the reconciler's job and fall through untouched.
pub fn apply_event(
    state: &mut SessionState,
    event: &AttendanceEvent,
    config: &EngineConfig,
) -> MergeStats {
    let mut stats = MergeStats::default();

    if state.scope_id.is_none() {
        state.scope_id = event.scope_id.clone();
    }

    // First observation of the session, regardless of arrival order.
    if event.observed_at < state.started_at {
        state.started_at = event.observed_at;
    }

    if event.payload.is_presence() && event.observed_at > state.last_presence_at {
        state.last_presence_at = event.observed_at;
    }

    if let EventPayload::ProgressSnapshot {
        host_lock: Some(lock),
        ..
    } = &event.payload
    {
        state.host_locked = lock.locked;
        if let Some(host) = &lock.host {
            let mut host = host.clone();
            host.is_host = true;
            merge_participant(
                state,
                &host,
                event.credentialed,
                event.observed_at,
                config,
                &mut stats,
            );
        }
    }

    if let Some(participants) = event.payload.participants() {
        for raw in participants {
            merge_participant(
                state,
                raw,
                event.credentialed,
                event.observed_at,
                config,
                &mut stats,
            );
        }
    }

    enforce_host_lock(state);
    stats
}

/// Merge one wire participant into the session map.
fn merge_participant(
    state: &mut SessionState,
    raw: &RawParticipant,
    credentialed: bool,
    observed_at: DateTime<Utc>,
    config: &EngineConfig,
    stats: &mut MergeStats,
) {
    let Some(mut key) = identity::identity_key(raw, &state.session_code) else {
        stats.malformed_dropped += 1;
        return;
    };

    // Later host claimants fold into the sticky first claimant instead of
    // becoming a second host row.
    if raw.is_host
        && let Some(host_key) = state.host_key.clone()
        && host_key != key
        && state.participants.contains_key(&host_key)
    {
        key = host_key;
    }

    // Similarity fallback: a renamed participant with no stable id maps
    // back onto the record it drifted from.
    let mut similarity_hit = false;
    if !state.participants.contains_key(&key)
        && let Some(existing) =
            identity::find_similar_key(&state.participants, &raw.name, config.similarity_min_prefix)
    {
        key = existing;
        similarity_hit = true;
    }

    match state.participants.get_mut(&key) {
        None => {
            let record = create_record(key.clone(), raw, credentialed, observed_at);
            if record.category == Category::Host && state.host_key.is_none() {
                state.host_key = Some(key.clone());
            }
            state.participants.insert(key, record);
            stats.created += 1;
        }
        Some(record) => {
            let before = record.clone();
            update_record(record, raw, credentialed, observed_at, similarity_hit);
            if record.category == Category::Host && state.host_key.is_none() {
                state.host_key = Some(key);
            }
            if *record == before {
                stats.unchanged += 1;
            } else {
                stats.updated += 1;
            }
        }
    }
}

fn incoming_category(raw: &RawParticipant) -> Category {
    if raw.is_host {
        Category::Host
    } else if raw.has_roster_identity() {
        Category::Verified
    } else {
        Category::Guest
    }
}

/// Presence flags as reported by the wire. Inclusion in a payload with
/// neither flag set implies the participant was observed live.
fn reported_presence(raw: &RawParticipant) -> (bool, bool) {
    let left = raw.has_left.unwrap_or(false);
    let live = raw.is_live.unwrap_or(!left);
    (live, left)
}

fn create_record(
    key: String,
    raw: &RawParticipant,
    credentialed: bool,
    observed_at: DateTime<Utc>,
) -> ParticipantRecord {
    let (live, left) = reported_presence(raw);
    let joined_at = if live {
        Some(raw.joined_at.unwrap_or(observed_at))
    } else {
        raw.joined_at
    };
    let left_at = if left {
        Some(raw.left_at.unwrap_or(observed_at))
    } else {
        None
    };
    ParticipantRecord {
        identity_key: key,
        display_name: raw.name.trim().to_string(),
        category: incoming_category(raw),
        is_live: live,
        is_left: left,
        tardy: raw.tardy.unwrap_or(false),
        joined_at,
        left_at,
        accumulated_secs: raw.duration_secs.unwrap_or(0),
        source_trusted: credentialed,
        last_seen_at: observed_at,
        status_observed_at: observed_at,
    }
}

fn update_record(
    record: &mut ParticipantRecord,
    raw: &RawParticipant,
    credentialed: bool,
    observed_at: DateTime<Utc>,
    similarity_hit: bool,
) {
    // Lattice fields: applied regardless of event order.
    record.category = record.category.max(incoming_category(raw));
    record.tardy |= raw.tardy.unwrap_or(false);
    record.source_trusted |= credentialed;
    record.last_seen_at = record.last_seen_at.max(observed_at);
    if let Some(reported) = raw.duration_secs {
        // The external duration is authoritative; never frozen by a
        // stale local value, never rolled back either.
        record.accumulated_secs = duration::reconcile(record.accumulated_secs, reported);
    }

    let (live, left) = reported_presence(raw);
    let join_candidate = raw.joined_at.or(if live { Some(observed_at) } else { None });
    if let Some(candidate) = join_candidate {
        record.joined_at = Some(match record.joined_at {
            Some(existing) => existing.min(candidate),
            None => candidate,
        });
    }

    // Register fields: only the newest observation wins. Departure times
    // additionally min-join within the current departure episode, so
    // duplicate "left" facts land on the earliest observed time no
    // matter which adapter delivers first.
    let newest = observed_at >= record.status_observed_at;
    if newest {
        record.status_observed_at = observed_at;
        let name = raw.name.trim();
        // A similarity hit keeps the established name; drifted variants
        // only fill in when the record had no name to begin with.
        if !name.is_empty() && (!similarity_hit || record.display_name.is_empty()) {
            record.display_name = name.to_string();
        }
    }

    if live {
        if newest {
            // Explicit return: departure is cleared.
            record.is_live = true;
            record.is_left = false;
            record.left_at = None;
        }
    } else if left {
        let candidate = raw.left_at.unwrap_or(observed_at);
        if newest {
            record.is_live = false;
            record.is_left = true;
            record.left_at = Some(record.left_at.map_or(candidate, |t| t.min(candidate)));
        } else if record.is_left {
            record.left_at = Some(record.left_at.map_or(candidate, |t| t.min(candidate)));
        }
    } else if newest {
        record.is_live = false;
    }
}

/// While the bridge reports the host locked, the sticky host record is
/// forced live; only the explicit host-left transition (lock released)
/// can override this.
fn enforce_host_lock(state: &mut SessionState) {
    if !state.host_locked {
        return;
    }
    let Some(key) = state.host_key.clone() else {
        return;
    };
    if let Some(host) = state.participants.get_mut(&key) {
        host.is_live = true;
        host.is_left = false;
        host.left_at = None;
    }
}

// ─── Status derivation ────────────────────────────────────────────

/// Compute the displayed status for a record. Derived on demand, never
/// stored.
///
/// While the host is still around, departed participants sit in
/// `Pending`; once the host has also left, a departure within the
/// tie-break window of the host's own (or after it) counts as present
/// for the session, anything earlier is an early departure.
pub fn derived_status(
    record: &ParticipantRecord,
    host_departed_at: Option<DateTime<Utc>>,
    config: &EngineConfig,
) -> DisplayStatus {
    if record.is_live && !record.is_left {
        return if record.tardy {
            DisplayStatus::Late
        } else {
            DisplayStatus::Present
        };
    }

    match host_departed_at {
        None => DisplayStatus::Pending,
        Some(host_left) => {
            let departed = record.left_at.unwrap_or(record.last_seen_at);
            let window = TimeDelta::seconds(config.departure_tie_break_secs as i64);
            if departed + window >= host_left {
                if record.tardy {
                    DisplayStatus::Late
                } else {
                    DisplayStatus::Present
                }
            } else {
                DisplayStatus::Left
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
