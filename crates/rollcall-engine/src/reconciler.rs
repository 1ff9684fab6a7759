//! The reconciliation actor: single entry point for every producer.
//!
//! All three adapters feed the same `classify → merge → track` pipeline
//! here, so whichever channel delivers first or last, the resulting
//! per-session state is identical. The reconciler owns all per-session
//! timer state (grace windows, staleness, duration ticks, the queue
//! drain deadline); a session reset tears everything down in one place.
//!
//! Push semantics toward clients are modeled via version-based change
//! tracking: callers poll `changes_since(version)`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rollcall_core::config::EngineConfig;
use rollcall_core::duration::DurationClock;
use rollcall_core::host_presence::HostPresenceTracker;
use rollcall_core::merge;
use rollcall_core::queue::UpdateQueue;
use rollcall_core::scope::{Classification, ScopeAuthorizer};
use rollcall_core::types::{AttendanceEvent, EventPayload, HostPhase, SessionState};

use crate::membership::MembershipManager;
use crate::roster::{self, RosterEntry};

/// Monotonic version counter for change tracking.
pub type StateVersion = u64;

/// Hard cap on retained change-log entries. Clients that fall further
/// behind than this resynchronize from the full session state instead.
const CHANGE_LOG_CAP: usize = 4096;

/// Change notification for a session state update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub version: StateVersion,
    pub session_code: String,
    pub timestamp: DateTime<Utc>,
}

/// Diagnostic counters. Failures in the pipeline never surface to the
/// user; these are the only trace they leave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerCounters {
    pub accepted: u64,
    pub queued: u64,
    pub rejected_scope: u64,
    pub malformed_dropped: u64,
    pub queue_timeouts: u64,
    pub queue_evicted: u64,
    pub sessions_ended: u64,
}

/// How one event was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Queued,
    Rejected,
    /// Membership confirmation or session-ended signal.
    Control,
    /// Stale/empty frame for a session we are not tracking.
    Ignored,
}

#[derive(Debug)]
struct SessionEntry {
    state: SessionState,
    host: HostPresenceTracker,
    clock: DurationClock,
}

impl SessionEntry {
    fn new(session_code: &str, observed_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::new(session_code, observed_at),
            host: HostPresenceTracker::new(now),
            clock: DurationClock::new(),
        }
    }
}

#[derive(Debug)]
pub struct Reconciler {
    config: EngineConfig,
    authorizer: ScopeAuthorizer,
    membership: MembershipManager,
    queue: UpdateQueue,
    sessions: HashMap<String, SessionEntry>,
    version: StateVersion,
    /// Sorted by version; bounded by `CHANGE_LOG_CAP` plus explicit
    /// trims, so a long-running daemon cannot grow without limit.
    changes: Vec<StateChange>,
    counters: ReconcilerCounters,
}

impl Reconciler {
    pub fn new(config: EngineConfig) -> Self {
        let queue = UpdateQueue::new(
            config.queue_capacity,
            config.queue_max_age_secs,
            config.queue_drain_timeout_secs,
        );
        Self {
            config,
            authorizer: ScopeAuthorizer::new(),
            membership: MembershipManager::new(),
            queue,
            sessions: HashMap::new(),
            version: 0,
            changes: Vec::new(),
            counters: ReconcilerCounters::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Event intake ─────────────────────────────────────────────

    /// Route one normalized event from any adapter.
    pub fn apply_event(&mut self, event: AttendanceEvent, now: DateTime<Utc>) -> Disposition {
        match &event.payload {
            EventPayload::MembershipConfirmed { scope_ids } => {
                let scopes = scope_ids.clone();
                self.confirm_membership(scopes, now);
                return Disposition::Control;
            }
            EventPayload::SessionEnded { .. } => {
                self.end_session(&event.session_code, now);
                return Disposition::Control;
            }
            _ => {}
        }

        match self.authorizer.classify(&event) {
            Classification::Accept => self.ingest(event, now),
            Classification::Queue => {
                self.membership.request(&event.session_code);
                let outcome = self.queue.enqueue(event, now);
                self.counters.queued += 1;
                self.counters.queue_evicted += outcome.evicted as u64;
                Disposition::Queued
            }
            Classification::Reject => {
                // Another viewer's session: silently dropped, not an error.
                self.counters.rejected_scope += 1;
                Disposition::Rejected
            }
        }
    }

    /// Apply an accepted event to its session.
    fn ingest(&mut self, event: AttendanceEvent, now: DateTime<Utc>) -> Disposition {
        let presence = event.payload.is_presence();
        if !self.sessions.contains_key(&event.session_code) {
            // Stale/empty frames do not conjure sessions into existence.
            if !presence {
                return Disposition::Ignored;
            }
            self.membership.request(&event.session_code);
            self.sessions.insert(
                event.session_code.clone(),
                SessionEntry::new(&event.session_code, event.observed_at, now),
            );
        }
        let Some(entry) = self.sessions.get_mut(&event.session_code) else {
            return Disposition::Ignored;
        };

        let stats = merge::apply_event(&mut entry.state, &event, &self.config);
        self.counters.accepted += 1;
        self.counters.malformed_dropped += stats.malformed_dropped as u64;

        let mut phase_changed = false;
        if presence {
            let host_live = entry.state.host_live();
            if let Some(change) = entry.host.observe(host_live, now) {
                apply_phase_change(entry, change.to);
                phase_changed = true;
            }
        }
        entry.state.host_phase = entry.host.phase();

        if stats.changed() || phase_changed {
            self.record_change(&event.session_code, now);
        }
        Disposition::Applied
    }

    // ── Membership & queue ───────────────────────────────────────

    /// Install confirmed scopes and drain every held event, in original
    /// arrival order, back through classification.
    pub fn confirm_membership<I, S>(&mut self, scope_ids: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.membership.confirm(scope_ids);
        let scopes: Vec<String> = self.membership.confirmed().iter().cloned().collect();
        self.authorizer.set_scopes(scopes);

        let drained = self.queue.drain(now);
        self.counters.queue_timeouts += drained.expired as u64;
        for event in drained.events {
            self.apply_event(event, now);
        }
    }

    /// The queue's force-drain deadline, if armed.
    pub fn queue_deadline(&self) -> Option<DateTime<Utc>> {
        self.queue.deadline()
    }

    /// Force-drain after the deadline fires: pending events are applied
    /// even though scope membership never resolved, rather than lost.
    /// Items past the max age are discarded with a counter increment.
    pub fn force_drain_queue(&mut self, now: DateTime<Utc>) {
        let drained = self.queue.drain(now);
        self.counters.queue_timeouts += drained.expired as u64;
        for event in drained.events {
            match self.authorizer.classify(&event) {
                Classification::Reject => self.counters.rejected_scope += 1,
                // Accept and still-unresolved both apply: showing data
                // beats losing it once the deadline has passed.
                Classification::Accept | Classification::Queue => {
                    self.ingest(event, now);
                }
            }
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    /// 1 Hz tick: harden elapsed grace windows, advance live durations,
    /// and fire the queue deadline when it lapses.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.queue_deadline().is_some_and(|deadline| now >= deadline) {
            self.force_drain_queue(now);
        }

        let mut transitioned = Vec::new();
        for (code, entry) in &mut self.sessions {
            if let Some(change) = entry.host.poll_grace(now, &self.config) {
                apply_phase_change(entry, change.to);
                entry.state.host_phase = entry.host.phase();
                transitioned.push(code.clone());
            }
            entry.clock.tick(&mut entry.state);
        }
        for code in transitioned {
            self.record_change(&code, now);
        }
    }

    /// Staleness watchdog: force `Paused` for sessions where every
    /// producer has gone silent.
    pub fn watchdog(&mut self, now: DateTime<Utc>) {
        let mut transitioned = Vec::new();
        for (code, entry) in &mut self.sessions {
            if let Some(change) = entry.host.poll_staleness(now, &self.config) {
                apply_phase_change(entry, change.to);
                entry.state.host_phase = entry.host.phase();
                transitioned.push(code.clone());
            }
        }
        for code in transitioned {
            self.record_change(&code, now);
        }
    }

    // ── Session lifecycle ────────────────────────────────────────

    /// Full state wipe for one session: participants dropped, timers
    /// torn down, queued events cleared.
    pub fn end_session(&mut self, session_code: &str, now: DateTime<Utc>) {
        if self.sessions.remove(session_code).is_some() {
            self.counters.sessions_ended += 1;
            self.record_change(session_code, now);
        }
        self.queue.clear_session(session_code);
        self.membership.forget(session_code);
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn session(&self, session_code: &str) -> Option<&SessionState> {
        self.sessions.get(session_code).map(|entry| &entry.state)
    }

    /// All session states, sorted by code for deterministic output.
    pub fn sessions(&self) -> Vec<&SessionState> {
        let mut all: Vec<&SessionState> = self.sessions.values().map(|e| &e.state).collect();
        all.sort_by(|a, b| a.session_code.cmp(&b.session_code));
        all
    }

    pub fn host_phase(&self, session_code: &str) -> Option<HostPhase> {
        self.sessions.get(session_code).map(|e| e.host.phase())
    }

    pub fn roster(&self, session_code: &str) -> Option<Vec<RosterEntry>> {
        self.session(session_code)
            .map(|state| roster::roster(state, &self.config))
    }

    pub fn counters(&self) -> &ReconcilerCounters {
        &self.counters
    }

    pub fn scopes_resolved(&self) -> bool {
        self.authorizer.is_resolved()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn version(&self) -> StateVersion {
        self.version
    }

    /// Change entries newer than `version`. The log is sorted by
    /// version, so a binary partition finds the resume point.
    pub fn changes_since(&self, version: StateVersion) -> Vec<&StateChange> {
        let start = self.changes.partition_point(|c| c.version <= version);
        self.changes[start..].iter().collect()
    }

    /// Drop change entries at or below `version` once every client has
    /// polled past it. The version counter itself never rewinds.
    pub fn trim_changes_before(&mut self, version: StateVersion) {
        let end = self.changes.partition_point(|c| c.version <= version);
        self.changes.drain(..end);
    }

    fn record_change(&mut self, session_code: &str, now: DateTime<Utc>) {
        self.version += 1;
        self.changes.push(StateChange {
            version: self.version,
            session_code: session_code.to_string(),
            timestamp: now,
        });
        if self.changes.len() > CHANGE_LOG_CAP {
            let excess = self.changes.len() - CHANGE_LOG_CAP;
            self.changes.drain(..excess);
        }
    }
}

/// Pause/resume the duration clock to match a host phase transition.
fn apply_phase_change(entry: &mut SessionEntry, to: HostPhase) {
    match to {
        HostPhase::Paused => entry.clock.pause(),
        HostPhase::Present => entry.clock.resume(),
        HostPhase::Grace => {}
    }
}

// ─── Tests ────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeDelta;
    use proptest::prelude::*;
    use rollcall_core::types::{RawParticipant, SourceKind};

    #[derive(Debug, Clone)]
    struct Fact {
        participant: usize,
        live: bool,
        duration: Option<u64>,
        tardy: bool,
    }

    fn arb_fact() -> impl Strategy<Value = Fact> {
        (0usize..4, any::<bool>(), proptest::option::of(0u64..500), any::<bool>()).prop_map(
            |(participant, live, duration, tardy)| Fact {
                participant,
                live,
                duration,
                tardy,
            },
        )
    }

    fn event_from(fact: &Fact, seq: usize, base: DateTime<Utc>) -> AttendanceEvent {
        let raw = RawParticipant {
            name: format!("Person {}", fact.participant),
            participant_id: Some(format!("p-{}", fact.participant)),
            is_host: fact.participant == 0,
            is_live: Some(fact.live),
            has_left: Some(!fact.live),
            tardy: Some(fact.tardy),
            duration_secs: fact.duration,
            ..Default::default()
        };
        AttendanceEvent {
            event_id: format!("evt-{seq}"),
            source: SourceKind::Push,
            session_code: "abc".into(),
            scope_id: Some("course-1".into()),
            credentialed: true,
            observed_at: base + TimeDelta::seconds(seq as i64),
            payload: EventPayload::ParticipantChange {
                participants: vec![raw],
            },
        }
    }

    fn final_state(events: &[AttendanceEvent], now: DateTime<Utc>) -> SessionState {
        let mut r = Reconciler::new(EngineConfig::default());
        r.confirm_membership(["course-1"], now);
        for event in events {
            r.apply_event(event.clone(), now);
        }
        r.session("abc").cloned().unwrap_or_else(|| SessionState::new("abc", now))
    }

    /// Order-independent projection of a session. Departure timestamps
    /// and the host phase track arrival timing, so confluence is judged
    /// on everything else, matching "identical up to lastSeenAt".
    type Fingerprint = (
        Option<String>,
        Option<String>,
        DateTime<Utc>,
        Vec<(String, String, rollcall_core::types::Category, bool, bool, bool, Option<DateTime<Utc>>, u64)>,
    );

    fn fingerprint(state: &SessionState) -> Fingerprint {
        let mut rows: Vec<_> = state
            .participants
            .values()
            .map(|r| {
                (
                    r.identity_key.clone(),
                    r.display_name.clone(),
                    r.category,
                    r.is_live,
                    r.is_left,
                    r.tardy,
                    r.joined_at,
                    r.accumulated_secs,
                )
            })
            .collect();
        rows.sort();
        (
            Some(state.session_code.clone()),
            state.host_key.clone(),
            state.started_at,
            rows,
        )
    }

    proptest! {
        /// Confluence: any permutation of the same accepted facts yields
        /// the same final session state.
        #[test]
        fn merge_is_order_independent(
            facts in proptest::collection::vec(arb_fact(), 1..12),
            seed in any::<u64>(),
        ) {
            let base = Utc::now();
            let events: Vec<AttendanceEvent> = facts
                .iter()
                .enumerate()
                .map(|(i, f)| event_from(f, i, base))
                .collect();

            let reference = final_state(&events, base);

            // Cheap deterministic shuffle from the seed.
            let mut shuffled = events.clone();
            let mut s = seed;
            for i in (1..shuffled.len()).rev() {
                s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (s % (i as u64 + 1)) as usize;
                shuffled.swap(i, j);
            }

            let permuted = final_state(&shuffled, base);
            prop_assert_eq!(fingerprint(&reference), fingerprint(&permuted));
        }

        /// Idempotence: re-applying an already-merged event changes
        /// nothing observable.
        #[test]
        fn reapply_is_a_no_op(facts in proptest::collection::vec(arb_fact(), 1..8)) {
            let base = Utc::now();
            let events: Vec<AttendanceEvent> = facts
                .iter()
                .enumerate()
                .map(|(i, f)| event_from(f, i, base))
                .collect();

            let mut r = Reconciler::new(EngineConfig::default());
            r.confirm_membership(["course-1"], base);
            for event in &events {
                r.apply_event(event.clone(), base);
            }
            let before = r.session("abc").cloned();
            for event in &events {
                r.apply_event(event.clone(), base);
            }
            prop_assert_eq!(before, r.session("abc").cloned());
        }

        /// Durations never decrease across any sequence of merges and
        /// ticks.
        #[test]
        fn durations_are_monotonic(
            facts in proptest::collection::vec(arb_fact(), 1..10),
            tick_every in 1usize..4,
        ) {
            let base = Utc::now();
            let mut r = Reconciler::new(EngineConfig::default());
            r.confirm_membership(["course-1"], base);

            let mut high_water: std::collections::HashMap<String, u64> = Default::default();
            for (i, fact) in facts.iter().enumerate() {
                r.apply_event(event_from(fact, i, base), base);
                if i % tick_every == 0 {
                    r.tick(base + TimeDelta::seconds(i as i64));
                }
                if let Some(state) = r.session("abc") {
                    for (key, record) in &state.participants {
                        let prev = high_water.entry(key.clone()).or_insert(0);
                        prop_assert!(record.accumulated_secs >= *prev);
                        *prev = record.accumulated_secs;
                    }
                }
            }
        }
    }
}
