//! End-to-end reconciliation scenarios: three producers, one pipeline.
//!
//! Virtual time is driven by hand; every timer callback the runtime
//! would issue (`tick`, `watchdog`) is invoked explicitly.

use chrono::{DateTime, TimeDelta, Utc};

use rollcall_core::config::EngineConfig;
use rollcall_core::types::{
    AttendanceEvent, DisplayStatus, EventPayload, HostPhase, RawParticipant, SourceKind,
};
use rollcall_engine::reconciler::{Disposition, Reconciler};

const SESSION: &str = "abc-defg-hij";
const SCOPE: &str = "course-1";

fn participant(name: &str, id: &str, host: bool) -> RawParticipant {
    RawParticipant {
        name: name.into(),
        participant_id: Some(id.into()),
        is_host: host,
        ..Default::default()
    }
}

fn departed(name: &str, id: &str, host: bool, left_at: DateTime<Utc>) -> RawParticipant {
    RawParticipant {
        name: name.into(),
        participant_id: Some(id.into()),
        is_host: host,
        is_live: Some(false),
        has_left: Some(true),
        left_at: Some(left_at),
        ..Default::default()
    }
}

fn snapshot(
    source: SourceKind,
    participants: Vec<RawParticipant>,
    observed_at: DateTime<Utc>,
) -> AttendanceEvent {
    AttendanceEvent {
        event_id: format!("{source}-{}", observed_at.timestamp_millis()),
        source,
        session_code: SESSION.into(),
        scope_id: Some(SCOPE.into()),
        credentialed: true,
        observed_at,
        payload: EventPayload::ProgressSnapshot {
            participants,
            host_lock: None,
        },
    }
}

fn ready_reconciler(now: DateTime<Utc>) -> Reconciler {
    let mut r = Reconciler::new(EngineConfig::default());
    r.confirm_membership([SCOPE], now);
    r
}

/// Host joins at T0, participant A at T0+5s; the push channel lags, the
/// bridge delivers A at T0+6s and the poll duplicates A at T0+8s.
/// Exactly one record for A, with roughly three seconds accumulated by
/// T0+9s.
#[test]
fn lagging_producers_and_duplicates_yield_one_record() {
    let t0 = Utc::now();
    let mut r = ready_reconciler(t0);

    r.apply_event(
        snapshot(SourceKind::Push, vec![participant("Dana Cole", "host-1", true)], t0),
        t0,
    );

    let a_joined = t0 + TimeDelta::seconds(5);
    let bridge_sees_a = t0 + TimeDelta::seconds(6);
    let mut a = participant("Avery Kim", "p-a", false);
    a.joined_at = Some(a_joined);
    r.apply_event(
        snapshot(
            SourceKind::Bridge,
            vec![participant("Dana Cole", "host-1", true), a.clone()],
            bridge_sees_a,
        ),
        bridge_sees_a,
    );

    // Drive the 1 Hz duration tick from T0+6s up to T0+9s.
    for s in 7..=9 {
        let now = t0 + TimeDelta::seconds(s);
        if s == 8 {
            // Poll delivers a duplicate of A.
            r.apply_event(
                snapshot(
                    SourceKind::Poll,
                    vec![participant("Dana Cole", "host-1", true), a.clone()],
                    now,
                ),
                now,
            );
        }
        r.tick(now);
    }

    let state = r.session(SESSION).expect("session tracked");
    assert_eq!(state.participants.len(), 2, "A must not be duplicated");
    let record = &state.participants["p-a"];
    assert_eq!(record.joined_at, Some(a_joined));
    assert!(
        (2..=4).contains(&record.accumulated_secs),
        "expected ~3s accumulated, got {}",
        record.accumulated_secs
    );
}

/// Host disconnects for 3 s then reconnects (grace window 5 s): the
/// phase never reaches `Paused` and durations keep advancing.
#[test]
fn short_host_disconnect_stays_within_grace() {
    let t0 = Utc::now();
    let mut r = ready_reconciler(t0);
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![
                participant("Dana Cole", "host-1", true),
                participant("Avery Kim", "p-a", false),
            ],
            t0,
        ),
        t0,
    );

    let drop_at = t0 + TimeDelta::seconds(10);
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![
                departed("Dana Cole", "host-1", true, drop_at),
                participant("Avery Kim", "p-a", false),
            ],
            drop_at,
        ),
        drop_at,
    );
    assert_eq!(r.host_phase(SESSION), Some(HostPhase::Grace));

    let before = r.session(SESSION).unwrap().participants["p-a"].accumulated_secs;
    for s in 1..=3 {
        r.tick(drop_at + TimeDelta::seconds(s));
        assert_ne!(r.host_phase(SESSION), Some(HostPhase::Paused));
    }

    let back_at = drop_at + TimeDelta::seconds(3);
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![
                participant("Dana Cole", "host-1", true),
                participant("Avery Kim", "p-a", false),
            ],
            back_at,
        ),
        back_at,
    );
    assert_eq!(r.host_phase(SESSION), Some(HostPhase::Present));

    let after = r.session(SESSION).unwrap().participants["p-a"].accumulated_secs;
    assert_eq!(after, before + 3, "durations keep advancing through grace");
}

/// Host disconnects with no signal at all for 40 s: the watchdog forces
/// `Paused` at the 30 s threshold and durations freeze until a host
/// returns.
#[test]
fn total_silence_trips_the_watchdog_and_freezes_durations() {
    let t0 = Utc::now();
    let mut r = ready_reconciler(t0);
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![
                participant("Dana Cole", "host-1", true),
                participant("Avery Kim", "p-a", false),
            ],
            t0,
        ),
        t0,
    );

    // The watchdog runs every 10 s; nothing else arrives.
    r.watchdog(t0 + TimeDelta::seconds(10));
    r.watchdog(t0 + TimeDelta::seconds(20));
    assert_eq!(r.host_phase(SESSION), Some(HostPhase::Present));
    r.watchdog(t0 + TimeDelta::seconds(30));
    assert_eq!(r.host_phase(SESSION), Some(HostPhase::Paused));

    let frozen = r.session(SESSION).unwrap().participants["p-a"].accumulated_secs;
    for s in 31..=40 {
        r.tick(t0 + TimeDelta::seconds(s));
    }
    assert_eq!(
        r.session(SESSION).unwrap().participants["p-a"].accumulated_secs,
        frozen
    );

    // Host comes back: immediate resume.
    let back = t0 + TimeDelta::seconds(41);
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![
                participant("Dana Cole", "host-1", true),
                participant("Avery Kim", "p-a", false),
            ],
            back,
        ),
        back,
    );
    assert_eq!(r.host_phase(SESSION), Some(HostPhase::Present));
    r.tick(back + TimeDelta::seconds(1));
    assert!(
        r.session(SESSION).unwrap().participants["p-a"].accumulated_secs > frozen
    );
}

/// An event arrives before the authorized-scope set loads; the set
/// resolves two seconds later and the queued event is applied, not lost.
#[test]
fn cold_start_event_survives_in_the_queue() {
    let t0 = Utc::now();
    let mut r = Reconciler::new(EngineConfig::default());

    let d = r.apply_event(
        snapshot(SourceKind::Push, vec![participant("Dana Cole", "host-1", true)], t0),
        t0,
    );
    assert_eq!(d, Disposition::Queued);
    assert!(r.session(SESSION).is_none());

    r.confirm_membership([SCOPE], t0 + TimeDelta::seconds(2));
    let state = r.session(SESSION).expect("queued event applied on drain");
    assert_eq!(state.participants.len(), 1);
    assert_eq!(r.counters().queue_timeouts, 0);
}

/// Mid-session rename with no stable id on either event maps both names
/// onto the same record.
#[test]
fn name_drift_resolves_to_one_identity() {
    let t0 = Utc::now();
    let mut r = ready_reconciler(t0);

    let before = RawParticipant {
        name: "Jordan A. Cruz".into(),
        ..Default::default()
    };
    r.apply_event(snapshot(SourceKind::Push, vec![before], t0), t0);

    let after = RawParticipant {
        name: "Jordan A. Cruzdan".into(),
        ..Default::default()
    };
    let t1 = t0 + TimeDelta::seconds(90);
    r.apply_event(snapshot(SourceKind::Bridge, vec![after], t1), t1);

    let state = r.session(SESSION).unwrap();
    assert_eq!(state.participants.len(), 1);
    assert_eq!(
        state.participants.values().next().unwrap().display_name,
        "Jordan A. Cruz"
    );
}

/// Departure disposition: pending while the host remains, then settled
/// by the tie-break window once the host leaves too.
#[test]
fn departures_settle_when_the_host_leaves() {
    let t0 = Utc::now();
    let mut r = ready_reconciler(t0);
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![
                participant("Dana Cole", "host-1", true),
                participant("Avery Kim", "p-a", false),
                participant("Riley Park", "p-b", false),
            ],
            t0,
        ),
        t0,
    );

    // A leaves early, B leaves two minutes before the host.
    let a_leaves = t0 + TimeDelta::seconds(60);
    let b_leaves = t0 + TimeDelta::seconds(3_000);
    let host_leaves = t0 + TimeDelta::seconds(3_120);

    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![departed("Avery Kim", "p-a", false, a_leaves)],
            a_leaves,
        ),
        a_leaves,
    );

    let roster = r.roster(SESSION).unwrap();
    let a_row = roster.iter().find(|e| e.identity_key == "p-a").unwrap();
    assert_eq!(a_row.status, DisplayStatus::Pending);

    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![departed("Riley Park", "p-b", false, b_leaves)],
            b_leaves,
        ),
        b_leaves,
    );
    r.apply_event(
        snapshot(
            SourceKind::Push,
            vec![departed("Dana Cole", "host-1", true, host_leaves)],
            host_leaves,
        ),
        host_leaves,
    );

    let roster = r.roster(SESSION).unwrap();
    let status_of = |key: &str| {
        roster
            .iter()
            .find(|e| e.identity_key == key)
            .map(|e| e.status)
            .unwrap()
    };
    // B left within the tie-break window of the host: counted present.
    assert_eq!(status_of("p-b"), DisplayStatus::Present);
    // A left far earlier: early departure.
    assert_eq!(status_of("p-a"), DisplayStatus::Left);
}
