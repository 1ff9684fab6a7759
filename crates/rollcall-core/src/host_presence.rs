//! Host presence state machine with grace-window debounce.
//!
//! `Present → Grace` the instant a merged batch leaves the session with no
//! live host; `Grace → Paused` only after the grace window elapses with no
//! host confirmation; any host-live observation snaps back to `Present`
//! immediately. A separate staleness check forces `Paused` when every
//! producer has gone silent, which "host absent" signals alone cannot
//! detect.
//!
//! Pure and deterministic: all time values are parameters.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::EngineConfig;
use crate::types::HostPhase;

/// A confirmed phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: HostPhase,
    pub to: HostPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPresenceTracker {
    phase: HostPhase,
    /// When the current grace window opened.
    grace_since: Option<DateTime<Utc>>,
    /// Newest presence-carrying event for this session.
    last_presence_at: DateTime<Utc>,
    /// Whether a host has ever been observed live. Sessions that never
    /// had a host do not enter grace on hostless batches.
    host_ever_seen: bool,
}

impl HostPresenceTracker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: HostPhase::Present,
            grace_since: None,
            last_presence_at: now,
            host_ever_seen: false,
        }
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.phase == HostPhase::Paused
    }

    /// Fold in the host-liveness outcome of one merged event batch.
    ///
    /// Host live: immediate snap to `Present` from either `Grace` or
    /// `Paused`, resetting the grace timer. Host absent: `Present → Grace`
    /// right away; an already-open grace window keeps its original start
    /// so alternating absence signals cannot postpone the pause forever.
    pub fn observe(&mut self, host_live: bool, now: DateTime<Utc>) -> Option<PhaseChange> {
        self.last_presence_at = now;
        if host_live {
            self.host_ever_seen = true;
            self.grace_since = None;
            return self.transition(HostPhase::Present);
        }
        if !self.host_ever_seen {
            return None;
        }
        if self.phase == HostPhase::Present {
            self.grace_since = Some(now);
            return self.transition(HostPhase::Grace);
        }
        None
    }

    /// Timer callback: harden `Grace` into `Paused` once the window has
    /// fully elapsed.
    pub fn poll_grace(&mut self, now: DateTime<Utc>, config: &EngineConfig) -> Option<PhaseChange> {
        if self.phase != HostPhase::Grace {
            return None;
        }
        let since = self.grace_since?;
        if now.signed_duration_since(since) >= TimeDelta::seconds(config.grace_window_secs as i64) {
            self.grace_since = None;
            return self.transition(HostPhase::Paused);
        }
        None
    }

    /// Watchdog callback: force `Paused` when no presence data of any
    /// kind has arrived within the staleness threshold.
    pub fn poll_staleness(
        &mut self,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Option<PhaseChange> {
        if self.phase == HostPhase::Paused {
            return None;
        }
        let silent =
            now.signed_duration_since(self.last_presence_at)
                >= TimeDelta::seconds(config.stale_after_secs as i64);
        if silent {
            self.grace_since = None;
            return self.transition(HostPhase::Paused);
        }
        None
    }

    fn transition(&mut self, to: HostPhase) -> Option<PhaseChange> {
        if self.phase == to {
            return None;
        }
        let change = PhaseChange {
            from: self.phase,
            to,
        };
        self.phase = to;
        Some(change)
    }
}
