//! Duration tracking: the authoritative per-participant elapsed-time
//! counter.
//!
//! A 1 Hz tick advances live participants purely for smooth display
//! between authoritative updates; any externally reported duration
//! overrides the local count on the next merge. Counters never decrement:
//! a producer disconnect must not roll a participant's time back.

use crate::types::SessionState;

/// Reconcile a locally ticked count with an externally reported one.
///
/// The external source is authoritative, but the monotonic invariant wins
/// when the report trails the local smoothing tick by a second or two.
pub fn reconcile(current: u64, reported: u64) -> u64 {
    current.max(reported)
}

/// Pause-aware tick state for one session. Paused/resumed by the host
/// presence tracker; while paused, `tick` is a no-op and every
/// participant's count freezes at its current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationClock {
    paused: bool,
}

impl DurationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Advance every live, not-departed participant by one second.
    /// Returns how many counters advanced.
    pub fn tick(&self, state: &mut SessionState) -> usize {
        if self.paused {
            return 0;
        }
        let mut advanced = 0;
        for record in state.participants.values_mut() {
            if record.is_live && !record.is_left {
                record.accumulated_secs = record.accumulated_secs.saturating_add(1);
                advanced += 1;
            }
        }
        advanced
    }
}
