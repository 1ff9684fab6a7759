//! Named tunable constants for the reconciliation engine.
//!
//! The grace/staleness/tie-break durations are empirically chosen values
//! carried over from production observation; they live here as named
//! fields rather than inline literals so deployments can tune them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long the host may be unobserved before `Grace` hardens into
    /// `Paused`. Absorbs transient gaps between three independently
    /// timed producers.
    pub grace_window_secs: u64,
    /// Total-silence threshold: if no presence-carrying event arrives
    /// for this long, the watchdog forces `Paused`.
    pub stale_after_secs: u64,
    /// Interval at which the staleness watchdog runs.
    pub watchdog_interval_secs: u64,
    /// Interval of the display-smoothing duration tick.
    pub tick_interval_ms: u64,
    /// Interval at which the bridge store is re-read.
    pub bridge_interval_ms: u64,
    /// Interval of the fallback periodic pull.
    pub pull_interval_ms: u64,
    /// Hard cap on pending (unauthorized) events; oldest evicted first.
    pub queue_capacity: usize,
    /// Force-drain deadline armed on first enqueue.
    pub queue_drain_timeout_secs: u64,
    /// Absolute max age of a queued item at drain time.
    pub queue_max_age_secs: u64,
    /// A participant departing within this window of the host's own
    /// departure (or after it) counts as present for the session.
    pub departure_tie_break_secs: u64,
    /// Minimum shared normalized prefix length before the
    /// first-two-token similarity rule applies.
    pub similarity_min_prefix: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_window_secs: 5,
            stale_after_secs: 30,
            watchdog_interval_secs: 10,
            tick_interval_ms: 1_000,
            bridge_interval_ms: 1_000,
            pull_interval_ms: 2_000,
            queue_capacity: 256,
            queue_drain_timeout_secs: 10,
            queue_max_age_secs: 30,
            departure_tie_break_secs: 300,
            similarity_min_prefix: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_grace_shorter_than_staleness() {
        let cfg = EngineConfig::default();
        assert!(cfg.grace_window_secs < cfg.stale_after_secs);
        assert!(cfg.watchdog_interval_secs <= cfg.stale_after_secs);
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: EngineConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, back);
    }
}
