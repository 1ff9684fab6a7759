//! Update queue: holds events that cannot be authorized or routed yet.
//!
//! A single drain deadline (not one timer per item) is armed on the first
//! enqueue; the runtime owns the actual timer and calls back in. Capacity
//! is bounded with FIFO eviction, and items past an absolute max age are
//! discarded at drain time.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::AttendanceEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event: AttendanceEvent,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of one enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// True when this enqueue armed the drain deadline (queue was empty).
    pub armed_deadline: bool,
    /// Oldest entries dropped to stay within capacity.
    pub evicted: usize,
}

/// Result of a drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainResult {
    /// Events still within max age, in original arrival order.
    pub events: Vec<AttendanceEvent>,
    /// Items discarded for exceeding the max age.
    pub expired: usize,
}

#[derive(Debug, Clone)]
pub struct UpdateQueue {
    items: VecDeque<QueuedEvent>,
    capacity: usize,
    max_age: TimeDelta,
    drain_timeout: TimeDelta,
    deadline: Option<DateTime<Utc>>,
}

impl UpdateQueue {
    pub fn new(capacity: usize, max_age_secs: u64, drain_timeout_secs: u64) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            max_age: TimeDelta::seconds(max_age_secs as i64),
            drain_timeout: TimeDelta::seconds(drain_timeout_secs as i64),
            deadline: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The force-drain deadline, if one is armed.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Append an event, evicting from the front if over capacity.
    pub fn enqueue(&mut self, event: AttendanceEvent, now: DateTime<Utc>) -> EnqueueOutcome {
        let armed_deadline = if self.deadline.is_none() {
            self.deadline = Some(now + self.drain_timeout);
            true
        } else {
            false
        };

        self.items.push_back(QueuedEvent {
            event,
            enqueued_at: now,
        });

        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }

        EnqueueOutcome {
            armed_deadline,
            evicted,
        }
    }

    /// Drain everything, dropping items older than the max age. Clears
    /// the deadline; the next enqueue arms a fresh one.
    pub fn drain(&mut self, now: DateTime<Utc>) -> DrainResult {
        self.deadline = None;
        let mut result = DrainResult::default();
        for item in self.items.drain(..) {
            if now.signed_duration_since(item.enqueued_at) > self.max_age {
                result.expired += 1;
            } else {
                result.events.push(item.event);
            }
        }
        result
    }

    /// Drop queued events for one session (session reset).
    pub fn clear_session(&mut self, session_code: &str) {
        self.items
            .retain(|item| item.event.session_code != session_code);
        if self.items.is_empty() {
            self.deadline = None;
        }
    }
}
