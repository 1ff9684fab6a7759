//! Scope authorization: decides whether an incoming event belongs to the
//! viewer's authorized session set.
//!
//! Pure classification over current authorizer state; enqueueing and
//! dropping are the caller's job.

use std::collections::HashSet;

use crate::types::AttendanceEvent;

/// Disposition of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Route to the merge engine.
    Accept,
    /// Hold until the authorized-scope set resolves.
    Queue,
    /// Another viewer's session; dropped silently.
    Reject,
}

/// Holds the authorized-scope set once membership resolves.
#[derive(Debug, Clone, Default)]
pub struct ScopeAuthorizer {
    authorized: Option<HashSet<String>>,
}

impl ScopeAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the authorized set has been loaded yet.
    pub fn is_resolved(&self) -> bool {
        self.authorized.is_some()
    }

    /// Install the resolved scope set. Replaces any previous set.
    pub fn set_scopes<I, S>(&mut self, scope_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized = Some(scope_ids.into_iter().map(Into::into).collect());
    }

    /// Classify one event against the current authorized set.
    ///
    /// Uncredentialed events are accepted unconditionally: they are
    /// always shown, just flagged untrusted downstream. Credentialed
    /// events queue during cold start, then accept/reject by scope
    /// membership. A credentialed event with no declared scope accepts
    /// once the set is resolved; the upstream subscription is already
    /// scoped, so there is nothing to compare.
    pub fn classify(&self, event: &AttendanceEvent) -> Classification {
        if !event.credentialed {
            return Classification::Accept;
        }
        let Some(authorized) = &self.authorized else {
            return Classification::Queue;
        };
        match event.scope_id.as_deref() {
            None => Classification::Accept,
            Some(scope) if authorized.contains(scope) => Classification::Accept,
            Some(_) => Classification::Reject,
        }
    }
}
