//! Scope membership lifecycle: which logical session channels the client
//! has asked to join, and which the server has confirmed.
//!
//! Confirmation is the moment the update queue drains: the reconciler
//! routes the confirmed scope set into the authorizer and replays held
//! events.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct MembershipManager {
    /// Channels we have seen traffic for and want membership in.
    requested: HashSet<String>,
    /// Scope ids the server has confirmed.
    confirmed: HashSet<String>,
    resolved: bool,
}

impl MembershipManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note interest in a session channel. Returns true the first time.
    pub fn request(&mut self, session_code: &str) -> bool {
        self.requested.insert(session_code.to_string())
    }

    /// Record a membership confirmation. Returns the scope ids that are
    /// newly confirmed by this call.
    pub fn confirm<I, S>(&mut self, scope_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolved = true;
        let mut newly = Vec::new();
        for scope in scope_ids {
            let scope = scope.into();
            if self.confirmed.insert(scope.clone()) {
                newly.push(scope);
            }
        }
        newly
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn confirmed(&self) -> &HashSet<String> {
        &self.confirmed
    }

    pub fn requested(&self) -> &HashSet<String> {
        &self.requested
    }

    /// Session reset: forget interest in one channel. Confirmed scopes
    /// stay; authorization is per-viewer, not per-meeting.
    pub fn forget(&mut self, session_code: &str) {
        self.requested.remove(session_code);
    }
}
