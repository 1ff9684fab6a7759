//! Stateful poll driver: sequence stamping plus an in-flight guard so a
//! slow upstream never stacks overlapping requests.

use chrono::{DateTime, Utc};

use rollcall_core::types::{AttendanceEvent, RollcallError};

use crate::translate::{self, PullResponse};

#[derive(Debug, Clone, Default)]
pub struct PollSource {
    seq: u64,
    in_flight: bool,
    overlaps_skipped: u64,
    malformed: u64,
}

impl PollSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the poll slot. Returns false while a previous request is
    /// still outstanding; the caller skips this cycle.
    pub fn begin(&mut self) -> bool {
        if self.in_flight {
            self.overlaps_skipped += 1;
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Release the poll slot, with or without a response.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    /// Parse and translate one raw pull response body.
    pub fn accept_response(
        &mut self,
        body: &str,
        polled_at: DateTime<Utc>,
    ) -> Result<Vec<AttendanceEvent>, RollcallError> {
        let response: PullResponse = serde_json::from_str(body).map_err(|err| {
            self.malformed += 1;
            RollcallError::InvalidPayload(err.to_string())
        })?;
        let events = translate::translate(&response, self.seq, polled_at);
        self.seq += 1;
        Ok(events)
    }

    pub fn overlaps_skipped(&self) -> u64 {
        self.overlaps_skipped
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }
}
