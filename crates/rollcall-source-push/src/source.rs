//! Stateful push-frame reader: line-delimited JSON in, normalized
//! events out.

use chrono::{DateTime, Utc};

use rollcall_core::types::{AttendanceEvent, RollcallError};

use crate::translate::{self, PushFrame};

/// Sequence-stamping reader for the push channel. The daemon owns a
/// single instance shared across connections, so event ids stay unique
/// for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct PushSource {
    seq: u64,
    malformed: u64,
}

impl PushSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and translate one newline-delimited frame.
    pub fn accept_line(
        &mut self,
        line: &str,
        received_at: DateTime<Utc>,
    ) -> Result<AttendanceEvent, RollcallError> {
        let frame: PushFrame = serde_json::from_str(line).map_err(|err| {
            self.malformed += 1;
            RollcallError::InvalidPayload(err.to_string())
        })?;
        let event = translate::translate(&frame, self.seq, received_at).inspect_err(|_| {
            self.malformed += 1;
        })?;
        self.seq += 1;
        Ok(event)
    }

    /// Frames that failed to parse or translate since construction.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }
}
