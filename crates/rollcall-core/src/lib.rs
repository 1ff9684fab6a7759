//! rollcall-core: pure reconciliation logic for live attendance tracking.
//!
//! Everything in this crate is deterministic and IO-free. Wall-clock time is
//! always passed in as a `DateTime<Utc>` parameter so tests can drive
//! virtual time.

pub mod config;
pub mod duration;
pub mod host_presence;
pub mod identity;
pub mod merge;
pub mod queue;
pub mod scope;
pub mod types;
