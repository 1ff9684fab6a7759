//! rollcall-source-bridge: adapter for the file-relay side channel.
//! A companion process drops presence snapshots into a shared store;
//! this crate re-reads it on an interval, deduplicates unchanged
//! contents, and normalizes what remains into `AttendanceEvent`s.
//!
//! Everything from this channel is uncredentialed: the relay has no
//! scope credentials, so its records are flagged untrusted downstream.

pub mod source;
pub mod translate;

pub use rollcall_core::types;
