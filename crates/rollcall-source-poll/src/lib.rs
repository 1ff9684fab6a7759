//! rollcall-source-poll: adapter for the periodic pull channel.
//! Queries the upstream service for full presence snapshots on an
//! interval and normalizes each active session into an
//! `AttendanceEvent`.

pub mod source;
pub mod translate;

pub use rollcall_core::types;
