//! rollcall-source-push: adapter for the realtime push channel.
//! Normalizes server-pushed frames into `AttendanceEvent`s.

pub mod source;
pub mod translate;

pub use rollcall_core::types;
