//! rollcall-engine: the per-session reconciliation actor.
//!
//! Folds classified events from all three producers through the
//! `classify → merge → track` pipeline, owns every per-session timer
//! state, and exposes the reconciled map plus a derived roster view.

pub mod membership;
pub mod reconciler;
pub mod roster;
