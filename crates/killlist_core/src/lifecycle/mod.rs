//! Time-based contract lifecycle derivation.
//!
//! # Responsibility
//! - Derive overdue/grace/failed state from stored timestamps.
//! - Format countdowns and deadlines for display.
//! - Re-evaluate the global alarm on each poll without touching storage.
//!
//! # Invariants
//! - All functions take "now" explicitly; none read the wall clock directly.
//! - `now == deadline_at` is not overdue; zero remaining grace is failed.

pub mod clock;
pub mod format;
pub mod monitor;
pub mod status;
