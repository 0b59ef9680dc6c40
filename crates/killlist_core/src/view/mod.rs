//! UI-facing projections over the contract store.
//!
//! # Responsibility
//! - Keep a responsive in-memory copy of store state for rendering.
//! - Reconcile optimistic edits with persistence outcomes.

pub mod projection;
