//! Domain model for contracts and installation settings.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep record-level invariants next to the records that own them.
//!
//! # Invariants
//! - Every contract is identified by a stable `ContractId`.
//! - Settings exist exactly once per installation.

pub mod contract;
pub mod settings;
