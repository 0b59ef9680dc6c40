//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define storage contracts for contracts and settings.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes must enforce record validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod contract_repo;
