//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep UI/bridge layers decoupled from storage details.

pub mod contract_service;
