//! Derived contract status.
//!
//! Every display and persistence site goes through [`phase`] (or the
//! predicates it is built from), so boundary semantics are applied once.

use crate::model::contract::{Contract, ContractStatus};
use serde::Serialize;

/// Display-level lifecycle phase derived from a contract and "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum ContractPhase {
    /// Active; deadline not yet passed.
    Pending,
    /// Active; deadline passed, grace still running.
    Excommunicado { remaining_ms: i64 },
    /// Active in storage, but grace has run out. Derived failure that has not
    /// been persisted yet.
    Expired,
    Completed,
    /// Failure persisted through an explicit `fail` call.
    Failed,
}

impl ContractPhase {
    /// Whether the contract should be rendered as failed.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Expired | Self::Failed)
    }
}

/// True iff the contract is active and `now` is strictly past its deadline.
pub fn is_overdue(contract: &Contract, now_ms: i64) -> bool {
    contract.status == ContractStatus::Active && now_ms > contract.deadline_at
}

/// Remaining grace in ms. The full duration when not overdue, else
/// `max(0, deadline + duration - now)`.
pub fn remaining_grace_ms(contract: &Contract, now_ms: i64, duration_ms: i64) -> i64 {
    if !is_overdue(contract, now_ms) {
        return duration_ms;
    }
    let grace_end = contract.deadline_at.saturating_add(duration_ms);
    grace_end.saturating_sub(now_ms).max(0)
}

/// True iff overdue and the grace period has fully elapsed.
pub fn has_failed(contract: &Contract, now_ms: i64, duration_ms: i64) -> bool {
    is_overdue(contract, now_ms) && remaining_grace_ms(contract, now_ms, duration_ms) == 0
}

/// Global excommunicado flag: any active contract is overdue.
pub fn has_overdue_contracts(contracts: &[Contract], now_ms: i64) -> bool {
    contracts
        .iter()
        .any(|contract| is_overdue(contract, now_ms))
}

pub fn phase(contract: &Contract, now_ms: i64, duration_ms: i64) -> ContractPhase {
    match contract.status {
        ContractStatus::Completed => ContractPhase::Completed,
        ContractStatus::Failed => ContractPhase::Failed,
        ContractStatus::Active => {
            if !is_overdue(contract, now_ms) {
                return ContractPhase::Pending;
            }
            match remaining_grace_ms(contract, now_ms, duration_ms) {
                0 => ContractPhase::Expired,
                remaining_ms => ContractPhase::Excommunicado { remaining_ms },
            }
        }
    }
}
