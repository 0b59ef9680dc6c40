//! Contract domain model.
//!
//! # Responsibility
//! - Define the canonical contract record tracked by the kill list.
//! - Own record-level validation.
//!
//! # Invariants
//! - `id` is stable and never reused for another contract.
//! - `completed_at` is set if and only if `status == Completed`.
//! - `deadline_at` and `created_at` are fixed at creation.
//! - `title` is stored exactly as entered; only blank titles are rejected.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every contract.
pub type ContractId = Uuid;

/// Urgency tag. Cosmetic only; never consulted by lifecycle logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    #[default]
    Normal,
    HighTable,
}

/// Persisted lifecycle state. `Completed` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Completed,
    Failed,
}

impl ContractStatus {
    /// Returns whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Validation errors for contract records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractValidationError {
    EmptyTitle,
    DeadlineOutOfRange(i64),
    CompletedAtMismatch(ContractStatus),
}

impl Display for ContractValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "contract title cannot be empty"),
            Self::DeadlineOutOfRange(value) => {
                write!(f, "deadline `{value}` is not a representable timestamp")
            }
            Self::CompletedAtMismatch(status) => write!(
                f,
                "completed_at must be set exactly when status is completed (status: {status:?})"
            ),
        }
    }
}

impl Error for ContractValidationError {}

/// Canonical contract record.
///
/// All timestamps are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    pub title: String,
    pub deadline_at: i64,
    pub priority: Priority,
    pub status: ContractStatus,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl Contract {
    /// Creates a new active contract with a generated stable ID.
    ///
    /// # Errors
    /// - Returns `EmptyTitle` when the title is blank after trimming.
    /// - Returns `DeadlineOutOfRange` when `deadline_at` cannot be represented
    ///   as a calendar date.
    pub fn new(
        title: &str,
        deadline_at: i64,
        priority: Priority,
        created_at: i64,
    ) -> Result<Self, ContractValidationError> {
        Self::with_id(Uuid::new_v4(), title, deadline_at, priority, created_at)
    }

    /// Creates a new active contract with a caller-provided stable ID.
    pub fn with_id(
        id: ContractId,
        title: &str,
        deadline_at: i64,
        priority: Priority,
        created_at: i64,
    ) -> Result<Self, ContractValidationError> {
        let contract = Self {
            id,
            title: title.to_string(),
            deadline_at,
            priority,
            status: ContractStatus::Active,
            created_at,
            completed_at: None,
        };
        contract.validate()?;
        Ok(contract)
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), ContractValidationError> {
        if self.title.trim().is_empty() {
            return Err(ContractValidationError::EmptyTitle);
        }
        if DateTime::from_timestamp_millis(self.deadline_at).is_none() {
            return Err(ContractValidationError::DeadlineOutOfRange(self.deadline_at));
        }
        let completed = self.status == ContractStatus::Completed;
        if completed != self.completed_at.is_some() {
            return Err(ContractValidationError::CompletedAtMismatch(self.status));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    /// Time used to order the archive: completion time, else the deadline.
    pub fn terminal_time(&self) -> i64 {
        self.completed_at.unwrap_or(self.deadline_at)
    }

    /// Moves an active contract to `Completed`.
    ///
    /// Returns `false` and leaves the record untouched when it is not active.
    pub fn mark_completed(&mut self, completed_at: i64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = ContractStatus::Completed;
        self.completed_at = Some(completed_at);
        true
    }

    /// Moves an active contract to `Failed`.
    ///
    /// Returns `false` and leaves the record untouched when it is not active.
    pub fn mark_failed(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = ContractStatus::Failed;
        true
    }
}
