//! Contract use-case service.
//!
//! # Responsibility
//! - Provide the contract lifecycle operations the app calls directly.
//! - Stamp times from the injected clock and play feedback cues.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.
//! - Feedback is played only after the store accepted the change.

use crate::feedback::{self, FeedbackSink, NoopFeedback};
use crate::lifecycle::clock::{Clock, SystemClock};
use crate::lifecycle::status::has_failed;
use crate::model::contract::{Contract, ContractId, ContractStatus, Priority};
use crate::model::settings::{Settings, SettingsPatch};
use crate::repo::contract_repo::{
    ContractListQuery, ContractOrder, ContractRepository, RepoError, RepoResult, StatusFilter,
};
use log::{info, warn};

/// Use-case facade over a contract repository.
pub struct ContractService<R: ContractRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
    feedback: Box<dyn FeedbackSink>,
}

impl<R: ContractRepository> ContractService<R, SystemClock> {
    /// Creates a service on the wall clock with no feedback output.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: ContractRepository, C: Clock> ContractService<R, C> {
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            feedback: Box::new(NoopFeedback),
        }
    }

    /// Routes cues to `sink`. Sink failures are swallowed.
    pub fn with_feedback(mut self, sink: impl FeedbackSink + 'static) -> Self {
        self.feedback = Box::new(sink);
        self
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Creates and persists a new active contract.
    ///
    /// # Contract
    /// - Title is normalized and must be non-empty.
    /// - Past deadlines are accepted; the contract starts inside its grace window.
    pub fn create(
        &self,
        title: &str,
        deadline_at: i64,
        priority: Priority,
    ) -> RepoResult<Contract> {
        let contract = Contract::new(title, deadline_at, priority, self.clock.now_ms())?;
        self.insert(&contract)?;
        feedback::emit_all(self.feedback.as_ref(), feedback::CREATE_CUES);
        Ok(contract)
    }

    /// Persists a contract built by the caller (optimistic view path).
    pub fn insert(&self, contract: &Contract) -> RepoResult<()> {
        self.repo.insert_contract(contract)?;
        info!(
            "event=contract_create module=service status=ok contract_id={} priority={:?}",
            contract.id, contract.priority
        );
        Ok(())
    }

    pub fn get(&self, id: ContractId) -> RepoResult<Option<Contract>> {
        self.repo.get_contract(id)
    }

    /// Active contracts, soonest deadline first.
    pub fn list_active(&self) -> RepoResult<Vec<Contract>> {
        self.repo.list_contracts(&ContractListQuery {
            status: StatusFilter::Is(ContractStatus::Active),
            order: ContractOrder::DeadlineAsc,
        })
    }

    /// Completed and failed contracts, most recent outcome first.
    pub fn list_archived(&self) -> RepoResult<Vec<Contract>> {
        self.repo.list_contracts(&ContractListQuery {
            status: StatusFilter::Archived,
            order: ContractOrder::TerminalTimeDesc,
        })
    }

    /// Completes an active contract now and bumps the vault.
    ///
    /// Returns `NotFound` when the contract is missing or already terminal.
    pub fn complete(&self, id: ContractId) -> RepoResult<Contract> {
        let contract = self.complete_at(id, self.clock.now_ms())?;
        feedback::emit_all(self.feedback.as_ref(), feedback::COMPLETE_CUES);
        Ok(contract)
    }

    /// Completes an active contract with a caller-chosen completion time.
    pub fn complete_at(&self, id: ContractId, completed_at: i64) -> RepoResult<Contract> {
        let vault_count = self.repo.mark_completed(id, completed_at)?;
        info!(
            "event=contract_complete module=service status=ok contract_id={} vault_count={}",
            id, vault_count
        );
        self.read_back(id, "completed contract missing in read-back")
    }

    /// Persists the failed state for an active contract.
    pub fn fail(&self, id: ContractId) -> RepoResult<Contract> {
        let contract = self.fail_quiet(id)?;
        feedback::emit_all(self.feedback.as_ref(), feedback::FAIL_CUES);
        Ok(contract)
    }

    pub(crate) fn fail_quiet(&self, id: ContractId) -> RepoResult<Contract> {
        self.repo.mark_failed(id)?;
        info!(
            "event=contract_fail module=service status=ok contract_id={}",
            id
        );
        self.read_back(id, "failed contract missing in read-back")
    }

    /// Removes a contract regardless of status.
    pub fn delete(&self, id: ContractId) -> RepoResult<()> {
        self.repo.delete_contract(id)?;
        info!(
            "event=contract_delete module=service status=ok contract_id={}",
            id
        );
        Ok(())
    }

    /// Persists `failed` for every active contract whose grace has run out.
    ///
    /// Returns the IDs that were transitioned. Polling never calls this; the
    /// app decides when failures are finalized.
    pub fn finalize_failures(&self) -> RepoResult<Vec<ContractId>> {
        let now_ms = self.clock.now_ms();
        let duration_ms = self.repo.load_settings()?.excommunicado_duration_ms;
        let mut failed = Vec::new();

        for contract in self.list_active()? {
            if !has_failed(&contract, now_ms, duration_ms) {
                continue;
            }
            match self.fail_quiet(contract.id) {
                Ok(_) => failed.push(contract.id),
                // Raced with a completion or delete; nothing left to finalize.
                Err(RepoError::NotFound(id)) => {
                    warn!(
                        "event=contract_finalize module=service status=skipped contract_id={}",
                        id
                    );
                }
                Err(err) => return Err(err),
            }
        }

        if !failed.is_empty() {
            feedback::emit_all(self.feedback.as_ref(), feedback::FAIL_CUES);
        }
        Ok(failed)
    }

    /// Reads settings; the first call on a fresh store materializes defaults.
    pub fn get_settings(&self) -> RepoResult<Settings> {
        self.repo.load_settings()
    }

    /// Merges `patch` into the stored settings. Unspecified fields are kept.
    pub fn update_settings(&self, patch: &SettingsPatch) -> RepoResult<Settings> {
        let settings = self.repo.update_settings(patch)?;
        info!(
            "event=settings_update module=service status=ok onboarding_complete={} vault_count={} duration_ms={}",
            settings.onboarding_complete, settings.vault_count, settings.excommunicado_duration_ms
        );
        Ok(settings)
    }

    /// Records the one-time unlock gesture.
    pub fn complete_onboarding(&self) -> RepoResult<Settings> {
        let settings = self.update_settings(&SettingsPatch {
            onboarding_complete: Some(true),
            ..SettingsPatch::default()
        })?;
        feedback::emit_all(self.feedback.as_ref(), feedback::ONBOARDING_CUES);
        Ok(settings)
    }

    fn read_back(&self, id: ContractId, context: &'static str) -> RepoResult<Contract> {
        self.repo
            .get_contract(id)?
            .ok_or_else(|| RepoError::InvalidData(context.to_string()))
    }
}
