//! Optimistic in-memory mirror of the contract store.
//!
//! # Responsibility
//! - Apply user mutations to an in-memory copy immediately.
//! - Persist queued mutations later and roll back the ones the store rejects.
//!
//! # Invariants
//! - The mirror is never authoritative; `reload` rebuilds it from the store.
//! - Every applied mutation carries the closure that reverses it.
//! - A failed persist always runs its reversal before the error is returned.
//! - A failed persist cancels every later queued mutation of the same
//!   contract (reverted newest first), then re-reads that contract from the
//!   store so the mirror matches what was actually persisted.

use crate::feedback::{self, FeedbackSink, NoopFeedback};
use crate::lifecycle::clock::Clock;
use crate::lifecycle::status::has_overdue_contracts;
use crate::model::contract::{Contract, ContractId, Priority};
use crate::model::settings::{Settings, SettingsPatch};
use crate::repo::contract_repo::{ContractRepository, RepoError, RepoResult};
use crate::service::contract_service::ContractService;
use log::{error, info, warn};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Snapshot the UI renders from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    contracts: Vec<Contract>,
    settings: Settings,
}

impl ViewState {
    fn position(&self, id: ContractId) -> Option<usize> {
        self.contracts.iter().position(|contract| contract.id == id)
    }

    fn restore(&mut self, prior: Contract) {
        match self.position(prior.id) {
            Some(index) => self.contracts[index] = prior,
            None => self.contracts.push(prior),
        }
    }

    fn remove(&mut self, id: ContractId) -> Option<Contract> {
        self.position(id).map(|index| self.contracts.remove(index))
    }
}

type Reversal = Box<dyn FnOnce(&mut ViewState)>;

/// Store-side half of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mutation {
    Add(Contract),
    Complete { id: ContractId, completed_at: i64 },
    Fail(ContractId),
    Delete(ContractId),
    CompleteOnboarding,
}

impl Mutation {
    fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Complete { .. } => "complete",
            Self::Fail(_) => "fail",
            Self::Delete(_) => "delete",
            Self::CompleteOnboarding => "complete_onboarding",
        }
    }

    fn contract_id(&self) -> Option<ContractId> {
        match self {
            Self::Add(contract) => Some(contract.id),
            Self::Complete { id, .. } | Self::Fail(id) | Self::Delete(id) => Some(*id),
            Self::CompleteOnboarding => None,
        }
    }

    fn persist<R: ContractRepository, C: Clock>(
        &self,
        service: &ContractService<R, C>,
    ) -> RepoResult<()> {
        match self {
            Self::Add(contract) => service.insert(contract),
            Self::Complete { id, completed_at } => service.complete_at(*id, *completed_at).map(drop),
            Self::Fail(id) => service.fail_quiet(*id).map(drop),
            Self::Delete(id) => service.delete(*id),
            Self::CompleteOnboarding => service
                .update_settings(&SettingsPatch {
                    onboarding_complete: Some(true),
                    ..SettingsPatch::default()
                })
                .map(drop),
        }
    }
}

struct PendingMutation {
    mutation: Mutation,
    revert: Reversal,
}

/// View-layer error.
#[derive(Debug)]
pub enum ProjectionError {
    /// Rejected in memory before anything was queued.
    Rejected(RepoError),
    /// The store refused a queued mutation; the mirror was rolled back.
    PersistenceFailed {
        mutation: &'static str,
        contract_id: Option<ContractId>,
        source: RepoError,
    },
    /// Dropped unpersisted because an earlier mutation of the same contract
    /// failed; its in-memory effect was reverted.
    Cancelled {
        mutation: &'static str,
        contract_id: ContractId,
    },
}

impl Display for ProjectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(err) => write!(f, "mutation rejected: {err}"),
            Self::PersistenceFailed {
                mutation,
                contract_id: Some(id),
                source,
            } => write!(f, "failed to persist `{mutation}` for {id}; rolled back: {source}"),
            Self::PersistenceFailed {
                mutation,
                contract_id: None,
                source,
            } => write!(f, "failed to persist `{mutation}`; rolled back: {source}"),
            Self::Cancelled {
                mutation,
                contract_id,
            } => write!(
                f,
                "`{mutation}` for {contract_id} cancelled after an earlier failure"
            ),
        }
    }
}

impl Error for ProjectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rejected(err) => Some(err),
            Self::PersistenceFailed { source, .. } => Some(source),
            Self::Cancelled { .. } => None,
        }
    }
}

impl From<RepoError> for ProjectionError {
    fn from(value: RepoError) -> Self {
        Self::Rejected(value)
    }
}

/// Outcome of one [`ContractProjection::flush`].
#[derive(Debug, Default)]
pub struct FlushReport {
    pub persisted: usize,
    /// One entry per rolled-back mutation, in queue order.
    pub failures: Vec<ProjectionError>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Optimistic contract/settings mirror with a queue of unpersisted mutations.
pub struct ContractProjection {
    state: ViewState,
    pending: VecDeque<PendingMutation>,
    feedback: Box<dyn FeedbackSink>,
}

impl Default for ContractProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractProjection {
    /// Empty mirror with default settings; call [`Self::reload`] to populate.
    pub fn new() -> Self {
        Self {
            state: ViewState::default(),
            pending: VecDeque::new(),
            feedback: Box::new(NoopFeedback),
        }
    }

    pub fn with_feedback(mut self, sink: impl FeedbackSink + 'static) -> Self {
        self.feedback = Box::new(sink);
        self
    }

    /// Rebuilds the mirror from the store.
    ///
    /// Unflushed mutations are discarded; flush first to keep them.
    pub fn reload<R: ContractRepository, C: Clock>(
        &mut self,
        service: &ContractService<R, C>,
    ) -> RepoResult<()> {
        let mut contracts = service.list_active()?;
        contracts.extend(service.list_archived()?);
        let settings = service.get_settings()?;

        if !self.pending.is_empty() {
            warn!(
                "event=projection_reload module=view status=ok discarded_pending={}",
                self.pending.len()
            );
            self.pending.clear();
        }
        self.state = ViewState {
            contracts,
            settings,
        };
        Ok(())
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn settings(&self) -> Settings {
        self.state.settings
    }

    pub fn get(&self, id: ContractId) -> Option<&Contract> {
        self.state.contracts.iter().find(|contract| contract.id == id)
    }

    /// Active contracts, soonest deadline first.
    pub fn active(&self) -> Vec<Contract> {
        let mut active = self
            .state
            .contracts
            .iter()
            .filter(|contract| contract.is_active())
            .cloned()
            .collect::<Vec<_>>();
        active.sort_by(|a, b| a.deadline_at.cmp(&b.deadline_at).then(a.id.cmp(&b.id)));
        active
    }

    /// Terminal contracts, most recent outcome first.
    pub fn archived(&self) -> Vec<Contract> {
        let mut archived = self
            .state
            .contracts
            .iter()
            .filter(|contract| !contract.is_active())
            .cloned()
            .collect::<Vec<_>>();
        archived.sort_by(|a, b| {
            b.terminal_time()
                .cmp(&a.terminal_time())
                .then(a.id.cmp(&b.id))
        });
        archived
    }

    pub fn is_excommunicado(&self, now_ms: i64) -> bool {
        has_overdue_contracts(&self.state.contracts, now_ms)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Adds a new active contract to the mirror and queues its insert.
    pub fn add_contract(
        &mut self,
        title: &str,
        deadline_at: i64,
        priority: Priority,
        now_ms: i64,
    ) -> Result<Contract, ProjectionError> {
        let contract = Contract::new(title, deadline_at, priority, now_ms)
            .map_err(RepoError::from)?;
        let id = contract.id;

        self.state.contracts.push(contract.clone());
        self.enqueue(
            Mutation::Add(contract.clone()),
            Box::new(move |state: &mut ViewState| {
                state.remove(id);
            }),
        );
        feedback::emit_all(self.feedback.as_ref(), feedback::CREATE_CUES);
        Ok(contract)
    }

    /// Completes an active contract in the mirror and bumps the vault.
    pub fn complete(&mut self, id: ContractId, now_ms: i64) -> Result<(), ProjectionError> {
        let prior = self.active_contract(id)?;
        let mut next = prior.clone();
        next.mark_completed(now_ms);

        self.state.restore(next);
        self.state.settings.vault_count = self.state.settings.vault_count.saturating_add(1);
        self.enqueue(
            Mutation::Complete {
                id,
                completed_at: now_ms,
            },
            Box::new(move |state: &mut ViewState| {
                state.restore(prior);
                state.settings.vault_count = state.settings.vault_count.saturating_sub(1);
            }),
        );
        feedback::emit_all(self.feedback.as_ref(), feedback::COMPLETE_CUES);
        Ok(())
    }

    /// Marks an active contract failed in the mirror.
    pub fn fail(&mut self, id: ContractId) -> Result<(), ProjectionError> {
        let prior = self.active_contract(id)?;
        let mut next = prior.clone();
        next.mark_failed();

        self.state.restore(next);
        self.enqueue(
            Mutation::Fail(id),
            Box::new(move |state: &mut ViewState| state.restore(prior)),
        );
        feedback::emit_all(self.feedback.as_ref(), feedback::FAIL_CUES);
        Ok(())
    }

    /// Removes a contract from the mirror regardless of status.
    pub fn delete(&mut self, id: ContractId) -> Result<(), ProjectionError> {
        let prior = self
            .state
            .remove(id)
            .ok_or(ProjectionError::Rejected(RepoError::NotFound(id)))?;

        self.enqueue(
            Mutation::Delete(id),
            Box::new(move |state: &mut ViewState| state.restore(prior)),
        );
        Ok(())
    }

    pub fn complete_onboarding(&mut self) {
        let prior = self.state.settings.onboarding_complete;
        self.state.settings.onboarding_complete = true;
        self.enqueue(
            Mutation::CompleteOnboarding,
            Box::new(move |state: &mut ViewState| {
                state.settings.onboarding_complete = prior;
            }),
        );
        feedback::emit_all(self.feedback.as_ref(), feedback::ONBOARDING_CUES);
    }

    /// Persists every queued mutation in order.
    ///
    /// A failure reverts its own mutation and cancels the later mutations of
    /// the same contract; mutations of other contracts are still attempted.
    pub fn flush<R: ContractRepository, C: Clock>(
        &mut self,
        service: &ContractService<R, C>,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        while let Some(PendingMutation { mutation, revert }) = self.pending.pop_front() {
            match mutation.persist(service) {
                Ok(()) => report.persisted += 1,
                Err(source) => {
                    let contract_id = mutation.contract_id();
                    let cancelled = contract_id
                        .map(|id| self.cancel_pending(id))
                        .unwrap_or_default();
                    revert(&mut self.state);
                    error!(
                        "event=projection_persist module=view status=error mutation={} contract_id={} cancelled={} error={}",
                        mutation.name(),
                        contract_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                        cancelled.len(),
                        source
                    );
                    report.failures.push(ProjectionError::PersistenceFailed {
                        mutation: mutation.name(),
                        contract_id,
                        source,
                    });

                    if let Some(id) = contract_id {
                        report
                            .failures
                            .extend(cancelled.into_iter().map(|name| ProjectionError::Cancelled {
                                mutation: name,
                                contract_id: id,
                            }));
                        self.resync_contract(service, id);
                    }
                }
            }
        }

        report
    }

    /// Removes queued mutations of `id` and reverts them newest first.
    ///
    /// Returns their names in queue order.
    fn cancel_pending(&mut self, id: ContractId) -> Vec<&'static str> {
        let (cancelled, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.mutation.contract_id() == Some(id));
        self.pending = kept.into();

        let mut names = Vec::with_capacity(cancelled.len());
        for PendingMutation { mutation, revert } in cancelled.into_iter().rev() {
            revert(&mut self.state);
            names.push(mutation.name());
        }
        names.reverse();
        names
    }

    /// Replaces the mirrored copy of `id` with the stored one, or drops it
    /// when the store has none. Keeps the reverted copy if the read fails.
    fn resync_contract<R: ContractRepository, C: Clock>(
        &mut self,
        service: &ContractService<R, C>,
        id: ContractId,
    ) {
        match service.get(id) {
            Ok(Some(stored)) => self.state.restore(stored),
            Ok(None) => {
                self.state.remove(id);
            }
            Err(err) => {
                warn!(
                    "event=projection_resync module=view status=error contract_id={} error={}",
                    id, err
                );
                return;
            }
        }
        info!(
            "event=projection_resync module=view status=ok contract_id={}",
            id
        );
    }

    fn active_contract(&self, id: ContractId) -> Result<Contract, ProjectionError> {
        self.get(id)
            .filter(|contract| contract.is_active())
            .cloned()
            .ok_or(ProjectionError::Rejected(RepoError::NotFound(id)))
    }

    fn enqueue(&mut self, mutation: Mutation, revert: Reversal) {
        self.pending.push_back(PendingMutation { mutation, revert });
    }
}
