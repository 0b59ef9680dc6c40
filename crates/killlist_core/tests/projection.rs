use killlist_core::db::{open_db_in_memory, DbError};
use killlist_core::{
    Contract, ContractId, ContractListQuery, ContractProjection, ContractRepository,
    ContractService, ContractStatus, Cue, ExcommunicadoMonitor, ManualClock, Priority,
    ProjectionError, RecordingFeedback, RepoError, RepoResult, Settings, SettingsPatch,
    SqliteContractRepository,
};
use std::cell::Cell;

const NOW: i64 = 1_700_000_000_000;
const HOUR: i64 = 60 * 60 * 1000;

/// Store whose writes can be switched off to simulate an unavailable disk.
struct FlakyRepository<'conn> {
    inner: SqliteContractRepository<'conn>,
    offline: Cell<bool>,
    failing_writes: Cell<u32>,
}

impl<'conn> FlakyRepository<'conn> {
    fn new(inner: SqliteContractRepository<'conn>) -> Self {
        Self {
            inner,
            offline: Cell::new(false),
            failing_writes: Cell::new(0),
        }
    }

    /// Fails only the next `count` writes.
    fn fail_next_writes(&self, count: u32) {
        self.failing_writes.set(count);
    }

    fn check(&self) -> RepoResult<()> {
        let failing = self.failing_writes.get();
        if failing > 0 {
            self.failing_writes.set(failing - 1);
        }
        if self.offline.get() || failing > 0 {
            return Err(RepoError::Db(DbError::Sqlite(
                rusqlite::Error::InvalidQuery,
            )));
        }
        Ok(())
    }
}

impl ContractRepository for FlakyRepository<'_> {
    fn insert_contract(&self, contract: &Contract) -> RepoResult<()> {
        self.check()?;
        self.inner.insert_contract(contract)
    }

    fn get_contract(&self, id: ContractId) -> RepoResult<Option<Contract>> {
        self.inner.get_contract(id)
    }

    fn list_contracts(&self, query: &ContractListQuery) -> RepoResult<Vec<Contract>> {
        self.inner.list_contracts(query)
    }

    fn mark_completed(&self, id: ContractId, completed_at: i64) -> RepoResult<u32> {
        self.check()?;
        self.inner.mark_completed(id, completed_at)
    }

    fn mark_failed(&self, id: ContractId) -> RepoResult<()> {
        self.check()?;
        self.inner.mark_failed(id)
    }

    fn delete_contract(&self, id: ContractId) -> RepoResult<()> {
        self.check()?;
        self.inner.delete_contract(id)
    }

    fn load_settings(&self) -> RepoResult<Settings> {
        self.inner.load_settings()
    }

    fn update_settings(&self, patch: &SettingsPatch) -> RepoResult<Settings> {
        self.check()?;
        self.inner.update_settings(patch)
    }
}

#[test]
fn flush_persists_applied_mutations_in_order() {
    let conn = open_db_in_memory().unwrap();
    let clock = ManualClock::new(NOW);
    let service =
        ContractService::with_clock(SqliteContractRepository::try_new(&conn).unwrap(), &clock);
    let mut projection = ContractProjection::new();
    projection.reload(&service).unwrap();

    let kept = projection
        .add_contract("Renew passport", NOW + HOUR, Priority::HighTable, NOW)
        .unwrap();
    let done = projection
        .add_contract("Pay rent", NOW + 2 * HOUR, Priority::Normal, NOW)
        .unwrap();
    projection.complete(done.id, NOW + 10).unwrap();
    projection.complete_onboarding();
    assert_eq!(projection.pending_len(), 4);

    let report = projection.flush(&service);
    assert!(report.is_clean());
    assert_eq!(report.persisted, 4);
    assert_eq!(projection.pending_len(), 0);

    assert_eq!(service.list_active().unwrap(), vec![kept]);
    let archived = service.list_archived().unwrap();
    assert_eq!(archived[0].id, done.id);
    assert_eq!(archived[0].completed_at, Some(NOW + 10));
    let settings = service.get_settings().unwrap();
    assert_eq!(settings.vault_count, 1);
    assert!(settings.onboarding_complete);

    let mirrored = projection.settings();
    projection.reload(&service).unwrap();
    assert_eq!(projection.active(), service.list_active().unwrap());
    assert_eq!(projection.archived(), service.list_archived().unwrap());
    assert_eq!(projection.settings(), mirrored);
}

#[test]
fn failed_persist_rolls_back_only_that_mutation() {
    let conn = open_db_in_memory().unwrap();
    let repo = FlakyRepository::new(SqliteContractRepository::try_new(&conn).unwrap());
    let service = ContractService::new(&repo);
    let mut projection = ContractProjection::new();

    let created = projection
        .add_contract("Water plants", NOW + HOUR, Priority::Normal, NOW)
        .unwrap();
    assert!(projection.flush(&service).is_clean());

    repo.offline.set(true);
    projection.complete(created.id, NOW + 5).unwrap();
    assert!(projection.active().is_empty());
    assert_eq!(projection.settings().vault_count, 1);

    let report = projection.flush(&service);
    assert_eq!(report.persisted, 0);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        ProjectionError::PersistenceFailed {
            mutation,
            contract_id,
            source,
        } => {
            assert_eq!(*mutation, "complete");
            assert_eq!(*contract_id, Some(created.id));
            assert!(source.is_persistence_failure());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(projection.active(), vec![created.clone()]);
    assert_eq!(projection.settings().vault_count, 0);
    assert_eq!(
        service.get(created.id).unwrap().unwrap().status,
        ContractStatus::Active
    );
}

#[test]
fn failed_insert_removes_optimistic_contract() {
    let conn = open_db_in_memory().unwrap();
    let repo = FlakyRepository::new(SqliteContractRepository::try_new(&conn).unwrap());
    let service = ContractService::new(&repo);
    let mut projection = ContractProjection::new();

    repo.offline.set(true);
    let lost = projection
        .add_contract("Book flights", NOW + HOUR, Priority::Normal, NOW)
        .unwrap();
    projection.complete_onboarding();
    assert!(projection.get(lost.id).is_some());

    let report = projection.flush(&service);
    assert_eq!(report.failures.len(), 2);
    assert!(projection.get(lost.id).is_none());
    assert!(!projection.settings().onboarding_complete);
    assert!(service.list_active().unwrap().is_empty());
}

#[test]
fn store_side_rejection_rolls_back_stale_mirror() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());
    let created = service
        .create("Stale in mirror", NOW + HOUR, Priority::Normal)
        .unwrap();

    let mut projection = ContractProjection::new();
    projection.reload(&service).unwrap();
    service.fail(created.id).unwrap();

    projection.complete(created.id, NOW).unwrap();
    let report = projection.flush(&service);
    assert!(matches!(
        report.failures.as_slice(),
        [ProjectionError::PersistenceFailed {
            source: RepoError::NotFound(_),
            ..
        }]
    ));
    assert!(projection.active().is_empty());
    assert_eq!(projection.archived(), service.list_archived().unwrap());
    assert_eq!(projection.archived()[0].status, ContractStatus::Failed);
    assert_eq!(projection.settings().vault_count, 0);
}

#[test]
fn failed_insert_cancels_later_mutations_of_same_contract() {
    let conn = open_db_in_memory().unwrap();
    let repo = FlakyRepository::new(SqliteContractRepository::try_new(&conn).unwrap());
    let service = ContractService::new(&repo);
    let mut projection = ContractProjection::new();

    repo.offline.set(true);
    let ghost = projection
        .add_contract("Ghost", NOW + HOUR, Priority::Normal, NOW)
        .unwrap();
    projection.complete(ghost.id, NOW + 1).unwrap();

    let report = projection.flush(&service);
    assert_eq!(report.persisted, 0);
    assert!(matches!(
        report.failures.as_slice(),
        [
            ProjectionError::PersistenceFailed { mutation: "add", .. },
            ProjectionError::Cancelled {
                mutation: "complete",
                contract_id,
            },
        ] if *contract_id == ghost.id
    ));
    assert_eq!(projection.pending_len(), 0);
    assert_eq!(projection.active(), service.list_active().unwrap());
    assert_eq!(projection.archived(), service.list_archived().unwrap());
    assert!(projection.get(ghost.id).is_none());
    assert_eq!(projection.settings().vault_count, 0);
}

#[test]
fn failed_complete_keeps_later_delete_from_reaching_store() {
    let conn = open_db_in_memory().unwrap();
    let repo = FlakyRepository::new(SqliteContractRepository::try_new(&conn).unwrap());
    let service = ContractService::new(&repo);
    let created = service
        .create("Existing", NOW + HOUR, Priority::Normal)
        .unwrap();
    let other = service.create("Other", NOW + HOUR, Priority::Normal).unwrap();

    let mut projection = ContractProjection::new();
    projection.reload(&service).unwrap();
    projection.complete(created.id, NOW).unwrap();
    projection.delete(created.id).unwrap();
    projection.complete(other.id, NOW).unwrap();

    repo.fail_next_writes(1);
    let report = projection.flush(&service);
    assert_eq!(report.persisted, 1);
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(
        report.failures[1],
        ProjectionError::Cancelled {
            mutation: "delete",
            ..
        }
    ));

    assert_eq!(projection.active(), service.list_active().unwrap());
    assert_eq!(projection.archived(), service.list_archived().unwrap());
    assert_eq!(projection.active(), vec![created]);
    assert_eq!(projection.settings().vault_count, 1);
    assert_eq!(service.get_settings().unwrap().vault_count, 1);
}

#[test]
fn reload_discards_unflushed_mutations() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());
    let mut projection = ContractProjection::new();

    projection
        .add_contract("Never saved", NOW + HOUR, Priority::Normal, NOW)
        .unwrap();
    projection.reload(&service).unwrap();

    assert_eq!(projection.pending_len(), 0);
    assert!(projection.active().is_empty());
}

#[test]
fn projection_plays_cues_at_apply_time() {
    let sink = RecordingFeedback::new();
    let mut projection = ContractProjection::new().with_feedback(sink.clone());

    let created = projection
        .add_contract("Loud", NOW + HOUR, Priority::Normal, NOW)
        .unwrap();
    projection.complete(created.id, NOW).unwrap();

    assert_eq!(
        sink.cues(),
        vec![Cue::HapticSuccess, Cue::HapticImpact, Cue::Execute, Cue::Coin]
    );
}

#[test]
fn monitor_follows_projection_alarm_state() {
    let sink = RecordingFeedback::new();
    let mut monitor = ExcommunicadoMonitor::new();
    let mut projection = ContractProjection::new();
    let created = projection
        .add_contract("Overdue", NOW - 1_000, Priority::Normal, NOW)
        .unwrap();

    assert!(projection.is_excommunicado(NOW));
    let snapshot = monitor.poll(
        &projection.active(),
        NOW,
        projection.settings().excommunicado_duration_ms,
        &sink,
    );
    assert!(snapshot.excommunicado);

    projection.complete(created.id, NOW).unwrap();
    assert!(!projection.is_excommunicado(NOW));
    let snapshot = monitor.poll(
        &projection.active(),
        NOW,
        projection.settings().excommunicado_duration_ms,
        &sink,
    );
    assert!(!snapshot.excommunicado);
    assert_eq!(sink.cues(), vec![Cue::Tick]);
}
