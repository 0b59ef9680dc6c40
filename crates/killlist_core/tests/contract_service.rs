use killlist_core::db::open_db_in_memory;
use killlist_core::{
    phase, ContractPhase, ContractService, ContractStatus, Cue, ManualClock, Priority,
    RecordingFeedback, RepoError, SettingsPatch, SqliteContractRepository,
    DEFAULT_EXCOMMUNICADO_DURATION_MS,
};
use uuid::Uuid;

const NOW: i64 = 1_700_000_000_000;
const HOUR: i64 = 60 * 60 * 1000;

#[test]
fn complete_moves_contract_to_archive_and_bumps_vault() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContractRepository::try_new(&conn).unwrap();
    let clock = ManualClock::new(NOW);
    let service = ContractService::with_clock(repo, &clock);

    let created = service
        .create("Finish the report", NOW + HOUR, Priority::HighTable)
        .unwrap();
    assert_eq!(service.list_active().unwrap(), vec![created.clone()]);

    clock.advance(1_000);
    let completed = service.complete(created.id).unwrap();
    assert_eq!(completed.status, ContractStatus::Completed);
    assert_eq!(completed.completed_at, Some(NOW + 1_000));

    assert!(service.list_active().unwrap().is_empty());
    let archived = service.list_archived().unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, created.id);
    assert_eq!(archived[0].status, ContractStatus::Completed);
    assert_eq!(service.get_settings().unwrap().vault_count, 1);
}

#[test]
fn completing_non_active_contract_leaves_store_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());

    let created = service
        .create("Call the plumber", NOW + HOUR, Priority::Normal)
        .unwrap();
    service.fail(created.id).unwrap();

    let err = service.complete(created.id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == created.id));
    assert_eq!(
        service.get(created.id).unwrap().unwrap().status,
        ContractStatus::Failed
    );
    assert_eq!(service.get_settings().unwrap().vault_count, 0);

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.complete(missing).unwrap_err(),
        RepoError::NotFound(id) if id == missing
    ));
}

#[test]
fn archive_lists_most_recent_completion_first() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());

    let a = service.create("A", NOW, Priority::Normal).unwrap();
    let b = service.create("B", NOW, Priority::Normal).unwrap();
    service.complete_at(b.id, 5).unwrap();
    service.complete_at(a.id, 10).unwrap();

    let ids = service
        .list_archived()
        .unwrap()
        .into_iter()
        .map(|contract| contract.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![a.id, b.id]);
}

#[test]
fn archive_ranks_failed_contracts_by_deadline() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());

    let completed = service.create("completed", NOW, Priority::Normal).unwrap();
    let failed_late = service.create("failed late", 20, Priority::Normal).unwrap();
    let failed_early = service.create("failed early", 1, Priority::Normal).unwrap();
    service.complete_at(completed.id, 10).unwrap();
    service.fail(failed_late.id).unwrap();
    service.fail(failed_early.id).unwrap();

    let archived = service.list_archived().unwrap();
    let ids = archived.iter().map(|contract| contract.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![failed_late.id, completed.id, failed_early.id]);
    assert_eq!(archived[0].status, ContractStatus::Failed);
    assert!(archived[0].completed_at.is_none());
    assert_eq!(archived[1].status, ContractStatus::Completed);
}

#[test]
fn create_rejects_blank_title_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());

    let err = service
        .create(" \t\n ", NOW + HOUR, Priority::Normal)
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(service.list_active().unwrap().is_empty());
}

#[test]
fn create_accepts_past_deadline() {
    let conn = open_db_in_memory().unwrap();
    let clock = ManualClock::new(NOW);
    let service =
        ContractService::with_clock(SqliteContractRepository::try_new(&conn).unwrap(), &clock);

    let created = service
        .create("Already late", NOW - 1_000, Priority::Normal)
        .unwrap();
    assert_eq!(created.created_at, NOW);
    assert_eq!(
        phase(&created, NOW, DEFAULT_EXCOMMUNICADO_DURATION_MS),
        ContractPhase::Excommunicado {
            remaining_ms: DEFAULT_EXCOMMUNICADO_DURATION_MS - 1_000
        }
    );
}

#[test]
fn delete_missing_contract_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());

    let created = service.create("Gone", NOW, Priority::Normal).unwrap();
    service.delete(created.id).unwrap();
    assert!(service.get(created.id).unwrap().is_none());
    assert!(matches!(
        service.delete(created.id).unwrap_err(),
        RepoError::NotFound(_)
    ));
}

#[test]
fn update_settings_round_trips_partial_patch() {
    let conn = open_db_in_memory().unwrap();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap());

    let before = service.get_settings().unwrap();
    service
        .update_settings(&SettingsPatch {
            vault_count: Some(5),
            ..SettingsPatch::default()
        })
        .unwrap();

    let after = service.get_settings().unwrap();
    assert_eq!(after.vault_count, 5);
    assert_eq!(after.onboarding_complete, before.onboarding_complete);
    assert_eq!(
        after.excommunicado_duration_ms,
        before.excommunicado_duration_ms
    );
}

#[test]
fn onboarding_completes_once_and_never_reverts() {
    let conn = open_db_in_memory().unwrap();
    let sink = RecordingFeedback::new();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap())
        .with_feedback(sink.clone());

    assert!(service.complete_onboarding().unwrap().onboarding_complete);
    assert_eq!(sink.cues(), vec![Cue::HapticSuccess, Cue::Lock]);

    let err = service
        .update_settings(&SettingsPatch {
            onboarding_complete: Some(false),
            ..SettingsPatch::default()
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::SettingsValidation(_)));
    assert!(service.get_settings().unwrap().onboarding_complete);
}

#[test]
fn finalize_failures_persists_only_expired_contracts() {
    let conn = open_db_in_memory().unwrap();
    let clock = ManualClock::new(NOW);
    let service =
        ContractService::with_clock(SqliteContractRepository::try_new(&conn).unwrap(), &clock);
    service
        .update_settings(&SettingsPatch {
            excommunicado_duration_ms: Some(60_000),
            ..SettingsPatch::default()
        })
        .unwrap();

    let expired = service.create("expired", NOW - 60_000, Priority::Normal).unwrap();
    let in_grace = service.create("in grace", NOW - 59_999, Priority::Normal).unwrap();
    let pending = service.create("pending", NOW + HOUR, Priority::Normal).unwrap();

    let failed = service.finalize_failures().unwrap();
    assert_eq!(failed, vec![expired.id]);
    assert_eq!(
        service.get(expired.id).unwrap().unwrap().status,
        ContractStatus::Failed
    );
    assert!(service.get(in_grace.id).unwrap().unwrap().is_active());
    assert!(service.get(pending.id).unwrap().unwrap().is_active());

    clock.advance(1);
    assert_eq!(service.finalize_failures().unwrap(), vec![in_grace.id]);
    assert!(service.finalize_failures().unwrap().is_empty());
}

#[test]
fn feedback_follows_accepted_changes_only() {
    let conn = open_db_in_memory().unwrap();
    let sink = RecordingFeedback::new();
    let service = ContractService::new(SqliteContractRepository::try_new(&conn).unwrap())
        .with_feedback(sink.clone());

    let created = service.create("Ship it", NOW + HOUR, Priority::Normal).unwrap();
    assert_eq!(sink.cues(), vec![Cue::HapticSuccess]);
    sink.clear();

    service.complete(created.id).unwrap();
    assert_eq!(sink.cues(), vec![Cue::HapticImpact, Cue::Execute, Cue::Coin]);
    sink.clear();

    service.complete(created.id).unwrap_err();
    service.create("", NOW, Priority::Normal).unwrap_err();
    assert!(sink.cues().is_empty());
}
