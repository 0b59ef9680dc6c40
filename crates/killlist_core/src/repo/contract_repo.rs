//! Contract/settings store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide durable CRUD over `contracts` and the `settings` singleton.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `Contract::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Completing a contract and incrementing the vault happen in one
//!   transaction; readers never observe one without the other.
//! - A missing settings row is materialized with defaults on first read.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contract::{
    Contract, ContractId, ContractStatus, ContractValidationError, Priority,
};
use crate::model::settings::{Settings, SettingsPatch, SettingsValidationError, SETTINGS_KEY};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const CONTRACT_SELECT_SQL: &str = "SELECT
    id,
    title,
    deadline_at,
    priority,
    status,
    created_at,
    completed_at
FROM contracts";

const REQUIRED_CONTRACT_COLUMNS: &[&str] = &[
    "id",
    "title",
    "deadline_at",
    "priority",
    "status",
    "created_at",
    "completed_at",
];

const REQUIRED_SETTINGS_COLUMNS: &[&str] = &[
    "id",
    "onboarding_complete",
    "vault_count",
    "excommunicado_duration_ms",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for contract/settings persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    /// Contract input rejected before any persistence attempt.
    Validation(ContractValidationError),
    /// Settings patch rejected before any persistence attempt.
    SettingsValidation(SettingsValidationError),
    /// Underlying store unavailable or write rejected.
    Db(DbError),
    /// No such contract, or the contract is not in a state that allows the
    /// operation.
    NotFound(ContractId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Whether this error came from the storage transport rather than from
    /// caller input or record state.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::SettingsValidation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "active contract not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with db::open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::SettingsValidation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContractValidationError> for RepoError {
    fn from(value: ContractValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<SettingsValidationError> for RepoError {
    fn from(value: SettingsValidationError) -> Self {
        Self::SettingsValidation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Status filter for contract listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    Any,
    Is(ContractStatus),
    /// Every terminal status (`completed` or `failed`).
    Archived,
}

/// Sort key for contract listings. Ties break on `id ASC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContractOrder {
    #[default]
    DeadlineAsc,
    CreatedAtAsc,
    /// `completed_at` when present, else `deadline_at`; most recent first.
    TerminalTimeDesc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractListQuery {
    pub status: StatusFilter,
    pub order: ContractOrder,
}

/// Storage interface for contracts and the settings singleton.
pub trait ContractRepository {
    fn insert_contract(&self, contract: &Contract) -> RepoResult<()>;
    fn get_contract(&self, id: ContractId) -> RepoResult<Option<Contract>>;
    fn list_contracts(&self, query: &ContractListQuery) -> RepoResult<Vec<Contract>>;
    /// Marks an active contract completed and bumps the vault atomically.
    ///
    /// Returns the new vault count.
    fn mark_completed(&self, id: ContractId, completed_at: i64) -> RepoResult<u32>;
    fn mark_failed(&self, id: ContractId) -> RepoResult<()>;
    fn delete_contract(&self, id: ContractId) -> RepoResult<()>;
    /// Reads settings, materializing the default row on first run.
    fn load_settings(&self) -> RepoResult<Settings>;
    /// Read-merge-writes settings in one transaction and returns the result.
    fn update_settings(&self, patch: &SettingsPatch) -> RepoResult<Settings>;
}

impl<R: ContractRepository + ?Sized> ContractRepository for &R {
    fn insert_contract(&self, contract: &Contract) -> RepoResult<()> {
        (**self).insert_contract(contract)
    }

    fn get_contract(&self, id: ContractId) -> RepoResult<Option<Contract>> {
        (**self).get_contract(id)
    }

    fn list_contracts(&self, query: &ContractListQuery) -> RepoResult<Vec<Contract>> {
        (**self).list_contracts(query)
    }

    fn mark_completed(&self, id: ContractId, completed_at: i64) -> RepoResult<u32> {
        (**self).mark_completed(id, completed_at)
    }

    fn mark_failed(&self, id: ContractId) -> RepoResult<()> {
        (**self).mark_failed(id)
    }

    fn delete_contract(&self, id: ContractId) -> RepoResult<()> {
        (**self).delete_contract(id)
    }

    fn load_settings(&self) -> RepoResult<Settings> {
        (**self).load_settings()
    }

    fn update_settings(&self, patch: &SettingsPatch) -> RepoResult<Settings> {
        (**self).update_settings(patch)
    }
}

/// SQLite-backed contract store.
pub struct SqliteContractRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContractRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema is
    ///   not the one this crate writes.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContractRepository for SqliteContractRepository<'_> {
    fn insert_contract(&self, contract: &Contract) -> RepoResult<()> {
        contract.validate()?;

        self.conn.execute(
            "INSERT INTO contracts (
                id,
                title,
                deadline_at,
                priority,
                status,
                created_at,
                completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                contract.id.to_string(),
                contract.title.as_str(),
                contract.deadline_at,
                priority_to_db(contract.priority),
                status_to_db(contract.status),
                contract.created_at,
                contract.completed_at,
            ],
        )?;

        Ok(())
    }

    fn get_contract(&self, id: ContractId) -> RepoResult<Option<Contract>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONTRACT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contract_row(row)?));
        }
        Ok(None)
    }

    fn list_contracts(&self, query: &ContractListQuery) -> RepoResult<Vec<Contract>> {
        let mut sql = CONTRACT_SELECT_SQL.to_string();
        let mut bind_status: Option<&'static str> = None;

        match query.status {
            StatusFilter::Any => {}
            StatusFilter::Is(status) => {
                sql.push_str(" WHERE status = ?1");
                bind_status = Some(status_to_db(status));
            }
            StatusFilter::Archived => sql.push_str(" WHERE status <> 'active'"),
        }

        sql.push_str(match query.order {
            ContractOrder::DeadlineAsc => " ORDER BY deadline_at ASC, id ASC",
            ContractOrder::CreatedAtAsc => " ORDER BY created_at ASC, id ASC",
            ContractOrder::TerminalTimeDesc => {
                " ORDER BY COALESCE(completed_at, deadline_at) DESC, id ASC"
            }
        });

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match bind_status {
            Some(status) => stmt.query([status])?,
            None => stmt.query([])?,
        };
        let mut contracts = Vec::new();
        while let Some(row) = rows.next()? {
            contracts.push(parse_contract_row(row)?);
        }

        Ok(contracts)
    }

    fn mark_completed(&self, id: ContractId, completed_at: i64) -> RepoResult<u32> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE contracts
             SET
                status = 'completed',
                completed_at = ?2
             WHERE id = ?1
               AND status = 'active';",
            params![id.to_string(), completed_at],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        ensure_settings_row(&tx)?;
        tx.execute(
            "UPDATE settings SET vault_count = vault_count + 1 WHERE id = ?1;",
            [SETTINGS_KEY],
        )?;
        let vault_count = read_settings(&tx)?.vault_count;

        tx.commit()?;
        Ok(vault_count)
    }

    fn mark_failed(&self, id: ContractId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE contracts
             SET status = 'failed'
             WHERE id = ?1
               AND status = 'active';",
            [id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn delete_contract(&self, id: ContractId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM contracts WHERE id = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn load_settings(&self) -> RepoResult<Settings> {
        ensure_settings_row(self.conn)?;
        read_settings(self.conn)
    }

    fn update_settings(&self, patch: &SettingsPatch) -> RepoResult<Settings> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        ensure_settings_row(&tx)?;
        let next = read_settings(&tx)?.merged(patch)?;
        tx.execute(
            "UPDATE settings
             SET
                onboarding_complete = ?2,
                vault_count = ?3,
                excommunicado_duration_ms = ?4
             WHERE id = ?1;",
            params![
                SETTINGS_KEY,
                bool_to_int(next.onboarding_complete),
                next.vault_count,
                next.excommunicado_duration_ms,
            ],
        )?;

        tx.commit()?;
        Ok(next)
    }
}

fn ensure_settings_row(conn: &Connection) -> RepoResult<()> {
    let defaults = Settings::default();
    conn.execute(
        "INSERT OR IGNORE INTO settings (
            id,
            onboarding_complete,
            vault_count,
            excommunicado_duration_ms
        ) VALUES (?1, ?2, ?3, ?4);",
        params![
            SETTINGS_KEY,
            bool_to_int(defaults.onboarding_complete),
            defaults.vault_count,
            defaults.excommunicado_duration_ms,
        ],
    )?;
    Ok(())
}

fn read_settings(conn: &Connection) -> RepoResult<Settings> {
    let row = conn
        .query_row(
            "SELECT onboarding_complete, vault_count, excommunicado_duration_ms
             FROM settings
             WHERE id = ?1;",
            [SETTINGS_KEY],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((onboarding, vault_count, duration)) = row else {
        return Err(RepoError::InvalidData(
            "settings row missing after materialization".to_string(),
        ));
    };

    let settings = Settings {
        onboarding_complete: parse_bool(onboarding, "settings.onboarding_complete")?,
        vault_count: u32::try_from(vault_count).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid vault_count value `{vault_count}` in settings.vault_count"
            ))
        })?,
        excommunicado_duration_ms: duration,
    };
    settings.validate()?;
    Ok(settings)
}

fn parse_contract_row(row: &Row<'_>) -> RepoResult<Contract> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in contracts.id"))
    })?;

    let priority_text: String = row.get("priority")?;
    let priority = parse_priority(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid priority `{priority_text}` in contracts.priority"
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in contracts.status"))
    })?;

    let contract = Contract {
        id,
        title: row.get("title")?,
        deadline_at: row.get("deadline_at")?,
        priority,
        status,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
    };
    contract.validate()?;
    Ok(contract)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in [
        ("contracts", REQUIRED_CONTRACT_COLUMNS),
        ("settings", REQUIRED_SETTINGS_COLUMNS),
    ] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn priority_to_db(priority: Priority) -> &'static str {
    match priority {
        Priority::Normal => "normal",
        Priority::HighTable => "high_table",
    }
}

fn parse_priority(value: &str) -> Option<Priority> {
    match value {
        "normal" => Some(Priority::Normal),
        "high_table" => Some(Priority::HighTable),
        _ => None,
    }
}

fn status_to_db(status: ContractStatus) -> &'static str {
    match status {
        ContractStatus::Active => "active",
        ContractStatus::Completed => "completed",
        ContractStatus::Failed => "failed",
    }
}

fn parse_status(value: &str) -> Option<ContractStatus> {
    match value {
        "active" => Some(ContractStatus::Active),
        "completed" => Some(ContractStatus::Completed),
        "failed" => Some(ContractStatus::Failed),
        _ => None,
    }
}

fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
