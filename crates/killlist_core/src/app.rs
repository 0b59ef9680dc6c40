//! Process bootstrap: configuration and the single store handle.
//!
//! # Responsibility
//! - Resolve where the database and logs live.
//! - Open the store once at startup and hand out borrowing services.
//!
//! # Invariants
//! - One `App` owns the connection; repositories and services borrow it.
//! - No module-level store handle exists outside `App`.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{default_log_level, init_logging};
use crate::repo::contract_repo::{RepoError, RepoResult, SqliteContractRepository};
use crate::service::contract_service::ContractService;
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "killlist.sqlite3";
pub const ENV_DB_PATH: &str = "KILLLIST_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "KILLLIST_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "KILLLIST_LOG_DIR";

/// Where storage lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    File(PathBuf),
    Memory,
}

/// Startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub storage: StorageLocation,
    pub log_level: String,
    /// Absolute directory for rolling logs; `None` leaves logging to the host.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageLocation::File(db_path.into()),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            storage: StorageLocation::Memory,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn with_logging(mut self, level: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        self.log_level = level.into();
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Reads `KILLLIST_DB_PATH`, `KILLLIST_LOG_LEVEL` and `KILLLIST_LOG_DIR`.
    ///
    /// The database defaults to `killlist.sqlite3` in the temp directory.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = non_empty(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DB_FILE_NAME));
        let mut config = Self::new(db_path);
        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = non_empty(ENV_LOG_DIR).map(PathBuf::from);
        config
    }
}

#[derive(Debug)]
pub enum AppError {
    Logging(String),
    Db(DbError),
    Repo(RepoError),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(message) => write!(f, "logging init failed: {message}"),
            Self::Db(err) => write!(f, "database open failed: {err}"),
            Self::Repo(err) => write!(f, "store init failed: {err}"),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(_) => None,
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<DbError> for AppError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for AppError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Owner of the store connection for the process lifetime.
pub struct App {
    conn: Connection,
}

impl App {
    /// Initializes logging (when configured), opens and migrates the store,
    /// and verifies it is usable.
    pub fn open(config: &AppConfig) -> Result<Self, AppError> {
        if let Some(log_dir) = &config.log_dir {
            let log_dir = log_dir
                .to_str()
                .ok_or_else(|| AppError::Logging("log_dir must be valid UTF-8".to_string()))?;
            init_logging(&config.log_level, log_dir).map_err(AppError::Logging)?;
        }

        let conn = match &config.storage {
            StorageLocation::File(path) => open_db(path)?,
            StorageLocation::Memory => open_db_in_memory()?,
        };
        SqliteContractRepository::try_new(&conn)?;

        info!(
            "event=app_open module=app status=ok storage={}",
            storage_path(&config.storage)
                .map_or_else(|| "memory".to_string(), |path| path.display().to_string())
        );
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn repository(&self) -> RepoResult<SqliteContractRepository<'_>> {
        SqliteContractRepository::try_new(&self.conn)
    }

    /// Wall-clock service borrowing this app's store.
    pub fn service(&self) -> RepoResult<ContractService<SqliteContractRepository<'_>>> {
        Ok(ContractService::new(self.repository()?))
    }
}

/// Returns the file path for a storage location, if any.
pub fn storage_path(location: &StorageLocation) -> Option<&Path> {
    match location {
        StorageLocation::File(path) => Some(path.as_path()),
        StorageLocation::Memory => None,
    }
}
