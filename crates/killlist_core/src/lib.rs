//! Core domain logic for the Kill List contract tracker.
//! This crate is the single source of truth for lifecycle rules and storage.

pub mod app;
pub mod db;
pub mod feedback;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod view;

pub use app::{App, AppConfig, AppError, StorageLocation};
pub use feedback::{Cue, FeedbackError, FeedbackSink, NoopFeedback, RecordingFeedback};
pub use lifecycle::clock::{Clock, ManualClock, SystemClock};
pub use lifecycle::format::{
    format_countdown, format_deadline, format_deadline_local, format_time_until_deadline,
};
pub use lifecycle::monitor::{AlarmSnapshot, AlarmTransition, ExcommunicadoMonitor};
pub use lifecycle::status::{
    has_failed, has_overdue_contracts, is_overdue, phase, remaining_grace_ms, ContractPhase,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::contract::{
    Contract, ContractId, ContractStatus, ContractValidationError, Priority,
};
pub use model::settings::{
    Settings, SettingsPatch, SettingsValidationError, DEFAULT_EXCOMMUNICADO_DURATION_MS,
};
pub use repo::contract_repo::{
    ContractListQuery, ContractOrder, ContractRepository, RepoError, RepoResult,
    SqliteContractRepository, StatusFilter,
};
pub use service::contract_service::ContractService;
pub use view::projection::{ContractProjection, FlushReport, ProjectionError, ViewState};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
