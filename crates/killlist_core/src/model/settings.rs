//! Installation-wide settings singleton.
//!
//! # Invariants
//! - `onboarding_complete` never reverts to `false` once set.
//! - `vault_count` never decreases.
//! - `excommunicado_duration_ms` is strictly positive.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default grace window after a missed deadline (45 minutes).
pub const DEFAULT_EXCOMMUNICADO_DURATION_MS: i64 = 45 * 60 * 1000;

/// Fixed primary key of the settings row.
pub const SETTINGS_KEY: &str = "settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub onboarding_complete: bool,
    pub vault_count: u32,
    pub excommunicado_duration_ms: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            onboarding_complete: false,
            vault_count: 0,
            excommunicado_duration_ms: DEFAULT_EXCOMMUNICADO_DURATION_MS,
        }
    }
}

/// Partial settings update. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub onboarding_complete: Option<bool>,
    pub vault_count: Option<u32>,
    pub excommunicado_duration_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsValidationError {
    OnboardingReverted,
    VaultCountDecreased { current: u32, requested: u32 },
    NonPositiveDuration(i64),
}

impl Display for SettingsValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnboardingReverted => write!(f, "onboarding cannot be reverted once complete"),
            Self::VaultCountDecreased { current, requested } => write!(
                f,
                "vault count cannot decrease from {current} to {requested}"
            ),
            Self::NonPositiveDuration(value) => {
                write!(f, "excommunicado duration must be positive, got {value}")
            }
        }
    }
}

impl Error for SettingsValidationError {}

impl Settings {
    /// Returns the merged settings, or an error when the patch would break
    /// an invariant. `self` is left untouched either way.
    pub fn merged(&self, patch: &SettingsPatch) -> Result<Settings, SettingsValidationError> {
        let mut next = *self;
        if let Some(onboarding_complete) = patch.onboarding_complete {
            if self.onboarding_complete && !onboarding_complete {
                return Err(SettingsValidationError::OnboardingReverted);
            }
            next.onboarding_complete = onboarding_complete;
        }
        if let Some(vault_count) = patch.vault_count {
            if vault_count < self.vault_count {
                return Err(SettingsValidationError::VaultCountDecreased {
                    current: self.vault_count,
                    requested: vault_count,
                });
            }
            next.vault_count = vault_count;
        }
        if let Some(duration) = patch.excommunicado_duration_ms {
            next.excommunicado_duration_ms = duration;
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        if self.excommunicado_duration_ms <= 0 {
            return Err(SettingsValidationError::NonPositiveDuration(
                self.excommunicado_duration_ms,
            ));
        }
        Ok(())
    }
}
