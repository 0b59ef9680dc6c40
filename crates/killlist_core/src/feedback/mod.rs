//! Fire-and-forget audio/haptic feedback cues.
//!
//! # Responsibility
//! - Name the cues core emits on lifecycle events.
//! - Isolate the platform sink behind [`FeedbackSink`].
//!
//! # Invariants
//! - Sink failures never propagate to callers and never affect lifecycle state.
//! - Core only decides *which* cue to play; synthesis and vibration hardware
//!   belong to the platform shell.

use log::debug;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Audio and haptic cues understood by the platform shell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cue {
    /// Heavy mechanical thunk; onboarding unlock.
    Lock,
    /// Silenced shot; contract completed.
    Execute,
    /// One countdown tick while the excommunicado alarm is on.
    Tick,
    /// Low bass thrum during the unlock hold. `intensity` in `[0, 1]`.
    Thrum { intensity: f32 },
    /// Coin dropping into the vault.
    Coin,
    HapticLight,
    HapticMedium,
    HapticHeavy,
    HapticImpact,
    HapticError,
    HapticSuccess,
    /// Vibration growing with hold progress. `intensity` in `[0, 1]`.
    HapticProgressive { intensity: f32 },
}

impl Cue {
    /// Stable cue name for logs and bridge payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Execute => "execute",
            Self::Tick => "tick",
            Self::Thrum { .. } => "thrum",
            Self::Coin => "coin",
            Self::HapticLight => "haptic_light",
            Self::HapticMedium => "haptic_medium",
            Self::HapticHeavy => "haptic_heavy",
            Self::HapticImpact => "haptic_impact",
            Self::HapticError => "haptic_error",
            Self::HapticSuccess => "haptic_success",
            Self::HapticProgressive { .. } => "haptic_progressive",
        }
    }

    /// Vibration pattern in milliseconds (on/off alternating), or `None` for
    /// audio cues.
    pub fn vibration_pattern_ms(&self) -> Option<Vec<u32>> {
        let pattern = match self {
            Self::HapticLight => vec![10],
            Self::HapticMedium => vec![25],
            Self::HapticHeavy => vec![50],
            Self::HapticImpact => vec![30, 20, 50],
            Self::HapticError => vec![50, 50, 50],
            Self::HapticSuccess => vec![20, 30, 40, 30, 60],
            Self::HapticProgressive { intensity } => {
                let intensity = clamp_unit(*intensity);
                vec![10 + (intensity * 40.0).floor() as u32]
            }
            Self::Lock | Self::Execute | Self::Tick | Self::Thrum { .. } | Self::Coin => {
                return None
            }
        };
        Some(pattern)
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Played when a contract is accepted.
pub const CREATE_CUES: &[Cue] = &[Cue::HapticSuccess];
/// Played when a contract is executed: slash, then the coin reaching the vault.
pub const COMPLETE_CUES: &[Cue] = &[Cue::HapticImpact, Cue::Execute, Cue::Coin];
pub const FAIL_CUES: &[Cue] = &[Cue::HapticError];
pub const ONBOARDING_CUES: &[Cue] = &[Cue::HapticSuccess, Cue::Lock];

/// Error reported by a sink that could not play a cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackError(pub String);

impl Display for FeedbackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "feedback unavailable: {}", self.0)
    }
}

impl Error for FeedbackError {}

/// Platform output for cues (audio context, vibration motor, bridge).
pub trait FeedbackSink {
    fn play(&self, cue: Cue) -> Result<(), FeedbackError>;
}

/// Sink for environments without audio or haptics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFeedback;

impl FeedbackSink for NoopFeedback {
    fn play(&self, _cue: Cue) -> Result<(), FeedbackError> {
        Ok(())
    }
}

/// Sink that records every cue; shared handle, clones observe the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingFeedback {
    cues: Rc<RefCell<Vec<Cue>>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.borrow().clone()
    }

    pub fn clear(&self) {
        self.cues.borrow_mut().clear();
    }
}

impl FeedbackSink for RecordingFeedback {
    fn play(&self, cue: Cue) -> Result<(), FeedbackError> {
        self.cues.borrow_mut().push(cue);
        Ok(())
    }
}

/// Emits a cue and swallows any sink failure.
pub fn emit(sink: &dyn FeedbackSink, cue: Cue) {
    if let Err(err) = sink.play(cue) {
        debug!(
            "event=feedback_emit module=feedback status=skipped cue={} error={}",
            cue.name(),
            err
        );
    }
}

/// Emits cues in order, swallowing failures individually.
pub fn emit_all(sink: &dyn FeedbackSink, cues: &[Cue]) {
    for cue in cues {
        emit(sink, *cue);
    }
}
