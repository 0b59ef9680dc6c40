//! Periodic excommunicado alarm evaluation.
//!
//! # Responsibility
//! - Recompute the global alarm from the full active set on every poll.
//! - Drive the countdown tick cue while the alarm is on.
//! - Report contracts whose grace just ran out so the app can decide to
//!   persist the failure.
//!
//! # Invariants
//! - Polling only reads; it never writes contract state.
//! - Ticking state is owned by the monitor instance.

use crate::feedback::{self, Cue, FeedbackSink};
use crate::lifecycle::status::{has_overdue_contracts, phase, ContractPhase};
use crate::model::contract::{Contract, ContractId};
use log::info;
use std::collections::HashSet;

/// Alarm on/off edge observed by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTransition {
    Started,
    Stopped,
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmSnapshot {
    pub excommunicado: bool,
    pub transition: Option<AlarmTransition>,
    /// Phase per evaluated contract, in input order.
    pub phases: Vec<(ContractId, ContractPhase)>,
    /// Contracts that crossed into derived failure since the previous poll.
    pub newly_expired: Vec<ContractId>,
}

#[derive(Debug, Default)]
pub struct ExcommunicadoMonitor {
    ticking: bool,
    expired: HashSet<ContractId>,
}

impl ExcommunicadoMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Evaluates the active set at `now_ms` and emits a tick while alarmed.
    pub fn poll(
        &mut self,
        active: &[Contract],
        now_ms: i64,
        duration_ms: i64,
        sink: &dyn FeedbackSink,
    ) -> AlarmSnapshot {
        let excommunicado = has_overdue_contracts(active, now_ms);
        let transition = match (self.ticking, excommunicado) {
            (false, true) => Some(AlarmTransition::Started),
            (true, false) => Some(AlarmTransition::Stopped),
            _ => None,
        };
        self.ticking = excommunicado;

        if let Some(edge) = transition {
            info!(
                "event=alarm_transition module=lifecycle status=ok transition={:?}",
                edge
            );
        }

        let phases = active
            .iter()
            .map(|contract| (contract.id, phase(contract, now_ms, duration_ms)))
            .collect::<Vec<_>>();

        let current_expired = phases
            .iter()
            .filter(|(_, current)| *current == ContractPhase::Expired)
            .map(|(id, _)| *id)
            .collect::<HashSet<_>>();
        let newly_expired = phases
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| current_expired.contains(id) && !self.expired.contains(id))
            .collect::<Vec<_>>();
        self.expired = current_expired;

        if excommunicado {
            feedback::emit(sink, Cue::Tick);
        }

        AlarmSnapshot {
            excommunicado,
            transition,
            phases,
            newly_expired,
        }
    }

    /// Silences the alarm, e.g. when the screen is torn down.
    ///
    /// Returns whether the monitor was ticking.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.ticking, false)
    }
}
