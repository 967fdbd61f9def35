//! Phase bookkeeping for one workflow run.
//!
//! A run walks `plan → approve → execute → persist`. Each phase gets exactly
//! one [`PhaseOutcome`], recorded in order into a [`PhaseLedger`]; once a
//! phase fails (or the plan is rejected) every later phase is recorded as
//! [`PhaseStatus::Skipped`].

use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Plan,
    Approve,
    Execute,
    Persist,
}

impl Phase {
    /// Phases in execution order.
    pub const ALL: [Phase; 4] = [Phase::Plan, Phase::Approve, Phase::Execute, Phase::Persist];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Approve => "approve",
            Phase::Execute => "execute",
            Phase::Persist => "persist",
        }
    }

    /// Workflow state while this phase is running.
    pub fn state(self) -> WorkflowState {
        match self {
            Phase::Plan => WorkflowState::Planning,
            Phase::Approve => WorkflowState::Approving,
            Phase::Execute => WorkflowState::Executing,
            Phase::Persist => WorkflowState::VerifyingPersistence,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Succeeded,
    Failed,
    /// Not run because an earlier phase failed or the plan was rejected.
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl PhaseOutcome {
    pub fn succeeded(phase: Phase, diagnostic: Option<String>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Succeeded,
            diagnostic,
        }
    }

    pub fn failed(phase: Phase, diagnostic: impl Into<String>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Failed,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn skipped(phase: Phase) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            diagnostic: None,
        }
    }
}

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Planning,
    Approving,
    Executing,
    VerifyingPersistence,
    Done,
    Aborted,
}

/// Why a run ended in [`WorkflowState::Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The operator did not approve the plan. Expected, not an error.
    Rejected,
    PhaseFailed { phase: Phase },
}

/// Append-only, order-checked record of phase outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseLedger {
    outcomes: Vec<PhaseOutcome>,
}

impl PhaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase whose outcome must be recorded next, if any remain.
    pub fn next_phase(&self) -> Option<Phase> {
        Phase::ALL.get(self.outcomes.len()).copied()
    }

    /// Record the outcome of the next phase. Recording out of order, or
    /// after all phases are recorded, is an error.
    pub fn record(&mut self, outcome: PhaseOutcome) -> Result<()> {
        match self.next_phase() {
            Some(expected) if expected == outcome.phase => {
                self.outcomes.push(outcome);
                Ok(())
            }
            Some(expected) => bail!(
                "phase {} recorded out of order (expected {expected})",
                outcome.phase
            ),
            None => bail!("phase {} recorded after all phases finished", outcome.phase),
        }
    }

    /// Mark every phase not yet recorded as skipped.
    pub fn skip_remaining(&mut self) {
        while let Some(phase) = self.next_phase() {
            self.outcomes.push(PhaseOutcome::skipped(phase));
        }
    }

    /// Mark every phase not yet recorded as skipped on purpose, with `note`
    /// as the diagnostic. Used when a run stops early without any fault.
    pub fn skip_remaining_noted(&mut self, note: &str) {
        while let Some(phase) = self.next_phase() {
            let mut outcome = PhaseOutcome::skipped(phase);
            outcome.diagnostic = Some(note.to_string());
            self.outcomes.push(outcome);
        }
    }

    pub fn outcomes(&self) -> &[PhaseOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<PhaseOutcome> {
        self.outcomes
    }
}
