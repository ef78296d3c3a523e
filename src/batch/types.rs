use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::workflows::{OrderingViolation, PhaseName, ProductType, SequencerError};

/// Lifecycle of one phase within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotReady,
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
    RolledBack,
}

impl PhaseStatus {
    pub fn can_transition_to(self, next: PhaseStatus) -> bool {
        use PhaseStatus::*;
        matches!(
            (self, next),
            (NotReady, Pending)
                | (NotReady, Skipped)
                | (Pending, InProgress)
                | (Pending, NotReady)
                | (Pending, Skipped)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, RolledBack)
                | (Completed, Pending)
                | (Completed, RolledBack)
                | (Failed, Pending)
                | (Failed, RolledBack)
                | (RolledBack, Pending)
        )
    }

    /// Completed or skipped; later phases may proceed past it.
    pub fn is_settled(self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::NotReady => "not_ready",
            PhaseStatus::Pending => "pending",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phase as realized for a specific batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPhaseInstance {
    pub phase_name: PhaseName,
    pub order: u32,
    pub status: PhaseStatus,
    pub requires_approval: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchPhaseInstance {
    pub fn new(phase_name: PhaseName, order: u32, requires_approval: bool) -> Self {
        Self {
            phase_name,
            order,
            status: PhaseStatus::NotReady,
            requires_approval,
            started_at: None,
            completed_at: None,
        }
    }

    pub(crate) fn check_transition(&self, next: PhaseStatus) -> Result<(), BatchError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(BatchError::InvalidTransition {
                phase: self.phase_name.clone(),
                from: self.status,
                to: next,
            })
        }
    }

    /// Move to `next`, stamping or clearing execution times.
    pub(crate) fn transition(&mut self, next: PhaseStatus) -> Result<(), BatchError> {
        self.check_transition(next)?;
        let now = Utc::now();
        match next {
            PhaseStatus::InProgress => {
                self.started_at = Some(now);
                self.completed_at = None;
            }
            PhaseStatus::Completed | PhaseStatus::Failed => self.completed_at = Some(now),
            PhaseStatus::Pending | PhaseStatus::NotReady => {
                self.started_at = None;
                self.completed_at = None;
            }
            PhaseStatus::Skipped | PhaseStatus::RolledBack => {}
        }
        self.status = next;
        Ok(())
    }
}

/// Counts over a batch's phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    /// Share of phases completed or skipped, 0 to 100.
    pub percentage: f64,
    pub is_complete: bool,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Phase {phase} is not part of batch {batch_number}")]
    UnknownPhase {
        batch_number: String,
        phase: PhaseName,
    },

    #[error("Phase {phase} cannot move from {from} to {to}")]
    InvalidTransition {
        phase: PhaseName,
        from: PhaseStatus,
        to: PhaseStatus,
    },

    #[error("Phase {phase} is blocked by unfinished phases: {}", format_names(.blocking))]
    PrerequisitesIncomplete {
        phase: PhaseName,
        blocking: Vec<PhaseName>,
    },

    #[error("Phase {phase} has no rollback target")]
    NoRollbackTarget { phase: PhaseName },

    #[error("Workflow for {product_type} has {} ordering violation(s)", .violations.len())]
    InconsistentWorkflow {
        product_type: ProductType,
        violations: Vec<OrderingViolation>,
    },

    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}

fn format_names(names: &[PhaseName]) -> String {
    names
        .iter()
        .map(PhaseName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
