// Batch progression
// Realizes a product type's workflow for one batch and walks it phase by phase.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::types::{BatchError, BatchPhaseInstance, PhaseStatus, ProgressSummary};
use crate::workflows::catalog::{self, phases::BMR_CREATION};
use crate::workflows::{BatchConditions, PhaseName, PhaseSequencer, ProductType};

/// Phase state of one batch manufacturing record.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub batch_number: String,
    pub product_type: ProductType,
    pub conditions: BatchConditions,
    pub created_at: DateTime<Utc>,
    phases: Vec<BatchPhaseInstance>,
}

impl BatchRecord {
    /// Snapshot the stored workflow for a new batch.
    ///
    /// `bmr_creation` is recorded as done, the first runnable phase after it
    /// becomes pending and phases excluded by `conditions` are skipped.
    /// Refuses to start a batch on a workflow with ordering violations.
    pub async fn initialize(
        sequencer: &PhaseSequencer,
        batch_number: impl Into<String>,
        product_type: &ProductType,
        conditions: BatchConditions,
    ) -> Result<Self, BatchError> {
        let batch_number = batch_number.into();
        let violations = sequencer.validate_ordering(product_type).await?;
        if !violations.is_empty() {
            return Err(BatchError::InconsistentWorkflow {
                product_type: product_type.clone(),
                violations,
            });
        }

        let now = Utc::now();
        let mut phases: Vec<BatchPhaseInstance> = sequencer
            .workflow(product_type)
            .await?
            .into_iter()
            .map(|definition| {
                let applies = definition.applies_to(&conditions);
                let requires_approval = catalog::requires_approval(definition.phase_name.as_str());
                let mut instance =
                    BatchPhaseInstance::new(definition.phase_name, definition.order, requires_approval);
                if instance.phase_name == BMR_CREATION {
                    instance.status = PhaseStatus::Completed;
                    instance.started_at = Some(now);
                    instance.completed_at = Some(now);
                } else if !applies {
                    instance.status = PhaseStatus::Skipped;
                }
                instance
            })
            .collect();

        if let Some(first) = phases
            .iter_mut()
            .find(|p| p.status == PhaseStatus::NotReady)
        {
            first.transition(PhaseStatus::Pending)?;
        }

        info!(
            batch_number = %batch_number,
            product_type = %product_type,
            phases = phases.len(),
            "Batch initialized"
        );
        Ok(Self {
            batch_number,
            product_type: product_type.clone(),
            conditions,
            created_at: now,
            phases,
        })
    }

    pub fn phases(&self) -> &[BatchPhaseInstance] {
        &self.phases
    }

    pub fn phase(&self, name: &PhaseName) -> Option<&BatchPhaseInstance> {
        self.phases.iter().find(|p| &p.phase_name == name)
    }

    fn position(&self, name: &PhaseName) -> Result<usize, BatchError> {
        self.phases
            .iter()
            .position(|p| &p.phase_name == name)
            .ok_or_else(|| BatchError::UnknownPhase {
                batch_number: self.batch_number.clone(),
                phase: name.clone(),
            })
    }

    /// The phase being worked on, or else the one waiting to start.
    pub fn current_phase(&self) -> Option<&BatchPhaseInstance> {
        self.phases
            .iter()
            .find(|p| p.status == PhaseStatus::InProgress)
            .or_else(|| self.phases.iter().find(|p| p.status == PhaseStatus::Pending))
    }

    /// Begin a pending phase. Every phase ordered before it must be completed or skipped.
    pub fn start_phase(&mut self, name: &PhaseName) -> Result<(), BatchError> {
        let index = self.position(name)?;
        let order = self.phases[index].order;
        let blocking: Vec<PhaseName> = self
            .phases
            .iter()
            .filter(|p| p.order < order && !p.status.is_settled())
            .map(|p| p.phase_name.clone())
            .collect();
        if !blocking.is_empty() {
            return Err(BatchError::PrerequisitesIncomplete {
                phase: name.clone(),
                blocking,
            });
        }

        self.phases[index].transition(PhaseStatus::InProgress)?;
        debug!(batch_number = %self.batch_number, phase = %name, "Phase started");
        Ok(())
    }

    /// Finish an in-progress phase and activate whatever the sequencer says comes next.
    ///
    /// Returns the activated phase, or `None` when the workflow is finished.
    pub async fn complete_phase(
        &mut self,
        name: &PhaseName,
        sequencer: &PhaseSequencer,
    ) -> Result<Option<PhaseName>, BatchError> {
        let index = self.position(name)?;
        self.phases[index].check_transition(PhaseStatus::Completed)?;

        let next = sequencer
            .next_phase(&self.product_type, name, &self.conditions)
            .await?;

        // Resolve every index before touching state so a mismatch leaves the record unchanged.
        let skipped = next
            .skipped()
            .iter()
            .map(|phase| self.position(phase))
            .collect::<Result<Vec<_>, _>>()?;
        let activated = next
            .phase_name()
            .map(|phase| self.position(phase).map(|i| (i, phase.clone())))
            .transpose()?;
        for &i in &skipped {
            if self.phases[i].status != PhaseStatus::Skipped {
                self.phases[i].check_transition(PhaseStatus::Skipped)?;
            }
        }
        if let Some((i, _)) = &activated {
            self.phases[*i].check_transition(PhaseStatus::Pending)?;
        }

        self.phases[index].transition(PhaseStatus::Completed)?;
        for i in skipped {
            if self.phases[i].status != PhaseStatus::Skipped {
                self.phases[i].transition(PhaseStatus::Skipped)?;
            }
        }

        match activated {
            Some((i, phase)) => {
                self.phases[i].transition(PhaseStatus::Pending)?;
                info!(
                    batch_number = %self.batch_number,
                    completed = %name,
                    next = %phase,
                    "Phase completed"
                );
                Ok(Some(phase))
            }
            None => {
                info!(batch_number = %self.batch_number, completed = %name, "Batch workflow finished");
                Ok(None)
            }
        }
    }

    /// Record a failed QC check and send the batch back to the phase the check guards.
    ///
    /// Returns the rollback target, which is pending afterwards.
    pub fn fail_qc(&mut self, name: &PhaseName) -> Result<PhaseName, BatchError> {
        let target = catalog::rollback_target(name.as_str())
            .ok_or_else(|| BatchError::NoRollbackTarget { phase: name.clone() })?;
        let qc_index = self.position(name)?;
        let target_index = self.position(&target)?;

        self.phases[qc_index].check_transition(PhaseStatus::Failed)?;
        self.phases[target_index].check_transition(PhaseStatus::Pending)?;

        self.phases[qc_index].transition(PhaseStatus::Failed)?;
        self.phases[target_index].transition(PhaseStatus::Pending)?;

        let target_order = self.phases[target_index].order;
        for (i, phase) in self.phases.iter_mut().enumerate() {
            if i == qc_index || i == target_index || phase.order <= target_order {
                continue;
            }
            match phase.status {
                PhaseStatus::Completed | PhaseStatus::InProgress | PhaseStatus::Failed => {
                    phase.transition(PhaseStatus::RolledBack)?
                }
                PhaseStatus::Pending => phase.transition(PhaseStatus::NotReady)?,
                _ => {}
            }
        }

        warn!(
            batch_number = %self.batch_number,
            qc_phase = %name,
            rollback_to = %target,
            "QC failed, batch rolled back"
        );
        Ok(target)
    }

    pub fn progress(&self) -> ProgressSummary {
        let total = self.phases.len();
        let completed = self
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Completed)
            .count();
        let skipped = self
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Skipped)
            .count();
        let percentage = if total == 0 {
            0.0
        } else {
            (completed + skipped) as f64 * 100.0 / total as f64
        };
        ProgressSummary {
            total,
            completed,
            skipped,
            percentage,
            is_complete: total > 0 && completed + skipped == total,
        }
    }
}
