// Workflow phase sequencer
// Single owner of the phase table: every mutation goes through define_workflow
// or repair_ordering, each executed as one atomic store write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn, Instrument};

use super::conditions::BatchConditions;
use super::errors::SequencerError;
use super::store::PhaseStore;
use super::types::{
    CanonicalRepair, NextPhase, OrderChange, PhaseDefinition, PhaseName, PhaseSpec, ProductType,
};
use super::validation::{check_ordering, OrderingViolation};
use crate::telemetry::{create_sequencer_span, generate_correlation_id};

/// Audit trail entry for an administrative repair.
#[derive(Debug, Clone, Serialize)]
pub struct RepairAudit {
    pub repair_id: String,
    pub product_type: ProductType,
    pub performed_at: DateTime<Utc>,
    pub host: String,
}

/// Outcome of `repair_ordering`.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub audit: RepairAudit,
    pub changes: Vec<OrderChange>,
    /// Stored phases absent from the canonical sequence; their order was left alone.
    pub orphans: Vec<PhaseName>,
    /// Canonical phases with no stored definition.
    pub missing: Vec<PhaseName>,
}

impl RepairReport {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Maintains the ordered phase list per product type and answers sequencing queries.
pub struct PhaseSequencer {
    store: Arc<dyn PhaseStore>,
    write_locks: Mutex<HashMap<ProductType, Arc<Mutex<()>>>>,
}

impl PhaseSequencer {
    pub fn new(store: impl PhaseStore + 'static) -> Self {
        Self::with_store(Arc::new(store))
    }

    pub fn with_store(store: Arc<dyn PhaseStore>) -> Self {
        Self {
            store,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Exclusive writer lock for one product type. Other product types are not blocked.
    async fn lock_product_type(&self, product_type: &ProductType) -> OwnedMutexGuard<()> {
        let key_lock = {
            let mut locks = self.write_locks.lock().await;
            locks.entry(product_type.clone()).or_default().clone()
        };
        key_lock.lock_owned().await
    }

    /// Replace the workflow for `product_type`, assigning orders `1..=N` by position.
    pub async fn define_workflow(
        &self,
        product_type: &ProductType,
        phases: Vec<PhaseSpec>,
    ) -> Result<Vec<PhaseDefinition>, SequencerError> {
        if phases.is_empty() {
            return Err(SequencerError::EmptyWorkflow(product_type.clone()));
        }
        ensure_unique(product_type, phases.iter().map(|p| &p.name))?;

        let definitions: Vec<PhaseDefinition> = phases
            .into_iter()
            .enumerate()
            .map(|(index, entry)| PhaseDefinition {
                product_type: product_type.clone(),
                phase_name: entry.name,
                order: index as u32 + 1,
                condition: entry.condition,
            })
            .collect();

        let _guard = self.lock_product_type(product_type).await;
        self.store
            .replace_workflow(product_type, &definitions)
            .await?;

        info!(
            product_type = %product_type,
            phases = definitions.len(),
            "Workflow defined"
        );
        Ok(definitions)
    }

    /// Stored definitions for `product_type` in order.
    pub async fn workflow(
        &self,
        product_type: &ProductType,
    ) -> Result<Vec<PhaseDefinition>, SequencerError> {
        let definitions = self.store.load(product_type).await?;
        if definitions.is_empty() {
            return Err(SequencerError::UnknownProductType(product_type.clone()));
        }
        Ok(definitions)
    }

    pub async fn product_types(&self) -> Result<Vec<ProductType>, SequencerError> {
        Ok(self.store.product_types().await?)
    }

    /// The phase a batch moves to after `current`, skipping conditional phases
    /// whose predicate does not hold for `conditions`.
    pub async fn next_phase(
        &self,
        product_type: &ProductType,
        current: &PhaseName,
        conditions: &BatchConditions,
    ) -> Result<NextPhase, SequencerError> {
        let definitions = self.store.load(product_type).await?;
        let current_order = definitions
            .iter()
            .find(|d| &d.phase_name == current)
            .map(|d| d.order)
            .ok_or_else(|| SequencerError::UnknownPhase {
                product_type: product_type.clone(),
                phase: current.clone(),
            })?;

        let mut skipped = Vec::new();
        for definition in definitions.into_iter().filter(|d| d.order > current_order) {
            if definition.applies_to(conditions) {
                debug!(
                    product_type = %product_type,
                    from = %current,
                    to = %definition.phase_name,
                    skipped = ?skipped,
                    "Next phase resolved"
                );
                return Ok(NextPhase::Next {
                    phase: definition,
                    skipped,
                });
            }
            skipped.push(definition.phase_name);
        }

        debug!(product_type = %product_type, from = %current, "End of workflow");
        Ok(NextPhase::Terminal { skipped })
    }

    /// Read-only integrity check of the stored ordering.
    pub async fn validate_ordering(
        &self,
        product_type: &ProductType,
    ) -> Result<Vec<OrderingViolation>, SequencerError> {
        let definitions = self.workflow(product_type).await?;
        let violations = check_ordering(&definitions);
        for violation in &violations {
            warn!(product_type = %product_type, %violation, "Ordering violation");
        }
        Ok(violations)
    }

    /// Reassign every stored phase's order to its position in `canonical`.
    ///
    /// Running the same repair again changes nothing. Phases not named in
    /// `canonical` keep their order and are reported as orphans.
    pub async fn repair_ordering(
        &self,
        product_type: &ProductType,
        canonical: &[PhaseName],
    ) -> Result<RepairReport, SequencerError> {
        ensure_unique(product_type, canonical.iter())?;

        let correlation_id = generate_correlation_id();
        let span = create_sequencer_span(
            "repair_ordering",
            product_type,
            Some(correlation_id.as_str()),
        );
        self.apply_repair(product_type, canonical, correlation_id)
            .instrument(span)
            .await
    }

    async fn apply_repair(
        &self,
        product_type: &ProductType,
        canonical: &[PhaseName],
        repair_id: String,
    ) -> Result<RepairReport, SequencerError> {
        let _guard = self.lock_product_type(product_type).await;
        let CanonicalRepair {
            changes,
            orphans,
            missing,
        } = self
            .store
            .apply_canonical(product_type, canonical)
            .await?
            .ok_or_else(|| SequencerError::UnknownProductType(product_type.clone()))?;

        let report = RepairReport {
            audit: RepairAudit {
                repair_id,
                product_type: product_type.clone(),
                performed_at: Utc::now(),
                host: hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "unknown".to_string()),
            },
            changes,
            orphans,
            missing,
        };

        if !report.orphans.is_empty() {
            warn!(orphans = ?report.orphans, "Stored phases missing from canonical sequence");
        }
        if !report.missing.is_empty() {
            warn!(missing = ?report.missing, "Canonical phases not stored");
        }
        info!(
            changed = report.changes.len(),
            orphans = report.orphans.len(),
            "Ordering repair applied"
        );
        Ok(report)
    }
}

fn ensure_unique<'a>(
    product_type: &ProductType,
    names: impl Iterator<Item = &'a PhaseName>,
) -> Result<(), SequencerError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SequencerError::DuplicatePhase {
                product_type: product_type.clone(),
                phase: name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::conditions::PhaseCondition;
    use crate::workflows::errors::StoreError;
    use crate::workflows::store::{InMemoryPhaseStore, MockPhaseStore};

    fn name(value: &str) -> PhaseName {
        PhaseName::new(value).unwrap()
    }

    fn product(value: &str) -> ProductType {
        ProductType::new(value).unwrap()
    }

    fn coating_workflow() -> Vec<PhaseSpec> {
        vec![
            PhaseSpec::required(name("sorting")),
            PhaseSpec::conditional(name("coating"), PhaseCondition::flag("is_coated")),
            PhaseSpec::required(name("packaging_material_release")),
        ]
    }

    #[tokio::test]
    async fn test_define_assigns_dense_orders() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("tablet");
        let defined = sequencer
            .define_workflow(&product_type, coating_workflow())
            .await
            .unwrap();

        let orders: Vec<u32> = defined.iter().map(|d| d.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(sequencer.workflow(&product_type).await.unwrap(), defined);
    }

    #[tokio::test]
    async fn test_define_rejects_duplicate_phase_and_keeps_previous_workflow() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("tablet");
        sequencer
            .define_workflow(&product_type, coating_workflow())
            .await
            .unwrap();

        let result = sequencer
            .define_workflow(
                &product_type,
                vec![
                    PhaseSpec::required(name("sorting")),
                    PhaseSpec::required(name("sorting")),
                ],
            )
            .await;

        assert!(matches!(
            result,
            Err(SequencerError::DuplicatePhase { ref phase, .. }) if phase == "sorting"
        ));
        assert_eq!(sequencer.workflow(&product_type).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_define_rejects_empty_workflow() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let result = sequencer.define_workflow(&product("tablet"), vec![]).await;
        assert!(matches!(result, Err(SequencerError::EmptyWorkflow(_))));
    }

    #[tokio::test]
    async fn test_next_phase_skips_uncoated_coating() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("tablet");
        sequencer
            .define_workflow(&product_type, coating_workflow())
            .await
            .unwrap();

        let uncoated = BatchConditions::new().with_flag("is_coated", false);
        let next = sequencer
            .next_phase(&product_type, &name("sorting"), &uncoated)
            .await
            .unwrap();
        assert_eq!(next.phase_name().unwrap(), "packaging_material_release");
        assert_eq!(next.skipped(), &[name("coating")]);

        let coated = BatchConditions::new().with_flag("is_coated", true);
        let next = sequencer
            .next_phase(&product_type, &name("sorting"), &coated)
            .await
            .unwrap();
        assert_eq!(next.phase_name().unwrap(), "coating");
        assert!(next.skipped().is_empty());
    }

    #[tokio::test]
    async fn test_next_phase_after_last_is_terminal() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("tablet");
        sequencer
            .define_workflow(&product_type, coating_workflow())
            .await
            .unwrap();

        let next = sequencer
            .next_phase(
                &product_type,
                &name("packaging_material_release"),
                &BatchConditions::new(),
            )
            .await
            .unwrap();
        assert!(next.is_terminal());
    }

    #[tokio::test]
    async fn test_next_phase_unknown_phase_is_an_error() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("tablet");
        sequencer
            .define_workflow(&product_type, coating_workflow())
            .await
            .unwrap();

        let result = sequencer
            .next_phase(&product_type, &name("nonexistent_phase"), &BatchConditions::new())
            .await;
        assert!(matches!(result, Err(SequencerError::UnknownPhase { .. })));

        let result = sequencer
            .next_phase(&product("syrup"), &name("sorting"), &BatchConditions::new())
            .await;
        assert!(matches!(result, Err(SequencerError::UnknownPhase { .. })));
    }

    #[tokio::test]
    async fn test_repair_reports_orphans_and_missing() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("ointment");
        sequencer
            .define_workflow(
                &product_type,
                vec![
                    PhaseSpec::required(name("tube_filling")),
                    PhaseSpec::required(name("mixing")),
                    PhaseSpec::required(name("legacy_step")),
                ],
            )
            .await
            .unwrap();

        let report = sequencer
            .repair_ordering(
                &product_type,
                &[name("mixing"), name("tube_filling"), name("final_qa")],
            )
            .await
            .unwrap();

        assert_eq!(
            report.changes,
            vec![
                OrderChange { phase: name("mixing"), from: 2, to: 1 },
                OrderChange { phase: name("tube_filling"), from: 1, to: 2 },
            ]
        );
        assert_eq!(report.orphans, vec![name("legacy_step")]);
        assert_eq!(report.missing, vec![name("final_qa")]);
        assert_eq!(report.audit.product_type, product_type);
    }

    #[tokio::test]
    async fn test_repair_rejects_duplicate_canonical_entries() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let product_type = product("ointment");
        sequencer
            .define_workflow(&product_type, vec![PhaseSpec::required(name("mixing"))])
            .await
            .unwrap();

        let result = sequencer
            .repair_ordering(&product_type, &[name("mixing"), name("mixing")])
            .await;
        assert!(matches!(result, Err(SequencerError::DuplicatePhase { .. })));
    }

    #[tokio::test]
    async fn test_repair_unknown_product_type() {
        let sequencer = PhaseSequencer::new(InMemoryPhaseStore::new());
        let result = sequencer
            .repair_ordering(&product("syrup"), &[name("mixing")])
            .await;
        assert!(matches!(result, Err(SequencerError::UnknownProductType(_))));
    }

    #[tokio::test]
    async fn test_repair_store_failure_is_surfaced() {
        let mut store = MockPhaseStore::new();
        store.expect_apply_canonical().times(1).returning(|_, _| {
            Err(StoreError::Corrupt {
                reason: "disk full".to_string(),
            })
        });

        let sequencer = PhaseSequencer::new(store);
        let result = sequencer
            .repair_ordering(
                &product("tablet_2"),
                &[name("bulk_packing"), name("secondary_packaging")],
            )
            .await;
        assert!(matches!(result, Err(SequencerError::Store(StoreError::Corrupt { .. }))));
    }

    #[tokio::test]
    async fn test_repair_never_reads_outside_the_store_write() {
        let mut store = MockPhaseStore::new();
        store.expect_load().never();
        store.expect_reassign_orders().never();
        store
            .expect_apply_canonical()
            .times(1)
            .returning(|_, _| Ok(Some(CanonicalRepair::default())));

        let sequencer = PhaseSequencer::new(store);
        let report = sequencer
            .repair_ordering(&product("capsule"), &[name("drying")])
            .await
            .unwrap();
        assert!(report.is_noop());
    }
}
