use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(test)]
use mockall::automock;

use super::errors::StoreError;
use super::types::{sort_definitions, CanonicalRepair, PhaseDefinition, PhaseName, ProductType};

/// Persistence seam for phase definitions.
///
/// Implementations must make every write all-or-nothing and every `load`
/// a consistent snapshot: a reader never sees half of a `replace_workflow`
/// or `reassign_orders`. Ordering rules are enforced by the sequencer, not here.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// Definitions for one product type sorted by order; empty when none are stored.
    async fn load(&self, product_type: &ProductType) -> Result<Vec<PhaseDefinition>, StoreError>;

    async fn product_types(&self) -> Result<Vec<ProductType>, StoreError>;

    /// Replace the product type's whole definition set.
    async fn replace_workflow(
        &self,
        product_type: &ProductType,
        definitions: &[PhaseDefinition],
    ) -> Result<(), StoreError>;

    /// Overwrite the order of each listed phase. Fails with
    /// [`StoreError::MissingPhase`] and changes nothing if any phase is not stored.
    async fn reassign_orders(
        &self,
        product_type: &ProductType,
        orders: &[(PhaseName, u32)],
    ) -> Result<(), StoreError>;

    /// Move every stored phase named in `canonical` to its position there.
    ///
    /// The comparison runs against the state held under the same write that
    /// applies it, so a concurrent writer cannot leave stale orders behind.
    /// Returns `None` when nothing is stored for `product_type`.
    async fn apply_canonical(
        &self,
        product_type: &ProductType,
        canonical: &[PhaseName],
    ) -> Result<Option<CanonicalRepair>, StoreError>;
}

/// Apply order reassignments to a copy of a stored workflow.
pub(crate) fn apply_orders(
    product_type: &ProductType,
    current: &[PhaseDefinition],
    orders: &[(PhaseName, u32)],
) -> Result<Vec<PhaseDefinition>, StoreError> {
    let mut updated = current.to_vec();
    for (phase, order) in orders {
        let definition = updated
            .iter_mut()
            .find(|d| &d.phase_name == phase)
            .ok_or_else(|| StoreError::MissingPhase {
                product_type: product_type.clone(),
                phase: phase.clone(),
            })?;
        definition.order = *order;
    }
    sort_definitions(&mut updated);
    Ok(updated)
}

/// Process-local store. Each product type's workflow is an immutable snapshot
/// swapped in whole under the write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPhaseStore {
    workflows: Arc<RwLock<HashMap<ProductType, Arc<Vec<PhaseDefinition>>>>>,
}

impl InMemoryPhaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PhaseStore for InMemoryPhaseStore {
    async fn load(&self, product_type: &ProductType) -> Result<Vec<PhaseDefinition>, StoreError> {
        let snapshot = self.workflows.read().await.get(product_type).cloned();
        Ok(snapshot.map(|s| s.as_ref().clone()).unwrap_or_default())
    }

    async fn product_types(&self) -> Result<Vec<ProductType>, StoreError> {
        let mut types: Vec<ProductType> = self.workflows.read().await.keys().cloned().collect();
        types.sort();
        Ok(types)
    }

    async fn replace_workflow(
        &self,
        product_type: &ProductType,
        definitions: &[PhaseDefinition],
    ) -> Result<(), StoreError> {
        let mut snapshot = definitions.to_vec();
        sort_definitions(&mut snapshot);
        self.workflows
            .write()
            .await
            .insert(product_type.clone(), Arc::new(snapshot));
        Ok(())
    }

    async fn reassign_orders(
        &self,
        product_type: &ProductType,
        orders: &[(PhaseName, u32)],
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write().await;
        let current = workflows
            .get(product_type)
            .cloned()
            .unwrap_or_default();
        let updated = apply_orders(product_type, &current, orders)?;
        workflows.insert(product_type.clone(), Arc::new(updated));
        Ok(())
    }

    async fn apply_canonical(
        &self,
        product_type: &ProductType,
        canonical: &[PhaseName],
    ) -> Result<Option<CanonicalRepair>, StoreError> {
        let mut workflows = self.workflows.write().await;
        let Some(current) = workflows.get(product_type).cloned() else {
            return Ok(None);
        };

        let repair = CanonicalRepair::plan(&current, canonical);
        if !repair.is_noop() {
            let updated = apply_orders(product_type, &current, &repair.assignments())?;
            workflows.insert(product_type.clone(), Arc::new(updated));
        }
        Ok(Some(repair))
    }
}
