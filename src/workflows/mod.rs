// Production phase workflows
// Ordered phase tables per product type, their stores and the sequencer that owns them.

pub mod catalog;
pub mod conditions;
pub mod errors;
pub mod file_store;
pub mod sequencer;
pub mod store;
pub mod types;
pub mod validation;

pub use conditions::{BatchConditions, FlagAssignment, PhaseCondition};
pub use errors::{SequencerError, StoreError};
pub use file_store::FilePhaseStore;
pub use sequencer::{PhaseSequencer, RepairAudit, RepairReport};
pub use store::{InMemoryPhaseStore, PhaseStore};
pub use types::{
    CanonicalRepair, NextPhase, OrderChange, PhaseDefinition, PhaseName, PhaseSpec, ProductType,
};
pub use validation::{check_ordering, OrderingViolation};
