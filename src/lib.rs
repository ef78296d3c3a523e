// BMR Sequencer Library - production phase sequencing for batch manufacturing records
// This exposes the core components for testing and integration

pub mod batch;
pub mod cli;
pub mod config;
pub mod database;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use batch::{BatchError, BatchPhaseInstance, BatchRecord, PhaseStatus, ProgressSummary};
pub use config::{config, SequencerConfig};
#[cfg(feature = "database")]
pub use database::SqlitePhaseStore;
pub use telemetry::{create_sequencer_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    BatchConditions, FilePhaseStore, InMemoryPhaseStore, NextPhase, OrderingViolation,
    PhaseCondition, PhaseDefinition, PhaseName, PhaseSequencer, PhaseSpec, PhaseStore,
    ProductType, RepairReport, SequencerError, StoreError,
};
