use std::path::PathBuf;
use thiserror::Error;

use super::types::{PhaseName, ProductType};

/// Faults raised by a phase store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Phase store at {path} is locked by another writer")]
    Locked { path: PathBuf },

    #[error("Stored workflow data is corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("Phase {phase} is not stored for product type {product_type}")]
    MissingPhase {
        product_type: ProductType,
        phase: PhaseName,
    },

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Errors surfaced by the phase sequencer. None of these are retried or defaulted.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Phase {phase} appears more than once in the workflow for {product_type}")]
    DuplicatePhase {
        product_type: ProductType,
        phase: PhaseName,
    },

    #[error("Phase {phase} is not defined for product type {product_type}")]
    UnknownPhase {
        product_type: ProductType,
        phase: PhaseName,
    },

    #[error("No workflow is defined for product type {0}")]
    UnknownProductType(ProductType),

    #[error("Workflow for {0} must contain at least one phase")]
    EmptyWorkflow(ProductType),

    #[error("Invalid identifier {value:?}: expected lowercase letters, digits and underscores")]
    InvalidIdentifier { value: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
