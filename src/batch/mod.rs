// Per-batch phase tracking built on the workflow sequencer.

pub mod record;
pub mod types;

pub use record::BatchRecord;
pub use types::{BatchError, BatchPhaseInstance, PhaseStatus, ProgressSummary};
