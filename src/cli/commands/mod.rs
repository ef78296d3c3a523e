use anyhow::Result;
use std::path::Path;

use crate::config::{SequencerConfig, StorageBackend};
use crate::workflows::{FilePhaseStore, InMemoryPhaseStore, PhaseSequencer};

pub mod next;
pub mod repair;
pub mod seed;
pub mod show;
pub mod validate;

pub use next::NextCommand;
pub use repair::RepairCommand;
pub use seed::SeedCommand;
pub use show::ShowCommand;
pub use validate::ValidateCommand;

/// Build a sequencer over the configured store. `store_override` forces the file backend.
pub async fn open_sequencer(
    config: &SequencerConfig,
    store_override: Option<&Path>,
) -> Result<PhaseSequencer> {
    if let Some(path) = store_override {
        return Ok(PhaseSequencer::new(FilePhaseStore::new(path)));
    }

    match config.storage.backend {
        StorageBackend::Memory => Ok(PhaseSequencer::new(InMemoryPhaseStore::new())),
        StorageBackend::File => Ok(PhaseSequencer::new(FilePhaseStore::new(
            &config.storage.path,
        ))),
        StorageBackend::Sqlite => open_database(config).await,
    }
}

#[cfg(feature = "database")]
async fn open_database(config: &SequencerConfig) -> Result<PhaseSequencer> {
    use crate::database::SqlitePhaseStore;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("sqlite storage selected but [database] is not configured"))?;
    let store =
        SqlitePhaseStore::connect(&database.url, database.max_connections, database.auto_migrate)
            .await?;
    Ok(PhaseSequencer::new(store))
}

#[cfg(not(feature = "database"))]
async fn open_database(_config: &SequencerConfig) -> Result<PhaseSequencer> {
    anyhow::bail!("sqlite storage requires building with the `database` feature")
}

pub fn show_usage() {
    println!("🏭 BMR Sequencer - Production Phase Sequencing");
    println!();
    println!("To get started:");
    println!("  🌱 bmr-sequencer seed                    # Define the catalog workflows");
    println!("  📋 bmr-sequencer show tablet             # List a product type's phases");
    println!("  ➡️  bmr-sequencer next tablet sorting     # Which phase comes next");
    println!();
    println!("Admin commands:");
    println!("  🔍 bmr-sequencer validate                # Check phase ordering");
    println!("  🔧 bmr-sequencer repair tablet_2         # Restore catalog ordering");
    println!();
    println!("💡 Pass --flag is_coated=false to 'next' for uncoated batches");
}
