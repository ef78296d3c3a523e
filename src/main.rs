use anyhow::Result;
use clap::Parser;

use bmr_sequencer::cli::commands::{
    open_sequencer, show_usage, NextCommand, RepairCommand, SeedCommand, ShowCommand,
    ValidateCommand,
};
use bmr_sequencer::cli::{Cli, Commands};
use bmr_sequencer::config::{config, SequencerConfig};
use bmr_sequencer::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => {
            SequencerConfig::load_env_file()?;
            SequencerConfig::load(Some(path))?
        }
        None => config()?.clone(),
    };
    init_telemetry(&config.observability)?;

    let violations = tokio::runtime::Runtime::new()?.block_on(run(cli, &config))?;
    if violations > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Dispatch one command; returns the number of ordering violations reported.
async fn run(cli: Cli, config: &SequencerConfig) -> Result<usize> {
    let Some(command) = cli.command else {
        show_usage();
        return Ok(0);
    };
    let sequencer = open_sequencer(config, cli.store.as_deref()).await?;

    match command {
        Commands::Seed { product_type } => {
            SeedCommand::new(product_type).execute(&sequencer).await?;
            Ok(0)
        }
        Commands::Show { product_type } => {
            ShowCommand::new(product_type).execute(&sequencer).await?;
            Ok(0)
        }
        Commands::Next {
            product_type,
            phase,
            flags,
        } => {
            NextCommand::new(product_type, phase, flags)
                .execute(&sequencer)
                .await?;
            Ok(0)
        }
        Commands::Validate { product_type, json } => {
            ValidateCommand::new(product_type)
                .with_json(json)
                .execute(&sequencer)
                .await
        }
        Commands::Repair { product_type, json } => {
            RepairCommand::new(product_type)
                .with_json(json)
                .execute(&sequencer)
                .await?;
            Ok(0)
        }
    }
}
