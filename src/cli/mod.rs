use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::workflows::{FlagAssignment, PhaseName, ProductType};

pub mod commands;

#[derive(Parser)]
#[command(name = "bmr-sequencer")]
#[command(about = "Production phase sequencing for batch manufacturing records")]
#[command(long_about = "bmr-sequencer keeps the ordered phase list of every product type, answers \
                       which phase a batch moves to next, and detects and repairs corrupted \
                       phase ordering. Get started with 'bmr-sequencer seed'.")]
pub struct Cli {
    /// Phase table file, overriding the configured storage
    #[arg(long, global = true, help = "Path of the JSON phase table to use instead of the configured store")]
    pub store: Option<PathBuf>,

    /// Configuration file to load instead of bmr-sequencer.toml
    #[arg(long, global = true, help = "Configuration file (TOML) to load")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Define the catalog workflows (all product types, or one)
    Seed {
        /// Only seed this product type
        #[arg(long, help = "Seed a single product type instead of the whole catalog")]
        product_type: Option<ProductType>,
    },
    /// Print the ordered phases of a product type
    Show {
        product_type: ProductType,
    },
    /// Ask which phase follows the given one
    Next {
        product_type: ProductType,
        phase: PhaseName,
        /// Batch flags such as is_coated=false
        #[arg(long = "flag", help = "Batch condition as name=true|false (repeatable)")]
        flags: Vec<FlagAssignment>,
    },
    /// Check stored ordering; exits with status 1 when violations are found
    Validate {
        /// Only check this product type
        product_type: Option<ProductType>,
        /// Print violations as JSON
        #[arg(long, help = "Emit violations as JSON")]
        json: bool,
    },
    /// Reassign orders to match the catalog sequence of a product type
    Repair {
        product_type: ProductType,
        /// Print the repair report as JSON
        #[arg(long, help = "Emit the repair report as JSON")]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_parses_repeated_flags() {
        let cli = Cli::try_parse_from([
            "bmr-sequencer",
            "--store",
            "phases.json",
            "next",
            "tablet",
            "sorting",
            "--flag",
            "is_coated=false",
            "--flag",
            "is_export=true",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("phases.json")));
        match cli.command {
            Some(Commands::Next {
                product_type,
                phase,
                flags,
            }) => {
                assert_eq!(product_type, "tablet");
                assert_eq!(phase, "sorting");
                assert_eq!(flags.len(), 2);
                assert!(!flags[0].value);
            }
            _ => panic!("expected next command"),
        }
    }

    #[test]
    fn test_invalid_identifiers_are_rejected_by_parser() {
        assert!(Cli::try_parse_from(["bmr-sequencer", "show", "Tablet"]).is_err());
        assert!(Cli::try_parse_from([
            "bmr-sequencer",
            "next",
            "tablet",
            "sorting",
            "--flag",
            "is_coated"
        ])
        .is_err());
    }
}
