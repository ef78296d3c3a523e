// End-to-end tests for the bmr-sequencer binary against a temporary phase table

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

use bmr_sequencer::{FilePhaseStore, PhaseName, PhaseStore, ProductType};

fn sequencer_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bmr-sequencer").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .arg("--store")
        .arg(store_path(dir));
    cmd
}

fn store_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("phases.json")
}

fn seed(dir: &TempDir) {
    sequencer_cmd(dir)
        .arg("seed")
        .assert()
        .success()
        .stdout(predicate::str::contains("tablet_2: 14 phases"));
}

#[test]
fn test_no_command_shows_usage() {
    let dir = TempDir::new().unwrap();
    sequencer_cmd(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("bmr-sequencer seed"));
}

#[test]
fn test_seed_then_show_lists_conditional_coating() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    assert!(Path::new(&store_path(&dir)).exists());

    sequencer_cmd(&dir)
        .args(["show", "tablet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow for tablet"))
        .stdout(predicate::str::contains("coating  (when is_coated)"))
        .stdout(predicate::str::contains("blister_packing"));
}

#[test]
fn test_next_skips_coating_for_uncoated_batches() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    sequencer_cmd(&dir)
        .args(["next", "tablet", "sorting", "--flag", "is_coated=false"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped: coating"))
        .stdout(predicate::str::contains("Next phase: packaging_material_release"));

    sequencer_cmd(&dir)
        .args(["next", "tablet", "sorting", "--flag", "is_coated=true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Next phase: coating"));
}

#[test]
fn test_next_after_last_phase_reports_end_of_workflow() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    sequencer_cmd(&dir)
        .args(["next", "capsule", "finished_goods_store"])
        .assert()
        .success()
        .stdout(predicate::str::contains("End of workflow"));
}

#[test]
fn test_next_unknown_phase_fails() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    sequencer_cmd(&dir)
        .args(["next", "tablet", "nonexistent_phase"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexistent_phase"));
}

#[test]
fn test_seed_unknown_product_type_fails() {
    let dir = TempDir::new().unwrap();
    sequencer_cmd(&dir)
        .args(["seed", "--product-type", "syrup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No catalog workflow"));
}

#[tokio::test]
async fn test_validate_and_repair_corrupted_table() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    let product_type = ProductType::new("tablet_2").unwrap();
    FilePhaseStore::new(store_path(&dir))
        .reassign_orders(
            &product_type,
            &[
                (PhaseName::new("bulk_packing").unwrap(), 11),
                (PhaseName::new("secondary_packaging").unwrap(), 11),
            ],
        )
        .await
        .unwrap();

    sequencer_cmd(&dir)
        .args(["validate", "tablet_2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("packing rule"));

    sequencer_cmd(&dir)
        .args(["repair", "tablet_2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reassigned"));

    sequencer_cmd(&dir)
        .args(["validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tablet_2: ordering consistent"));

    sequencer_cmd(&dir)
        .args(["repair", "tablet_2", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"changes\": []"));
}
