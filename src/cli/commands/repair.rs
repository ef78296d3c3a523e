use anyhow::{anyhow, Result};

use crate::workflows::catalog::canonical_sequence;
use crate::workflows::{PhaseName, PhaseSequencer, ProductType};

pub struct RepairCommand {
    pub product_type: ProductType,
    pub json: bool,
}

impl RepairCommand {
    pub fn new(product_type: ProductType) -> Self {
        Self {
            product_type,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub async fn execute(&self, sequencer: &PhaseSequencer) -> Result<()> {
        let canonical = canonical_sequence(&self.product_type).ok_or_else(|| {
            anyhow!(
                "No catalog sequence for product type '{}'",
                self.product_type
            )
        })?;
        let report = sequencer
            .repair_ordering(&self.product_type, &canonical)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "🔧 [ADMIN] Repair {} of {} on {} at {}",
            report.audit.repair_id,
            report.audit.product_type,
            report.audit.host,
            report.audit.performed_at.to_rfc3339()
        );
        if report.is_noop() {
            println!("✅ Ordering already matches the catalog; nothing changed");
        } else {
            println!("✅ Reassigned {} phase(s):", report.changes.len());
            for change in &report.changes {
                println!("   {}: {} → {}", change.phase, change.from, change.to);
            }
        }
        if !report.orphans.is_empty() {
            println!("⚠️  Not in catalog, order kept: {}", join(&report.orphans));
        }
        if !report.missing.is_empty() {
            println!("⚠️  Catalog phases not stored: {}", join(&report.missing));
        }
        Ok(())
    }
}

fn join(names: &[PhaseName]) -> String {
    names
        .iter()
        .map(PhaseName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
