use anyhow::Result;

use crate::workflows::{
    BatchConditions, FlagAssignment, NextPhase, PhaseName, PhaseSequencer, ProductType,
};

pub struct NextCommand {
    pub product_type: ProductType,
    pub phase: PhaseName,
    pub conditions: BatchConditions,
}

impl NextCommand {
    pub fn new(product_type: ProductType, phase: PhaseName, flags: Vec<FlagAssignment>) -> Self {
        Self {
            product_type,
            phase,
            conditions: flags.into_iter().collect(),
        }
    }

    pub async fn execute(&self, sequencer: &PhaseSequencer) -> Result<()> {
        let next = sequencer
            .next_phase(&self.product_type, &self.phase, &self.conditions)
            .await?;

        if !next.skipped().is_empty() {
            let skipped: Vec<&str> = next.skipped().iter().map(PhaseName::as_str).collect();
            println!("⏭️  Skipped: {}", skipped.join(", "));
        }
        match next {
            NextPhase::Next { phase, .. } => {
                println!("➡️  Next phase: {} (order {})", phase.phase_name, phase.order);
            }
            NextPhase::Terminal { .. } => {
                println!("🏁 End of workflow: nothing follows {}", self.phase);
            }
        }
        Ok(())
    }
}
