use anyhow::Result;

use crate::workflows::{PhaseSequencer, ProductType};

pub struct ShowCommand {
    pub product_type: ProductType,
}

impl ShowCommand {
    pub fn new(product_type: ProductType) -> Self {
        Self { product_type }
    }

    pub async fn execute(&self, sequencer: &PhaseSequencer) -> Result<()> {
        let definitions = sequencer.workflow(&self.product_type).await?;

        println!("📋 Workflow for {}:", self.product_type);
        for definition in &definitions {
            match &definition.condition {
                Some(condition) => println!(
                    "  {:>3}. {}  (when {})",
                    definition.order, definition.phase_name, condition
                ),
                None => println!("  {:>3}. {}", definition.order, definition.phase_name),
            }
        }
        Ok(())
    }
}
