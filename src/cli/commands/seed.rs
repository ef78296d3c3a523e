use anyhow::{anyhow, Result};

use crate::workflows::catalog::{canonical_workflow, catalog_product_types};
use crate::workflows::{PhaseSequencer, ProductType};

pub struct SeedCommand {
    pub product_type: Option<ProductType>,
}

impl SeedCommand {
    pub fn new(product_type: Option<ProductType>) -> Self {
        Self { product_type }
    }

    pub async fn execute(&self, sequencer: &PhaseSequencer) -> Result<()> {
        let product_types = match &self.product_type {
            Some(product_type) => vec![product_type.clone()],
            None => catalog_product_types(),
        };

        println!("🌱 Seeding {} workflow(s) from the catalog", product_types.len());
        for product_type in product_types {
            let workflow = canonical_workflow(&product_type).ok_or_else(|| {
                anyhow!("No catalog workflow for product type '{product_type}'")
            })?;
            let defined = sequencer.define_workflow(&product_type, workflow).await?;
            println!("  ✅ {}: {} phases", product_type, defined.len());
        }
        Ok(())
    }
}
