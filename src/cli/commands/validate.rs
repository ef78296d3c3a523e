use anyhow::Result;
use std::collections::BTreeMap;

use crate::workflows::{OrderingViolation, PhaseSequencer, ProductType};

pub struct ValidateCommand {
    pub product_type: Option<ProductType>,
    pub json: bool,
}

impl ValidateCommand {
    pub fn new(product_type: Option<ProductType>) -> Self {
        Self {
            product_type,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Returns the number of violations found across all checked product types.
    pub async fn execute(&self, sequencer: &PhaseSequencer) -> Result<usize> {
        let product_types = match &self.product_type {
            Some(product_type) => vec![product_type.clone()],
            None => sequencer.product_types().await?,
        };

        let mut findings: BTreeMap<ProductType, Vec<OrderingViolation>> = BTreeMap::new();
        for product_type in product_types {
            let violations = sequencer.validate_ordering(&product_type).await?;
            findings.insert(product_type, violations);
        }
        let total = findings.values().map(Vec::len).sum();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&findings)?);
            return Ok(total);
        }

        if findings.is_empty() {
            println!("📋 No workflows stored");
            println!("   💡 Define the catalog with: bmr-sequencer seed");
            return Ok(0);
        }

        for (product_type, violations) in &findings {
            if violations.is_empty() {
                println!("✅ {product_type}: ordering consistent");
                continue;
            }
            println!("❌ {product_type}: {} violation(s)", violations.len());
            for violation in violations {
                println!("   • {violation}");
            }
        }
        if total > 0 {
            println!();
            println!("🔧 Fix with: bmr-sequencer repair <product_type>");
        }
        Ok(total)
    }
}
