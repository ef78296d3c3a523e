// Canonical production workflows seeded at deployment.

use super::conditions::PhaseCondition;
use super::types::{PhaseName, PhaseSpec, ProductType};

pub mod product_types {
    pub const OINTMENT: &str = "ointment";
    pub const TABLET: &str = "tablet";
    pub const TABLET_2: &str = "tablet_2";
    pub const CAPSULE: &str = "capsule";

    pub const ALL: [&str; 4] = [OINTMENT, TABLET, TABLET_2, CAPSULE];
}

pub mod phases {
    pub const BMR_CREATION: &str = "bmr_creation";
    pub const REGULATORY_APPROVAL: &str = "regulatory_approval";
    pub const RAW_MATERIAL_RELEASE: &str = "raw_material_release";
    pub const MATERIAL_DISPENSING: &str = "material_dispensing";
    pub const MIXING: &str = "mixing";
    pub const POST_MIXING_QC: &str = "post_mixing_qc";
    pub const TUBE_FILLING: &str = "tube_filling";
    pub const GRANULATION: &str = "granulation";
    pub const BLENDING: &str = "blending";
    pub const COMPRESSION: &str = "compression";
    pub const POST_COMPRESSION_QC: &str = "post_compression_qc";
    pub const SORTING: &str = "sorting";
    pub const COATING: &str = "coating";
    pub const DRYING: &str = "drying";
    pub const POST_BLENDING_QC: &str = "post_blending_qc";
    pub const FILLING: &str = "filling";
    pub const PACKAGING_MATERIAL_RELEASE: &str = "packaging_material_release";
    pub const BLISTER_PACKING: &str = "blister_packing";
    pub const BULK_PACKING: &str = "bulk_packing";
    pub const SECONDARY_PACKAGING: &str = "secondary_packaging";
    pub const FINAL_QA: &str = "final_qa";
    pub const FINISHED_GOODS_STORE: &str = "finished_goods_store";
}

/// Batch flag that decides whether tablets go through coating.
pub const IS_COATED: &str = "is_coated";
/// Batch flag for bulk capsules, packed in bulk instead of blisters.
pub const IS_BULK: &str = "is_bulk";

use phases::*;

const OINTMENT_WORKFLOW: &[&str] = &[
    BMR_CREATION,
    REGULATORY_APPROVAL,
    RAW_MATERIAL_RELEASE,
    MATERIAL_DISPENSING,
    MIXING,
    POST_MIXING_QC,
    TUBE_FILLING,
    PACKAGING_MATERIAL_RELEASE,
    SECONDARY_PACKAGING,
    FINAL_QA,
    FINISHED_GOODS_STORE,
];

const TABLET_WORKFLOW: &[&str] = &[
    BMR_CREATION,
    REGULATORY_APPROVAL,
    MATERIAL_DISPENSING,
    GRANULATION,
    BLENDING,
    COMPRESSION,
    POST_COMPRESSION_QC,
    SORTING,
    COATING,
    PACKAGING_MATERIAL_RELEASE,
    BLISTER_PACKING,
    SECONDARY_PACKAGING,
    FINAL_QA,
    FINISHED_GOODS_STORE,
];

const TABLET_2_WORKFLOW: &[&str] = &[
    BMR_CREATION,
    REGULATORY_APPROVAL,
    MATERIAL_DISPENSING,
    GRANULATION,
    BLENDING,
    COMPRESSION,
    POST_COMPRESSION_QC,
    SORTING,
    COATING,
    PACKAGING_MATERIAL_RELEASE,
    BULK_PACKING,
    SECONDARY_PACKAGING,
    FINAL_QA,
    FINISHED_GOODS_STORE,
];

const CAPSULE_WORKFLOW: &[&str] = &[
    BMR_CREATION,
    REGULATORY_APPROVAL,
    RAW_MATERIAL_RELEASE,
    MATERIAL_DISPENSING,
    DRYING,
    BLENDING,
    POST_BLENDING_QC,
    FILLING,
    SORTING,
    PACKAGING_MATERIAL_RELEASE,
    BLISTER_PACKING,
    BULK_PACKING,
    SECONDARY_PACKAGING,
    FINAL_QA,
    FINISHED_GOODS_STORE,
];

fn phase_names(product_type: &str) -> Option<&'static [&'static str]> {
    match product_type {
        product_types::OINTMENT => Some(OINTMENT_WORKFLOW),
        product_types::TABLET => Some(TABLET_WORKFLOW),
        product_types::TABLET_2 => Some(TABLET_2_WORKFLOW),
        product_types::CAPSULE => Some(CAPSULE_WORKFLOW),
        _ => None,
    }
}

/// Skip rule attached to a phase of a catalog workflow. Capsules carry both
/// packing methods and run exactly one of them.
fn condition_for(product_type: &str, phase: &str) -> Option<PhaseCondition> {
    match (product_type, phase) {
        (_, COATING) => Some(PhaseCondition::flag(IS_COATED)),
        (product_types::CAPSULE, BLISTER_PACKING) => {
            Some(PhaseCondition::negate(PhaseCondition::flag(IS_BULK)))
        }
        (product_types::CAPSULE, BULK_PACKING) => Some(PhaseCondition::flag(IS_BULK)),
        _ => None,
    }
}

pub fn catalog_product_types() -> Vec<ProductType> {
    product_types::ALL
        .into_iter()
        .map(ProductType::from_static)
        .collect()
}

/// The seeded definition for a catalog product type, ready for `define_workflow`.
pub fn canonical_workflow(product_type: &ProductType) -> Option<Vec<PhaseSpec>> {
    phase_names(product_type.as_str()).map(|names| {
        names
            .iter()
            .map(|name| PhaseSpec {
                name: PhaseName::from_static(name),
                condition: condition_for(product_type.as_str(), name),
            })
            .collect()
    })
}

/// The authoritative phase order for `repair_ordering`.
pub fn canonical_sequence(product_type: &ProductType) -> Option<Vec<PhaseName>> {
    phase_names(product_type.as_str())
        .map(|names| names.iter().map(|name| PhaseName::from_static(name)).collect())
}

/// Phase a failed QC check sends the batch back to.
pub fn rollback_target(qc_phase: &str) -> Option<PhaseName> {
    let target = match qc_phase {
        POST_COMPRESSION_QC => BLENDING,
        POST_MIXING_QC => MIXING,
        POST_BLENDING_QC => BLENDING,
        _ => return None,
    };
    Some(PhaseName::from_static(target))
}

pub fn requires_approval(phase: &str) -> bool {
    matches!(phase, REGULATORY_APPROVAL | FINAL_QA)
}
