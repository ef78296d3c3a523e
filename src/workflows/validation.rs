use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::catalog::phases;
use super::types::{PhaseDefinition, PhaseName};

/// Packing-method phases that must run before secondary packaging.
const PACKING_PHASES: [&str; 2] = [phases::BLISTER_PACKING, phases::BULK_PACKING];

/// Integrity problem found in a stored workflow. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderingViolation {
    /// Order 0 is outside the 1-based sequence.
    NonPositiveOrder { phase: PhaseName },
    DuplicateOrder { order: u32, phases: Vec<PhaseName> },
    /// Positions `expected..found` are unused.
    Gap { expected: u32, found: u32 },
    PackingOrder {
        packing_phase: PhaseName,
        packing_order: u32,
        secondary_order: u32,
    },
}

impl OrderingViolation {
    pub fn is_packing_rule(&self) -> bool {
        matches!(self, OrderingViolation::PackingOrder { .. })
    }
}

impl fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingViolation::NonPositiveOrder { phase } => {
                write!(f, "phase {phase} has order 0; orders start at 1")
            }
            OrderingViolation::DuplicateOrder { order, phases } => {
                let names: Vec<&str> = phases.iter().map(PhaseName::as_str).collect();
                write!(f, "order {order} is shared by {}", names.join(", "))
            }
            OrderingViolation::Gap { expected, found } => {
                write!(f, "gap in sequence: expected order {expected}, next is {found}")
            }
            OrderingViolation::PackingOrder {
                packing_phase,
                packing_order,
                secondary_order,
            } => write!(
                f,
                "packing rule: {packing_phase} (order {packing_order}) must precede {} (order {secondary_order})",
                phases::SECONDARY_PACKAGING
            ),
        }
    }
}

/// Check one product type's definitions against the ordering invariants.
pub fn check_ordering(definitions: &[PhaseDefinition]) -> Vec<OrderingViolation> {
    let mut violations = Vec::new();

    let mut by_order: BTreeMap<u32, Vec<PhaseName>> = BTreeMap::new();
    for definition in definitions {
        if definition.order == 0 {
            violations.push(OrderingViolation::NonPositiveOrder {
                phase: definition.phase_name.clone(),
            });
            continue;
        }
        by_order
            .entry(definition.order)
            .or_default()
            .push(definition.phase_name.clone());
    }

    let mut expected = 1;
    for (order, mut names) in by_order {
        if order > expected {
            violations.push(OrderingViolation::Gap {
                expected,
                found: order,
            });
        }
        if names.len() > 1 {
            names.sort();
            violations.push(OrderingViolation::DuplicateOrder {
                order,
                phases: names,
            });
        }
        expected = order + 1;
    }

    let order_of = |name: &str| {
        definitions
            .iter()
            .find(|d| d.phase_name == name)
            .map(|d| d.order)
    };
    if let Some(secondary_order) = order_of(phases::SECONDARY_PACKAGING) {
        for packing in PACKING_PHASES {
            if let Some(packing_order) = order_of(packing) {
                if packing_order >= secondary_order {
                    violations.push(OrderingViolation::PackingOrder {
                        packing_phase: PhaseName::from_static(packing),
                        packing_order,
                        secondary_order,
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::types::ProductType;

    fn workflow(entries: &[(&str, u32)]) -> Vec<PhaseDefinition> {
        let product_type = ProductType::new("tablet").unwrap();
        entries
            .iter()
            .map(|(name, order)| PhaseDefinition {
                product_type: product_type.clone(),
                phase_name: PhaseName::new(*name).unwrap(),
                order: *order,
                condition: None,
            })
            .collect()
    }

    #[test]
    fn test_dense_sequence_is_clean() {
        let definitions = workflow(&[
            ("packaging_material_release", 1),
            ("blister_packing", 2),
            ("secondary_packaging", 3),
        ]);
        assert!(check_ordering(&definitions).is_empty());
    }

    #[test]
    fn test_duplicate_and_gap_reported() {
        let definitions = workflow(&[("mixing", 1), ("tube_filling", 3), ("final_qa", 3)]);
        let violations = check_ordering(&definitions);
        assert_eq!(
            violations,
            vec![
                OrderingViolation::Gap {
                    expected: 2,
                    found: 3
                },
                OrderingViolation::DuplicateOrder {
                    order: 3,
                    phases: vec![
                        PhaseName::new("final_qa").unwrap(),
                        PhaseName::new("tube_filling").unwrap()
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_sequence_must_start_at_one() {
        let definitions = workflow(&[("mixing", 2), ("final_qa", 3)]);
        assert_eq!(
            check_ordering(&definitions),
            vec![OrderingViolation::Gap {
                expected: 1,
                found: 2
            }]
        );
    }

    #[test]
    fn test_zero_order_reported() {
        let definitions = workflow(&[("mixing", 0), ("final_qa", 1)]);
        let violations = check_ordering(&definitions);
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], OrderingViolation::NonPositiveOrder { .. }));
    }

    fn packing_violations(definitions: &[PhaseDefinition]) -> Vec<OrderingViolation> {
        check_ordering(definitions)
            .into_iter()
            .filter(OrderingViolation::is_packing_rule)
            .collect()
    }

    #[test]
    fn test_packing_rule_holds_iff_packing_precedes_secondary() {
        for packing in PACKING_PHASES {
            for (packing_order, secondary_order, violated) in
                [(1, 2, false), (2, 1, true), (2, 2, true)]
            {
                let definitions = workflow(&[
                    (packing, packing_order),
                    ("secondary_packaging", secondary_order),
                ]);
                let violations = packing_violations(&definitions);
                assert_eq!(
                    !violations.is_empty(),
                    violated,
                    "{packing} at {packing_order}, secondary at {secondary_order}"
                );
                if violated {
                    assert_eq!(
                        violations,
                        vec![OrderingViolation::PackingOrder {
                            packing_phase: PhaseName::new(packing).unwrap(),
                            packing_order,
                            secondary_order,
                        }]
                    );
                }
            }
        }
    }

    #[test]
    fn test_packing_rule_checks_each_packing_method_when_both_present() {
        let definitions = workflow(&[
            ("blister_packing", 1),
            ("secondary_packaging", 2),
            ("bulk_packing", 3),
        ]);
        let violations = packing_violations(&definitions);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("bulk_packing"));

        let definitions = workflow(&[
            ("secondary_packaging", 1),
            ("blister_packing", 2),
            ("bulk_packing", 3),
        ]);
        let flagged: Vec<String> = packing_violations(&definitions)
            .into_iter()
            .map(|v| match v {
                OrderingViolation::PackingOrder { packing_phase, .. } => packing_phase.to_string(),
                other => panic!("unexpected violation {other}"),
            })
            .collect();
        assert_eq!(flagged, vec!["blister_packing", "bulk_packing"]);

        let definitions = workflow(&[
            ("blister_packing", 1),
            ("bulk_packing", 2),
            ("secondary_packaging", 3),
        ]);
        assert!(check_ordering(&definitions).is_empty());
    }

    #[test]
    fn test_packing_rule_ignored_without_secondary_packaging() {
        let definitions = workflow(&[("bulk_packing", 1), ("final_qa", 2)]);
        assert!(check_ordering(&definitions).is_empty());
    }
}
