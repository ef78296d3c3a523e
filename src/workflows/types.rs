use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use super::conditions::{BatchConditions, PhaseCondition};
use super::errors::SequencerError;

fn identifier_pattern() -> Option<&'static Regex> {
    static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok())
        .as_ref()
}

fn validate_identifier(value: &str) -> Result<(), SequencerError> {
    match identifier_pattern() {
        Some(pattern) if pattern.is_match(value) => Ok(()),
        _ => Err(SequencerError::InvalidIdentifier {
            value: value.to_string(),
        }),
    }
}

/// Workflow variant tag such as `tablet`, `tablet_2`, `capsule` or `ointment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductType(String);

impl ProductType {
    pub fn new(value: impl Into<String>) -> Result<Self, SequencerError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    /// Only for literals known to satisfy the identifier rule.
    pub(crate) fn from_static(value: &'static str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stable identifier of one production step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhaseName(String);

impl PhaseName {
    pub fn new(value: impl Into<String>) -> Result<Self, SequencerError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    pub(crate) fn from_static(value: &'static str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! identifier_impls {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = SequencerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = SequencerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $ty {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $ty {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

identifier_impls!(ProductType);
identifier_impls!(PhaseName);

/// One entry of a workflow definition, in intended execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: PhaseName,
    pub condition: Option<PhaseCondition>,
}

impl PhaseSpec {
    pub fn required(name: PhaseName) -> Self {
        Self {
            name,
            condition: None,
        }
    }

    pub fn conditional(name: PhaseName, condition: PhaseCondition) -> Self {
        Self {
            name,
            condition: Some(condition),
        }
    }
}

/// Stored position of a phase within its product type's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub product_type: ProductType,
    pub phase_name: PhaseName,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<PhaseCondition>,
}

impl PhaseDefinition {
    /// Whether a batch with `conditions` runs this phase.
    pub fn applies_to(&self, conditions: &BatchConditions) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |condition| condition.evaluate(conditions))
    }
}

/// Canonical storage order: by `order`, ties broken by name so snapshots compare stably.
pub fn sort_definitions(definitions: &mut [PhaseDefinition]) {
    definitions.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.phase_name.cmp(&b.phase_name))
    });
}

/// One phase whose stored order a repair changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderChange {
    pub phase: PhaseName,
    pub from: u32,
    pub to: u32,
}

/// Differences between a stored workflow and a canonical phase sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalRepair {
    pub changes: Vec<OrderChange>,
    /// Stored phases absent from the canonical sequence; their order is left alone.
    pub orphans: Vec<PhaseName>,
    /// Canonical phases with no stored definition.
    pub missing: Vec<PhaseName>,
}

impl CanonicalRepair {
    /// Compare `current` against `canonical`, where position `i` means order `i + 1`.
    pub fn plan(current: &[PhaseDefinition], canonical: &[PhaseName]) -> Self {
        let mut repair = Self::default();
        for (index, phase) in canonical.iter().enumerate() {
            let position = index as u32 + 1;
            match current.iter().find(|d| &d.phase_name == phase) {
                Some(stored) if stored.order != position => repair.changes.push(OrderChange {
                    phase: phase.clone(),
                    from: stored.order,
                    to: position,
                }),
                Some(_) => {}
                None => repair.missing.push(phase.clone()),
            }
        }
        repair.orphans = current
            .iter()
            .filter(|d| !canonical.contains(&d.phase_name))
            .map(|d| d.phase_name.clone())
            .collect();
        repair
    }

    pub fn assignments(&self) -> Vec<(PhaseName, u32)> {
        self.changes
            .iter()
            .map(|change| (change.phase.clone(), change.to))
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Result of a `next_phase` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPhase {
    /// The batch moves on to `phase`; `skipped` lists conditional phases passed over.
    Next {
        phase: PhaseDefinition,
        skipped: Vec<PhaseName>,
    },
    /// No phase follows.
    Terminal { skipped: Vec<PhaseName> },
}

impl NextPhase {
    pub fn phase(&self) -> Option<&PhaseDefinition> {
        match self {
            NextPhase::Next { phase, .. } => Some(phase),
            NextPhase::Terminal { .. } => None,
        }
    }

    pub fn phase_name(&self) -> Option<&PhaseName> {
        self.phase().map(|phase| &phase.phase_name)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NextPhase::Terminal { .. })
    }

    pub fn skipped(&self) -> &[PhaseName] {
        match self {
            NextPhase::Next { skipped, .. } | NextPhase::Terminal { skipped } => skipped,
        }
    }
}
