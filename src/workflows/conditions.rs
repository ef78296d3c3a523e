use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Product-variant flags supplied by batch progression when it asks for the next phase.
///
/// Flags that were never set read as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchConditions {
    flags: BTreeMap<String, bool>,
}

impl BatchConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: bool) {
        self.flags.insert(name.into(), value);
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// A single `name=bool` assignment, as accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagAssignment {
    pub name: String,
    pub value: bool,
}

impl FromStr for FlagAssignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=true|false, got '{s}'"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing flag name in '{s}'"));
        }
        let value = match value.trim() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            other => return Err(format!("invalid boolean '{other}' for flag '{name}'")),
        };
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

impl FromIterator<FlagAssignment> for BatchConditions {
    fn from_iter<T: IntoIterator<Item = FlagAssignment>>(iter: T) -> Self {
        let mut conditions = BatchConditions::new();
        for assignment in iter {
            conditions.set(assignment.name, assignment.value);
        }
        conditions
    }
}

/// Predicate deciding whether a conditional phase runs for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseCondition {
    Flag {
        name: String,
        #[serde(default = "default_expected")]
        equals: bool,
    },
    All { conditions: Vec<PhaseCondition> },
    Any { conditions: Vec<PhaseCondition> },
    Not { condition: Box<PhaseCondition> },
}

fn default_expected() -> bool {
    true
}

impl PhaseCondition {
    /// Holds when `name` is set to `true`.
    pub fn flag(name: impl Into<String>) -> Self {
        Self::Flag {
            name: name.into(),
            equals: true,
        }
    }

    pub fn flag_equals(name: impl Into<String>, equals: bool) -> Self {
        Self::Flag {
            name: name.into(),
            equals,
        }
    }

    pub fn all(conditions: Vec<PhaseCondition>) -> Self {
        Self::All { conditions }
    }

    pub fn any(conditions: Vec<PhaseCondition>) -> Self {
        Self::Any { conditions }
    }

    pub fn negate(condition: PhaseCondition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    pub fn evaluate(&self, conditions: &BatchConditions) -> bool {
        match self {
            PhaseCondition::Flag { name, equals } => conditions.flag(name) == *equals,
            PhaseCondition::All { conditions: inner } => {
                inner.iter().all(|c| c.evaluate(conditions))
            }
            PhaseCondition::Any { conditions: inner } => {
                inner.iter().any(|c| c.evaluate(conditions))
            }
            PhaseCondition::Not { condition } => !condition.evaluate(conditions),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[PhaseCondition], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

impl fmt::Display for PhaseCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseCondition::Flag { name, equals: true } => write!(f, "{name}"),
            PhaseCondition::Flag { name, equals: false } => write!(f, "!{name}"),
            PhaseCondition::All { conditions } => write_joined(f, conditions, "&&"),
            PhaseCondition::Any { conditions } => write_joined(f, conditions, "||"),
            PhaseCondition::Not { condition } => write!(f, "!{condition}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_read_false() {
        let conditions = BatchConditions::new();
        assert!(!conditions.flag("is_coated"));
        assert!(!PhaseCondition::flag("is_coated").evaluate(&conditions));
        assert!(PhaseCondition::flag_equals("is_coated", false).evaluate(&conditions));
    }

    #[test]
    fn test_composite_conditions() {
        let conditions = BatchConditions::new()
            .with_flag("is_coated", true)
            .with_flag("bulk", false);

        let both = PhaseCondition::all(vec![
            PhaseCondition::flag("is_coated"),
            PhaseCondition::flag("bulk"),
        ]);
        assert!(!both.evaluate(&conditions));

        let either = PhaseCondition::any(vec![
            PhaseCondition::flag("is_coated"),
            PhaseCondition::flag("bulk"),
        ]);
        assert!(either.evaluate(&conditions));

        assert!(PhaseCondition::negate(PhaseCondition::flag("bulk")).evaluate(&conditions));
        assert_eq!(either.to_string(), "(is_coated || bulk)");
    }

    #[test]
    fn test_flag_assignment_parsing() {
        let parsed: FlagAssignment = "is_coated=false".parse().unwrap();
        assert_eq!(parsed.name, "is_coated");
        assert!(!parsed.value);

        assert!("is_coated".parse::<FlagAssignment>().is_err());
        assert!("is_coated=maybe".parse::<FlagAssignment>().is_err());
        assert!("=true".parse::<FlagAssignment>().is_err());

        let conditions: BatchConditions = vec![parsed].into_iter().collect();
        assert_ne!(conditions, BatchConditions::new());
        assert!(!conditions.flag("is_coated"));
    }

    #[test]
    fn test_condition_serialization_shape() {
        let condition = PhaseCondition::flag("is_coated");
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["kind"], "flag");
        assert_eq!(json["name"], "is_coated");

        let parsed: PhaseCondition =
            serde_json::from_str(r#"{"kind":"flag","name":"is_coated"}"#).unwrap();
        assert_eq!(parsed, condition);
    }
}
