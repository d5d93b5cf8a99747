//! Classification rules: probes that reduce a generation result to feature keys,
//! plus the optional condition that marks a trial as notable.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::feature::{FeatureKey, FeatureValue};
use crate::generation::{EntityKind, GenerationResult, PlacedEntity};

/// Selects placed entities by exact, case-sensitive name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatch {
    #[serde(default)]
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrying: Option<String>,
}

impl EntityMatch {
    #[must_use]
    pub fn creature(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Creature,
            name: name.into(),
            carrying: None,
        }
    }

    #[must_use]
    pub fn treasure(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Treasure,
            name: name.into(),
            carrying: None,
        }
    }

    #[must_use]
    pub fn carrying(mut self, item: impl Into<String>) -> Self {
        self.carrying = Some(item.into());
        self
    }

    #[must_use]
    pub fn matches(&self, entity: &PlacedEntity) -> bool {
        entity.kind == self.kind
            && entity.name == self.name
            && self
                .carrying
                .as_ref()
                .is_none_or(|item| entity.carrying.as_ref() == Some(item))
    }
}

/// Extracts one named field from a generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum Probe {
    /// Number of matching entities.
    Count { field: String, entity: EntityMatch },
    /// Whether any matching entity was placed.
    Presence { field: String, entity: EntityMatch },
    /// Whether a structural flag is set.
    Flag { field: String, flag: String },
}

impl Probe {
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Count { field, .. } | Self::Presence { field, .. } | Self::Flag { field, .. } => {
                field
            }
        }
    }

    #[must_use]
    pub fn evaluate(&self, result: &GenerationResult) -> FeatureValue {
        match self {
            Self::Count { entity, .. } => {
                let count = result
                    .entities()
                    .iter()
                    .filter(|placed| entity.matches(placed))
                    .count();
                FeatureValue::Count(u32::try_from(count).unwrap_or(u32::MAX))
            }
            Self::Presence { entity, .. } => {
                FeatureValue::Flag(result.entities().iter().any(|placed| entity.matches(placed)))
            }
            Self::Flag { flag, .. } => FeatureValue::Flag(result.has_flag(flag)),
        }
    }
}

/// Ordered probe list producing one feature key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTemplate {
    probes: Vec<Probe>,
}

impl KeyTemplate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(mut self, field: impl Into<String>, entity: EntityMatch) -> Self {
        self.probes.push(Probe::Count {
            field: field.into(),
            entity,
        });
        self
    }

    #[must_use]
    pub fn presence(mut self, field: impl Into<String>, entity: EntityMatch) -> Self {
        self.probes.push(Probe::Presence {
            field: field.into(),
            entity,
        });
        self
    }

    #[must_use]
    pub fn flag(mut self, field: impl Into<String>, flag: impl Into<String>) -> Self {
        self.probes.push(Probe::Flag {
            field: field.into(),
            flag: flag.into(),
        });
        self
    }

    #[must_use]
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    #[must_use]
    pub fn extract(&self, result: &GenerationResult) -> FeatureKey {
        let mut key = FeatureKey::new();
        for probe in &self.probes {
            key.push(probe.field(), probe.evaluate(result));
        }
        key
    }

    fn has_field(&self, name: &str) -> bool {
        self.probes.iter().any(|probe| probe.field() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expected {
    pub field: String,
    pub value: u32,
}

/// Condition over the values extracted by a notable rule.
///
/// A field that is missing or has the wrong type never satisfies a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    AtLeast { field: String, min: u32 },
    AtMost { field: String, max: u32 },
    IsTrue { field: String },
    IsFalse { field: String },
    /// Any listed count differs from its expected value.
    Deviates { expected: Vec<Expected> },
}

impl Condition {
    #[must_use]
    pub fn holds(&self, values: &FeatureKey) -> bool {
        let count = |field: &str| values.get(field).and_then(FeatureValue::as_count);
        let flag = |field: &str| values.get(field).and_then(FeatureValue::as_flag);
        match self {
            Self::AtLeast { field, min } => count(field).is_some_and(|n| n >= *min),
            Self::AtMost { field, max } => count(field).is_some_and(|n| n <= *max),
            Self::IsTrue { field } => flag(field) == Some(true),
            Self::IsFalse { field } => flag(field) == Some(false),
            Self::Deviates { expected } => expected
                .iter()
                .any(|e| count(&e.field).is_some_and(|n| n != e.value)),
        }
    }

    fn fields(&self) -> Vec<&str> {
        match self {
            Self::AtLeast { field, .. }
            | Self::AtMost { field, .. }
            | Self::IsTrue { field }
            | Self::IsFalse { field } => vec![field.as_str()],
            Self::Deviates { expected } => expected.iter().map(|e| e.field.as_str()).collect(),
        }
    }
}

/// Marks trials worth reporting individually, with the values to print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotableRule {
    pub values: KeyTemplate,
    pub when: Condition,
}

impl NotableRule {
    #[must_use]
    pub const fn new(values: KeyTemplate, when: Condition) -> Self {
        Self { values, when }
    }

    /// Derived values when the condition holds.
    #[must_use]
    pub fn evaluate(&self, result: &GenerationResult) -> Option<FeatureKey> {
        let values = self.values.extract(result);
        self.when.holds(&values).then_some(values)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule declares no feature keys")]
    NoKeys,
    #[error("feature key #{index} has no probes")]
    EmptyKey { index: usize },
    #[error("notable condition references unknown field {field:?}")]
    UnknownNotableField { field: String },
    #[error("field name {field:?} is empty or contains one of `{{}}:,=`")]
    InvalidFieldName { field: String },
}

/// Field names end up inside canonical keys and notable lines, so they may not
/// contain the separators those formats use.
fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['{', '}', ':', ',', '='])
}

/// Reduces a generation result to one or more feature keys.
///
/// Most targets yield a single key per trial; targets tracking unrelated
/// conditions declare several, and each is counted in the same histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub keys: Vec<KeyTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notable: Option<NotableRule>,
}

impl ClassificationRule {
    #[must_use]
    pub fn single(key: KeyTemplate) -> Self {
        Self {
            keys: vec![key],
            notable: None,
        }
    }

    #[must_use]
    pub fn and_key(mut self, key: KeyTemplate) -> Self {
        self.keys.push(key);
        self
    }

    #[must_use]
    pub fn with_notable(mut self, notable: NotableRule) -> Self {
        self.notable = Some(notable);
        self
    }

    #[must_use]
    pub fn keys_per_trial(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn classify(&self, result: &GenerationResult) -> SmallVec<[FeatureKey; 2]> {
        self.keys.iter().map(|key| key.extract(result)).collect()
    }

    #[must_use]
    pub fn notable_values(&self, result: &GenerationResult) -> Option<FeatureKey> {
        self.notable.as_ref().and_then(|n| n.evaluate(result))
    }

    #[must_use]
    pub fn is_notable(&self, result: &GenerationResult) -> bool {
        self.notable_values(result).is_some()
    }

    /// Check structural consistency.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule has no keys, an empty key, a field name that
    /// would break the canonical key form, or a notable condition over a field
    /// its notable probes never extract.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.keys.is_empty() {
            return Err(RuleError::NoKeys);
        }
        if let Some(index) = self.keys.iter().position(|key| key.probes().is_empty()) {
            return Err(RuleError::EmptyKey { index });
        }
        let notable_probes = self.notable.iter().flat_map(|notable| notable.values.probes());
        if let Some(probe) = self
            .keys
            .iter()
            .flat_map(KeyTemplate::probes)
            .chain(notable_probes)
            .find(|probe| !is_valid_field_name(probe.field()))
        {
            return Err(RuleError::InvalidFieldName {
                field: probe.field().to_string(),
            });
        }
        if let Some(notable) = &self.notable {
            for field in notable.when.fields() {
                if !notable.values.has_field(field) {
                    return Err(RuleError::UnknownNotableField {
                        field: field.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
